//! Signing convention configuration.
//!
//! The digest of an intent is always the same packed keccak-256 hash; the
//! signing convention only decides which hash the sender's wallet actually
//! signs over that intent.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// EIP-712 domain binding a typed-data signature to one executor deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
	/// Domain name, hashed into the domain separator.
	pub domain_name: String,
	/// Chain the executor operates on.
	pub chain_id: u64,
	/// Address identifying the executor deployment.
	pub verifying_contract: Address,
}

/// Which message the sender signs for an intent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum SigningScheme {
	/// EIP-191 personal message over the 32 digest bytes.
	#[default]
	PersonalSign,
	/// EIP-712 typed data over the intent fields.
	Eip712(Eip712Domain),
}

impl SigningScheme {
	/// Returns the configuration name of the scheme.
	pub fn as_str(&self) -> &'static str {
		match self {
			SigningScheme::PersonalSign => "personal_sign",
			SigningScheme::Eip712(_) => "eip712",
		}
	}
}
