//! Transfer intent types.
//!
//! A [`TransferIntent`] is the five-field authorization a token owner signs
//! off-chain. It is a plain value: the codec derives its digest and the
//! executor decides whether it may run.

use crate::utils::{with_0x_prefix, without_0x_prefix};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-width keccak-256 digest of an encoded intent.
pub type Digest = B256;

/// Length in bytes of a recoverable secp256k1 signature (`r || s || v`).
pub const SIGNATURE_LENGTH: usize = 65;

/// A token transfer authorized by `sender`.
///
/// Nonces are chosen freely by the sender. They only need to be unique per
/// sender; gaps and out-of-order use are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferIntent {
	/// Owner of the funds and expected signer.
	pub sender: Address,
	/// Quantity in the asset's smallest unit.
	pub amount: U256,
	/// Account credited by the transfer.
	pub recipient: Address,
	/// Sender-chosen disambiguator.
	pub nonce: U256,
	/// Token contract the transfer applies to.
	pub asset: Address,
}

impl TransferIntent {
	pub fn new(
		sender: Address,
		amount: U256,
		recipient: Address,
		nonce: U256,
		asset: Address,
	) -> Self {
		Self {
			sender,
			amount,
			recipient,
			nonce,
			asset,
		}
	}

	/// Returns a copy of this intent with a different nonce.
	pub fn with_nonce(mut self, nonce: U256) -> Self {
		self.nonce = nonce;
		self
	}
}

/// Errors raised when parsing a signature from user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureParseError {
	#[error("Invalid hex: {0}")]
	Hex(String),
	#[error("Invalid signature length: expected {SIGNATURE_LENGTH} bytes, got {0}")]
	Length(usize),
}

/// Raw recoverable ECDSA signature bytes as submitted by a relayer.
///
/// The bytes are kept as received; the codec interprets them at recovery
/// time so a malformed signature surfaces as an invalid signature rather
/// than a decoding failure at the edge.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature(pub Vec<u8>);

impl Signature {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<[u8; SIGNATURE_LENGTH]> for Signature {
	fn from(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
		Self(bytes.to_vec())
	}
}

impl From<Vec<u8>> for Signature {
	fn from(bytes: Vec<u8>) -> Self {
		Self(bytes)
	}
}

impl FromStr for Signature {
	type Err = SignatureParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let bytes =
			hex::decode(without_0x_prefix(s)).map_err(|e| SignatureParseError::Hex(e.to_string()))?;
		if bytes.len() != SIGNATURE_LENGTH {
			return Err(SignatureParseError::Length(bytes.len()));
		}
		Ok(Self(bytes))
	}
}

impl fmt::Display for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", with_0x_prefix(&hex::encode(&self.0)))
	}
}

impl fmt::Debug for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Signature({})", self)
	}
}

impl Serialize for Signature {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for Signature {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}
