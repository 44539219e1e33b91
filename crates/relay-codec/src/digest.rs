//! Canonical intent digest.
//!
//! Layout of the packed encoding (124 bytes):
//! - [0-19]:    sender
//! - [20-51]:   amount, big-endian uint256
//! - [52-71]:   recipient
//! - [72-103]:  nonce, big-endian uint256
//! - [104-123]: asset
//!
//! Every slot has a fixed width, so a given byte string has exactly one
//! split into fields. The digest is keccak-256 of this encoding and matches
//! Solidity's `keccak256(abi.encodePacked(sender, amount, recipient, nonce, asset))`.

use alloy_primitives::{keccak256, Address, U256};
use relay_types::{Digest, TransferIntent};

/// Length of the packed intent encoding.
pub const PACKED_INTENT_LENGTH: usize = 20 + 32 + 20 + 32 + 20;

/// Encodes the intent fields into their fixed-width packed form.
pub fn encode_packed(
	sender: &Address,
	amount: U256,
	recipient: &Address,
	nonce: U256,
	asset: &Address,
) -> [u8; PACKED_INTENT_LENGTH] {
	let mut out = [0u8; PACKED_INTENT_LENGTH];
	out[0..20].copy_from_slice(sender.as_slice());
	out[20..52].copy_from_slice(&amount.to_be_bytes::<32>());
	out[52..72].copy_from_slice(recipient.as_slice());
	out[72..104].copy_from_slice(&nonce.to_be_bytes::<32>());
	out[104..124].copy_from_slice(asset.as_slice());
	out
}

/// Computes the digest a client must sign for the given transfer.
pub fn get_hash(
	sender: &Address,
	amount: U256,
	recipient: &Address,
	nonce: U256,
	asset: &Address,
) -> Digest {
	keccak256(encode_packed(sender, amount, recipient, nonce, asset))
}

/// Computes the digest of an intent.
pub fn get_intent_hash(intent: &TransferIntent) -> Digest {
	get_hash(
		&intent.sender,
		intent.amount,
		&intent.recipient,
		intent.nonce,
		&intent.asset,
	)
}

/// Digest access on the intent value itself.
pub trait IntentDigest {
	fn digest(&self) -> Digest;
}

impl IntentDigest for TransferIntent {
	fn digest(&self) -> Digest {
		get_intent_hash(self)
	}
}
