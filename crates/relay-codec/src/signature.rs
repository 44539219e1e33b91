//! Signing hashes and signer recovery.
//!
//! The sender never signs the raw digest. Under `personal_sign` the wallet
//! signs the EIP-191 message hash of the 32 digest bytes, which is what
//! `signMessage(digestBytes)` produces. Under `eip712` the wallet signs typed
//! data over the intent fields, bound to a configured domain.

use alloy_primitives::{eip191_hash_message, keccak256, Address, PrimitiveSignature, B256};
use relay_types::utils::{
	compute_domain_hash, compute_final_digest, Eip712AbiEncoder, META_TRANSFER_TYPE,
};
use relay_types::{Signature, SigningScheme, TransferIntent};
use thiserror::Error;

use crate::digest::get_intent_hash;

/// Errors that can occur while recovering a signer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecoveryError {
	/// The signature bytes cannot be interpreted (length, parity byte).
	#[error("Malformed signature: {0}")]
	Malformed(String),
	/// The signature is well formed but yields no public key for the hash.
	#[error("Unrecoverable signature: {0}")]
	Unrecoverable(String),
}

/// Hashes the intent fields as the EIP-712 `MetaTransfer` struct.
pub fn intent_struct_hash(intent: &TransferIntent) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(META_TRANSFER_TYPE.as_bytes()));
	enc.push_address(&intent.sender);
	enc.push_u256(intent.amount);
	enc.push_address(&intent.recipient);
	enc.push_u256(intent.nonce);
	enc.push_address(&intent.asset);
	keccak256(enc.finish())
}

/// Returns the hash the sender signs for `intent` under `scheme`.
pub fn signing_hash(scheme: &SigningScheme, intent: &TransferIntent) -> B256 {
	match scheme {
		SigningScheme::PersonalSign => eip191_hash_message(get_intent_hash(intent)),
		SigningScheme::Eip712(domain) => {
			let domain_hash = compute_domain_hash(
				&domain.domain_name,
				domain.chain_id,
				&domain.verifying_contract,
			);
			compute_final_digest(&domain_hash, &intent_struct_hash(intent))
		},
	}
}

/// Recovers the address that produced `signature` over `hash`.
///
/// Accepts `v` as 0/1 or 27/28.
pub fn recover_signer(hash: &B256, signature: &Signature) -> Result<Address, RecoveryError> {
	let parsed = PrimitiveSignature::try_from(signature.as_bytes())
		.map_err(|e| RecoveryError::Malformed(e.to_string()))?;
	parsed
		.recover_address_from_prehash(hash)
		.map_err(|e| RecoveryError::Unrecoverable(e.to_string()))
}

/// Recovers the signer of `intent` under `scheme`.
pub fn recover_intent_signer(
	scheme: &SigningScheme,
	intent: &TransferIntent,
	signature: &Signature,
) -> Result<Address, RecoveryError> {
	recover_signer(&signing_hash(scheme, intent), signature)
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{address, U256};
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;
	use relay_types::Eip712Domain;

	fn signer() -> PrivateKeySigner {
		"0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
			.parse()
			.unwrap()
	}

	fn intent_for(sender: Address) -> TransferIntent {
		TransferIntent::new(
			sender,
			U256::from(10u64),
			address!("90F79bf6EB2c4f870365E785982E1f101E93b906"),
			U256::from(1u64),
			address!("5FbDB2315678afecb367f032d93F642f64180aa3"),
		)
	}

	fn eip712_scheme() -> SigningScheme {
		SigningScheme::Eip712(Eip712Domain {
			domain_name: "MetaTokenTransfer".to_string(),
			chain_id: 31337,
			verifying_contract: address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512"),
		})
	}

	#[test]
	fn test_personal_sign_matches_wallet_sign_message() {
		let wallet = signer();
		let intent = intent_for(wallet.address());
		let digest = get_intent_hash(&intent);

		// A wallet signing the digest bytes as a message
		let sig = wallet.sign_message_sync(digest.as_slice()).unwrap();
		let signature = Signature::from(sig.as_bytes());

		let recovered =
			recover_intent_signer(&SigningScheme::PersonalSign, &intent, &signature).unwrap();
		assert_eq!(recovered, wallet.address());
	}

	#[test]
	fn test_eip712_round_trip() {
		let wallet = signer();
		let intent = intent_for(wallet.address());
		let scheme = eip712_scheme();

		let sig = wallet.sign_hash_sync(&signing_hash(&scheme, &intent)).unwrap();
		let signature = Signature::from(sig.as_bytes());

		assert_eq!(
			recover_intent_signer(&scheme, &intent, &signature).unwrap(),
			wallet.address()
		);
		// Same signature checked under the other convention points elsewhere
		assert_ne!(
			recover_intent_signer(&SigningScheme::PersonalSign, &intent, &signature).ok(),
			Some(wallet.address())
		);
	}

	#[test]
	fn test_eip712_domain_separates_deployments() {
		let intent = intent_for(signer().address());
		let scheme = eip712_scheme();
		let SigningScheme::Eip712(domain) = &scheme else {
			unreachable!()
		};
		let other = SigningScheme::Eip712(Eip712Domain {
			chain_id: 1,
			..domain.clone()
		});
		assert_ne!(signing_hash(&scheme, &intent), signing_hash(&other, &intent));
	}

	#[test]
	fn test_low_parity_byte_accepted() {
		let wallet = signer();
		let intent = intent_for(wallet.address());
		let hash = signing_hash(&SigningScheme::PersonalSign, &intent);

		let mut bytes = wallet.sign_hash_sync(&hash).unwrap().as_bytes();
		bytes[64] -= 27;
		assert_eq!(
			recover_signer(&hash, &Signature::from(bytes)).unwrap(),
			wallet.address()
		);
	}

	#[test]
	fn test_malformed_signatures() {
		let hash = B256::repeat_byte(0x42);

		let short = Signature(vec![0u8; 64]);
		assert!(matches!(
			recover_signer(&hash, &short),
			Err(RecoveryError::Malformed(_))
		));

		let mut bad_parity = [0x11u8; 65];
		bad_parity[64] = 5;
		assert!(matches!(
			recover_signer(&hash, &Signature::from(bad_parity)),
			Err(RecoveryError::Malformed(_))
		));

		let mut zero_scalars = [0u8; 65];
		zero_scalars[64] = 27;
		assert!(recover_signer(&hash, &Signature::from(zero_scalars)).is_err());
	}
}
