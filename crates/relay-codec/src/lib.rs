//! Authorization codec for relayed transfers.
//!
//! Two pure halves live here:
//! - [`digest`] turns the five intent fields into the canonical digest that
//!   keys replay protection.
//! - [`signature`] derives the hash a sender actually signs under the
//!   configured convention and recovers the signer from a signature.
//!
//! Neither half holds state, so clients and the executor can call the same
//! functions and never disagree on encoding.

pub mod digest;
pub mod signature;

pub use digest::{encode_packed, get_hash, get_intent_hash, IntentDigest, PACKED_INTENT_LENGTH};
pub use signature::{
	intent_struct_hash, recover_intent_signer, recover_signer, signing_hash, RecoveryError,
};
