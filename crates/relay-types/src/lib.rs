//! Common types for the meta-transaction relay.
//!
//! This crate holds the value types shared by the codec, the storage and
//! ledger backends and the relay executor, so that every component agrees on
//! how an intent, its digest and its signature are represented.

/// Transfer intents, digests and raw signatures.
pub mod intent;
/// Registry trait for self-registering backend implementations.
pub mod registry;
/// Secure string wrapper for private keys in configuration.
pub mod secret_string;
/// Signing convention configuration.
pub mod signing;
/// Storage namespaces.
pub mod storage;
/// Formatting, hashing and time helpers.
pub mod utils;
/// Configuration validation schema.
pub mod validation;

pub use intent::*;
pub use registry::ImplementationRegistry;
pub use secret_string::{SecretString, REDACTED};
pub use signing::*;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id, with_0x_prefix, without_0x_prefix};
pub use validation::*;

pub use alloy_primitives::{Address, B256, U256};
