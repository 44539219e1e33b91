//! Core of the meta-transaction relay.
//!
//! A [`RelayExecutor`] accepts a [`TransferIntent`] together with the
//! sender's signature, checks that the sender really signed it, and executes
//! the transfer through the configured ledger at most once per intent digest.
//! [`RelayBuilder`] assembles an executor from a [`relay_config::Config`].

pub mod builder;
pub mod executor;
pub mod replay;

pub use builder::{BuilderError, RelayBuilder, RelayFactories};
pub use executor::{ExecutionError, ExecutionReceipt, RelayExecutor};
pub use relay_codec::get_hash;
pub use replay::{DigestGuard, ReplayEntry, ReplayRecord, ReplayStatus};
pub use relay_types::{Digest, Signature, SigningScheme, TransferIntent};
