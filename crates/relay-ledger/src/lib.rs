//! Token ledger access for the relay.
//!
//! The relay never keeps balances itself. It asks a ledger to move funds from
//! an owner to a recipient on the relayer's behalf, with the relayer acting
//! as the approved spender. Implementations must report a definite outcome
//! whenever they can and flag the cases where they cannot.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use relay_types::{ConfigSchema, ImplementationRegistry};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors reported by a ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
	#[error("Insufficient balance: available {available}, required {required}")]
	InsufficientBalance { available: U256, required: U256 },
	#[error("Insufficient allowance: available {available}, required {required}")]
	InsufficientAllowance { available: U256, required: U256 },
	/// Any other rejection where the ledger guarantees no funds moved.
	#[error("Transfer rejected: {0}")]
	Rejected(String),
	/// The outcome is unknown; funds may or may not have moved.
	#[error("Ledger unavailable: {0}")]
	Unavailable(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl LedgerError {
	/// Returns true when the ledger guarantees that no funds moved.
	pub fn is_definite_rejection(&self) -> bool {
		matches!(
			self,
			LedgerError::InsufficientBalance { .. }
				| LedgerError::InsufficientAllowance { .. }
				| LedgerError::Rejected(_)
		)
	}
}

/// Interface every ledger backend implements.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Returns the configuration schema for this ledger implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Identity whose allowance is consumed by `transfer_from`.
	fn spender(&self) -> Address;

	/// Moves `amount` of `asset` from `owner` to `recipient`.
	///
	/// `Ok(())` means the transfer happened. An error satisfying
	/// [`LedgerError::is_definite_rejection`] means it did not.
	async fn transfer_from(
		&self,
		asset: Address,
		owner: Address,
		recipient: Address,
		amount: U256,
	) -> Result<(), LedgerError>;
}

/// Factory building a ledger backend from its TOML table.
pub type LedgerFactory = fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError>;

/// Registry trait for ledger implementations.
pub trait LedgerRegistry: ImplementationRegistry<Factory = LedgerFactory> {}

/// Returns `(name, factory)` for every built-in ledger backend.
pub fn get_all_implementations() -> Vec<(&'static str, LedgerFactory)> {
	use implementations::{evm::alloy, memory};

	vec![
		(alloy::Registry::NAME, alloy::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Service wrapping the configured ledger backend.
#[derive(Clone)]
pub struct LedgerService {
	implementation: Arc<dyn LedgerInterface>,
}

impl LedgerService {
	pub fn new(implementation: Arc<dyn LedgerInterface>) -> Self {
		Self { implementation }
	}

	/// Identity the ledger spends allowances of.
	pub fn spender(&self) -> Address {
		self.implementation.spender()
	}

	/// Moves funds through the underlying ledger.
	pub async fn transfer_from(
		&self,
		asset: Address,
		owner: Address,
		recipient: Address,
		amount: U256,
	) -> Result<(), LedgerError> {
		tracing::debug!(
			asset = %asset,
			owner = %owner,
			recipient = %recipient,
			amount = %amount,
			"Requesting transferFrom"
		);
		self.implementation
			.transfer_from(asset, owner, recipient, amount)
			.await
	}
}

impl From<Box<dyn LedgerInterface>> for LedgerService {
	fn from(implementation: Box<dyn LedgerInterface>) -> Self {
		Self::new(Arc::from(implementation))
	}
}
