//! In-memory token ledger.
//!
//! Keeps ERC-20 style balances and allowances per asset. Used by tests and
//! local runs where no chain is available.

use crate::{LedgerError, LedgerInterface};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use relay_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
	/// Keyed by (asset, owner).
	balances: HashMap<(Address, Address), U256>,
	/// Keyed by (asset, owner, spender).
	allowances: HashMap<(Address, Address, Address), U256>,
}

/// In-memory ledger implementation.
pub struct MemoryLedger {
	spender: Address,
	state: RwLock<LedgerState>,
}

impl MemoryLedger {
	/// Creates an empty ledger whose `transfer_from` spends allowances
	/// granted to `spender`.
	pub fn new(spender: Address) -> Self {
		Self {
			spender,
			state: RwLock::new(LedgerState::default()),
		}
	}

	/// Credits `amount` of `asset` to `owner`.
	pub async fn mint(&self, asset: Address, owner: Address, amount: U256) {
		let mut state = self.state.write().await;
		let balance = state.balances.entry((asset, owner)).or_default();
		*balance = balance.saturating_add(amount);
	}

	/// Sets the allowance `owner` grants to `spender` for `asset`.
	pub async fn approve(&self, asset: Address, owner: Address, spender: Address, amount: U256) {
		let mut state = self.state.write().await;
		state.allowances.insert((asset, owner, spender), amount);
	}

	pub async fn balance_of(&self, asset: Address, owner: Address) -> U256 {
		let state = self.state.read().await;
		state
			.balances
			.get(&(asset, owner))
			.copied()
			.unwrap_or_default()
	}

	pub async fn allowance(&self, asset: Address, owner: Address, spender: Address) -> U256 {
		let state = self.state.read().await;
		state
			.allowances
			.get(&(asset, owner, spender))
			.copied()
			.unwrap_or_default()
	}
}

#[async_trait]
impl LedgerInterface for MemoryLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryLedgerSchema)
	}

	fn spender(&self) -> Address {
		self.spender
	}

	async fn transfer_from(
		&self,
		asset: Address,
		owner: Address,
		recipient: Address,
		amount: U256,
	) -> Result<(), LedgerError> {
		if recipient == Address::ZERO {
			return Err(LedgerError::Rejected(
				"transfer to the zero address".to_string(),
			));
		}

		let mut state = self.state.write().await;

		let allowance_key = (asset, owner, self.spender);
		let allowance = state
			.allowances
			.get(&allowance_key)
			.copied()
			.unwrap_or_default();
		if allowance < amount {
			return Err(LedgerError::InsufficientAllowance {
				available: allowance,
				required: amount,
			});
		}

		let balance = state
			.balances
			.get(&(asset, owner))
			.copied()
			.unwrap_or_default();
		if balance < amount {
			return Err(LedgerError::InsufficientBalance {
				available: balance,
				required: amount,
			});
		}

		// Unlimited approvals are never decremented
		if allowance != U256::MAX {
			state.allowances.insert(allowance_key, allowance - amount);
		}
		state.balances.insert((asset, owner), balance - amount);
		let credited = state.balances.entry((asset, recipient)).or_default();
		*credited = credited.saturating_add(amount);

		Ok(())
	}
}

/// Configuration schema for MemoryLedger.
pub struct MemoryLedgerSchema;

impl ConfigSchema for MemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![Field::new("spender", FieldType::Address)], vec![]);
		schema.validate(config)
	}
}

/// Factory function to create a memory ledger from configuration.
///
/// Configuration parameters:
/// - `spender`: Address whose allowances the ledger consumes (required)
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	MemoryLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(e.to_string()))?;

	let spender = config
		.get("spender")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LedgerError::Configuration("spender is required".to_string()))?
		.parse::<Address>()
		.map_err(|e| LedgerError::Configuration(format!("Invalid spender: {}", e)))?;

	Ok(Box::new(MemoryLedger::new(spender)))
}

/// Registry for the memory ledger implementation.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::LedgerFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl crate::LedgerRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	const ASSET: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
	const OWNER: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
	const RECIPIENT: Address = address!("90F79bf6EB2c4f870365E785982E1f101E93b906");
	const RELAYER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

	async fn funded_ledger(balance: u64, allowance: u64) -> MemoryLedger {
		let ledger = MemoryLedger::new(RELAYER);
		ledger.mint(ASSET, OWNER, U256::from(balance)).await;
		ledger
			.approve(ASSET, OWNER, RELAYER, U256::from(allowance))
			.await;
		ledger
	}

	#[tokio::test]
	async fn test_transfer_moves_balance_and_consumes_allowance() {
		let ledger = funded_ledger(10_000, 100).await;

		ledger
			.transfer_from(ASSET, OWNER, RECIPIENT, U256::from(10u64))
			.await
			.unwrap();

		assert_eq!(ledger.balance_of(ASSET, OWNER).await, U256::from(9_990u64));
		assert_eq!(ledger.balance_of(ASSET, RECIPIENT).await, U256::from(10u64));
		assert_eq!(
			ledger.allowance(ASSET, OWNER, RELAYER).await,
			U256::from(90u64)
		);
	}

	#[tokio::test]
	async fn test_insufficient_allowance_leaves_state_untouched() {
		let ledger = funded_ledger(10_000, 5).await;

		let err = ledger
			.transfer_from(ASSET, OWNER, RECIPIENT, U256::from(10u64))
			.await
			.unwrap_err();
		assert_eq!(
			err,
			LedgerError::InsufficientAllowance {
				available: U256::from(5u64),
				required: U256::from(10u64),
			}
		);
		assert!(err.is_definite_rejection());
		assert_eq!(ledger.balance_of(ASSET, OWNER).await, U256::from(10_000u64));
		assert_eq!(ledger.balance_of(ASSET, RECIPIENT).await, U256::ZERO);
	}

	#[tokio::test]
	async fn test_insufficient_balance() {
		let ledger = funded_ledger(3, 100).await;

		let err = ledger
			.transfer_from(ASSET, OWNER, RECIPIENT, U256::from(10u64))
			.await
			.unwrap_err();
		assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
		assert_eq!(
			ledger.allowance(ASSET, OWNER, RELAYER).await,
			U256::from(100u64)
		);
	}

	#[tokio::test]
	async fn test_allowance_for_other_spender_is_ignored() {
		let ledger = MemoryLedger::new(RELAYER);
		ledger.mint(ASSET, OWNER, U256::from(100u64)).await;
		ledger
			.approve(ASSET, OWNER, RECIPIENT, U256::from(100u64))
			.await;

		let err = ledger
			.transfer_from(ASSET, OWNER, RECIPIENT, U256::from(1u64))
			.await
			.unwrap_err();
		assert!(matches!(err, LedgerError::InsufficientAllowance { .. }));
	}

	#[tokio::test]
	async fn test_unlimited_allowance_is_not_decremented() {
		let ledger = MemoryLedger::new(RELAYER);
		ledger.mint(ASSET, OWNER, U256::from(100u64)).await;
		ledger.approve(ASSET, OWNER, RELAYER, U256::MAX).await;

		ledger
			.transfer_from(ASSET, OWNER, RECIPIENT, U256::from(40u64))
			.await
			.unwrap();
		assert_eq!(ledger.allowance(ASSET, OWNER, RELAYER).await, U256::MAX);
	}

	#[tokio::test]
	async fn test_zero_recipient_rejected() {
		let ledger = funded_ledger(100, 100).await;
		let err = ledger
			.transfer_from(ASSET, OWNER, Address::ZERO, U256::from(1u64))
			.await
			.unwrap_err();
		assert!(matches!(err, LedgerError::Rejected(_)));
	}

	#[test]
	fn test_config_requires_spender() {
		let missing = toml::Value::Table(toml::Table::new());
		assert!(matches!(
			create_ledger(&missing),
			Err(LedgerError::Configuration(_))
		));

		let config: toml::Value = toml::Value::Table(
			toml::from_str::<toml::Table>(
				r#"spender = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266""#,
			)
			.unwrap(),
		);
		let ledger = create_ledger(&config).unwrap();
		assert_eq!(ledger.spender(), RELAYER);
	}
}
