//! Builder for constructing a relay executor from configuration.
//!
//! Storage and ledger implementations are created through name to factory
//! maps, so embedders can register their own backends next to the built-in
//! ones.

use crate::executor::RelayExecutor;
use relay_config::Config;
use relay_ledger::{LedgerError, LedgerFactory, LedgerInterface, LedgerService};
use relay_storage::{StorageError, StorageFactory, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while building a relay executor.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct RelayFactories<SF, LF> {
	pub storage_factories: HashMap<String, SF>,
	pub ledger_factories: HashMap<String, LF>,
}

impl RelayFactories<StorageFactory, LedgerFactory> {
	/// Collects every built-in storage and ledger implementation.
	pub fn from_registry() -> Self {
		let storage_factories = relay_storage::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect();
		let ledger_factories = relay_ledger::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect();

		Self {
			storage_factories,
			ledger_factories,
		}
	}
}

/// Builder for a [`RelayExecutor`] with pluggable implementations.
pub struct RelayBuilder {
	config: Config,
}

impl RelayBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the executor from the configured primary storage and ledger.
	///
	/// Every configured implementation that has a factory is instantiated, so
	/// an invalid table fails the build even when it is not the primary one.
	pub fn build<SF, LF>(
		self,
		factories: RelayFactories<SF, LF>,
	) -> Result<RelayExecutor, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		LF: Fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError>,
	{
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary storage '{}' has no registered implementation",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let mut ledger_impls = HashMap::new();
		for (name, config) in &self.config.ledger.implementations {
			if let Some(factory) = factories.ledger_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						ledger_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.ledger.primary == name;
						tracing::info!(component = "ledger", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "ledger",
							implementation = %name,
							error = %e,
							"Failed to create ledger implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create ledger implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		let primary_ledger = &self.config.ledger.primary;
		let ledger_backend = ledger_impls.remove(primary_ledger).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary ledger '{}' has no registered implementation",
				primary_ledger
			))
		})?;
		let ledger = Arc::new(LedgerService::from(ledger_backend));

		tracing::info!(
			relayer_id = %self.config.relayer.id,
			spender = %ledger.spender(),
			scheme = self.config.signing.as_str(),
			"Relay executor ready"
		);

		Ok(RelayExecutor::new(storage, ledger, self.config.signing))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relay_types::{Address, SigningScheme};

	const CONFIG: &str = r#"
[relayer]
id = "relayer-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[ledger]
primary = "memory"
[ledger.implementations.memory]
spender = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
"#;

	#[test]
	fn test_build_from_registry() {
		let config: Config = CONFIG.parse().unwrap();
		let executor = RelayBuilder::new(config)
			.build(RelayFactories::from_registry())
			.unwrap();

		assert_eq!(executor.scheme(), &SigningScheme::PersonalSign);
		assert_eq!(
			executor.spender(),
			"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
				.parse::<Address>()
				.unwrap()
		);
	}

	#[test]
	fn test_unregistered_primary_is_missing_component() {
		let config: Config = CONFIG
			.replace("[ledger]\nprimary = \"memory\"", "[ledger]\nprimary = \"custom\"")
			.replace("[ledger.implementations.memory]", "[ledger.implementations.custom]")
			.parse()
			.unwrap();

		let result = RelayBuilder::new(config).build(RelayFactories::from_registry());
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}

	#[test]
	fn test_invalid_backend_table_fails_build() {
		let config: Config = format!(
			"{}\n[storage.implementations.file]\nstorage_path = \"\"\n",
			CONFIG
		)
		.parse()
		.unwrap();

		let result = RelayBuilder::new(config).build(RelayFactories::from_registry());
		match result {
			Err(BuilderError::Config(message)) => assert!(message.contains("'file'")),
			Err(other) => panic!("unexpected error {}", other),
			Ok(_) => panic!("build should fail"),
		}
	}
}
