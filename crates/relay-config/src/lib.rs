//! Configuration module for the meta-transaction relay.
//!
//! Loads the relay configuration from TOML, resolving `${VAR}` and
//! `${VAR:-default}` placeholders from the environment before parsing, and
//! validates it so that a relay is never built from a half-specified file.

use regex::Regex;
use relay_types::{SecretString, SigningScheme};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this relayer instance.
	pub relayer: RelayerConfig,
	/// Which message senders sign. Defaults to `personal_sign`.
	#[serde(default)]
	pub signing: SigningScheme,
	/// Replay record storage.
	pub storage: StorageConfig,
	/// Token ledger the relay moves funds through.
	pub ledger: LedgerConfig,
}

/// Configuration specific to the relayer instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerConfig {
	/// Unique identifier for this relayer, used in logs.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: BackendTables,
}

/// Configuration for the ledger backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of ledger implementation names to their configurations.
	pub implementations: BackendTables,
}

/// Fields of a backend table that hold secrets.
const SECRET_FIELDS: &[&str] = &["private_key"];

/// Raw backend tables keyed by implementation name.
///
/// The tables are handed to the backend factories unchanged. Formatting and
/// serializing them redacts every secret field, so a loaded configuration can
/// be logged or dumped without exposing the relayer key.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct BackendTables(HashMap<String, toml::Value>);

impl BackendTables {
	/// Copy of the tables with every secret replaced by its redacted form.
	fn redacted(&self) -> HashMap<&str, toml::Value> {
		self.0
			.iter()
			.map(|(name, table)| (name.as_str(), redact_secrets(table)))
			.collect()
	}
}

fn redact_secrets(value: &toml::Value) -> toml::Value {
	match value {
		toml::Value::Table(table) => toml::Value::Table(
			table
				.iter()
				.map(|(key, field)| {
					let field = match field {
						toml::Value::String(secret) if SECRET_FIELDS.contains(&key.as_str()) => {
							toml::Value::String(SecretString::from(secret.as_str()).to_string())
						},
						other => redact_secrets(other),
					};
					(key.clone(), field)
				})
				.collect(),
		),
		toml::Value::Array(items) => toml::Value::Array(items.iter().map(redact_secrets).collect()),
		other => other.clone(),
	}
}

impl Deref for BackendTables {
	type Target = HashMap<String, toml::Value>;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a> IntoIterator for &'a BackendTables {
	type Item = (&'a String, &'a toml::Value);
	type IntoIter = std::collections::hash_map::Iter<'a, String, toml::Value>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

impl fmt::Debug for BackendTables {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.redacted()).finish()
	}
}

impl Serialize for BackendTables {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.redacted().serialize(serializer)
	}
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB.
pub fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		content.parse()
	}

	/// Validates the configuration.
	///
	/// - the relayer id is not empty
	/// - storage and ledger each name a configured primary implementation
	/// - an EIP-712 domain has a name, a non-zero chain id and a verifying contract
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.relayer.id.trim().is_empty() {
			return Err(ConfigError::Validation("Relayer ID cannot be empty".into()));
		}

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_primary("ledger", &self.ledger.primary, &self.ledger.implementations)?;

		if let SigningScheme::Eip712(domain) = &self.signing {
			if domain.domain_name.trim().is_empty() {
				return Err(ConfigError::Validation(
					"EIP-712 domain_name cannot be empty".into(),
				));
			}
			if domain.chain_id == 0 {
				return Err(ConfigError::Validation(
					"EIP-712 chain_id must be non-zero".into(),
				));
			}
			if domain.verifying_contract.is_zero() {
				return Err(ConfigError::Validation(
					"EIP-712 verifying_contract cannot be the zero address".into(),
				));
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a configuration from a TOML string.
///
/// Environment variables are resolved first and the result is validated.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
