//! ERC-20 ledger backed by an EVM chain.
//!
//! Calls `transferFrom(owner, recipient, amount)` on the asset contract from
//! the relayer's wallet over JSON-RPC using the Alloy library. Every transfer
//! is simulated with `eth_call` before broadcasting, so the common failures
//! (missing approval, short balance, paused token) surface as definite
//! rejections without spending gas. Waiting for the receipt is bounded; a
//! transaction that is not mined in time is reported as `Unavailable`.

use crate::{LedgerError, LedgerInterface};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall};
use alloy_transport::TransportError;
use alloy_transport_http::Http;
use async_trait::async_trait;
use relay_types::{ConfigSchema, Field, FieldType, Schema, SecretString, ValidationError};
use std::sync::Arc;
use std::time::Duration;

/// How long to wait for a broadcast transfer to be mined.
const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

sol! {
	interface IERC20 {
		function transferFrom(address from, address to, uint256 value) external returns (bool);
	}
}

/// Alloy-based ERC-20 ledger.
pub struct AlloyLedger {
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	/// Address of the relayer wallet sending `transferFrom`.
	spender: Address,
	chain_id: u64,
	receipt_timeout: Duration,
}

impl AlloyLedger {
	/// Creates a ledger sending transactions signed by `signer` to `rpc_url`.
	pub fn new(rpc_url: &str, chain_id: u64, signer: PrivateKeySigner) -> Result<Self, LedgerError> {
		let url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Configuration(format!("Invalid RPC URL: {}", e)))?;

		let spender = signer.address();
		let wallet = EthereumWallet::from(signer.with_chain_id(Some(chain_id)));

		let provider = ProviderBuilder::new()
			.with_recommended_fillers()
			.wallet(wallet)
			.on_http(url);

		Ok(Self {
			provider: Arc::new(provider) as Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
			spender,
			chain_id,
			receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
		})
	}

	/// Sets how long `transfer_from` waits for the transaction receipt.
	pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
		self.receipt_timeout = timeout;
		self
	}

	fn transfer_request(
		&self,
		asset: Address,
		owner: Address,
		recipient: Address,
		amount: U256,
	) -> TransactionRequest {
		let call = IERC20::transferFromCall {
			from: owner,
			to: recipient,
			value: amount,
		};
		TransactionRequest::default()
			.from(self.spender)
			.to(asset)
			.input(call.abi_encode().into())
	}

	/// Runs the transfer through `eth_call` without broadcasting it.
	async fn simulate(&self, request: &TransactionRequest) -> Result<(), LedgerError> {
		let output = self
			.provider
			.call(request)
			.await
			.map_err(|e| classify_rpc_error("Simulation failed", e))?;

		// Tokens that return nothing on success are accepted as-is
		if output.is_empty() {
			return Ok(());
		}

		match IERC20::transferFromCall::abi_decode_returns(&output, false) {
			Ok(ret) if ret._0 => Ok(()),
			Ok(_) => Err(LedgerError::Rejected(
				"transferFrom returned false".to_string(),
			)),
			Err(e) => Err(LedgerError::Rejected(format!(
				"Unexpected transferFrom return data: {}",
				e
			))),
		}
	}
}

/// Maps an RPC failure to a ledger error.
///
/// A JSON-RPC error response means the node evaluated the request and refused
/// it (typically a revert). Anything else leaves the outcome unknown.
fn classify_rpc_error(context: &str, error: TransportError) -> LedgerError {
	if error.is_error_resp() {
		LedgerError::Rejected(format!("{}: {}", context, error))
	} else {
		LedgerError::Unavailable(format!("{}: {}", context, error))
	}
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyLedgerSchema)
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
		let request = self.transfer_request(asset, owner, recipient, amount);

		self.simulate(&request).await?;

		// Nothing is broadcast yet, so a refusal here is still definite
		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| classify_rpc_error("Failed to send transaction", e))?;

		let tx_hash = *pending.tx_hash();
		tracing::info!(
			tx_hash = %tx_hash,
			chain_id = self.chain_id,
			"Submitted transferFrom"
		);

		let receipt = pending
			.with_timeout(Some(self.receipt_timeout))
			.get_receipt()
			.await
			.map_err(|e| {
				LedgerError::Unavailable(format!("Failed to get receipt for {}: {}", tx_hash, e))
			})?;

		if !receipt.status() {
			return Err(LedgerError::Rejected(format!(
				"Transaction {} reverted",
				tx_hash
			)));
		}

		tracing::info!(
			tx_hash = %tx_hash,
			block_number = receipt.block_number.unwrap_or(0),
			"transferFrom confirmed"
		);
		Ok(())
	}
}

/// Configuration schema for AlloyLedger.
pub struct AlloyLedgerSchema;

impl ConfigSchema for AlloyLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("rpc_url must be an http(s) URL".to_string()),
					}
				}),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("private_key", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(key) if key.trim().is_empty() => {
							Err("private_key cannot be empty".to_string())
						},
						_ => Ok(()),
					}
				}),
			],
			// Optional fields
			vec![Field::new(
				"receipt_timeout_secs",
				FieldType::Integer {
					min: Some(1),
					max: None,
				},
			)],
		);
		schema.validate(config)
	}
}

/// Receipt timeout from the `receipt_timeout_secs` field, if set.
fn receipt_timeout(config: &toml::Value) -> Duration {
	config
		.get("receipt_timeout_secs")
		.and_then(|v| v.as_integer())
		.and_then(|secs| u64::try_from(secs).ok())
		.map(Duration::from_secs)
		.unwrap_or(DEFAULT_RECEIPT_TIMEOUT)
}

/// Factory function to create an EVM ledger from configuration.
///
/// Configuration parameters:
/// - `rpc_url`: HTTP(S) JSON-RPC endpoint
/// - `chain_id`: Chain the asset contracts live on
/// - `private_key`: Relayer wallet key, hex encoded
/// - `receipt_timeout_secs`: How long to wait for a receipt (default: 120)
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	AlloyLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LedgerError::Configuration("rpc_url is required".to_string()))?;

	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| LedgerError::Configuration("chain_id is required".to_string()))?
		as u64;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| LedgerError::Configuration("private_key is required".to_string()))?;

	let signer = private_key.with_exposed(|key| {
		key.parse::<PrivateKeySigner>()
			.map_err(|_| LedgerError::Configuration("Invalid private_key".to_string()))
	})?;

	let ledger =
		AlloyLedger::new(rpc_url, chain_id, signer)?.with_receipt_timeout(receipt_timeout(config));
	Ok(Box::new(ledger))
}

/// Registry for the EVM ledger implementation.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
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
	use alloy_transport::TransportErrorKind;

	const RELAYER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn config(rpc_url: &str, private_key: &str) -> toml::Value {
		let mut table = toml::Table::new();
		table.insert("rpc_url".into(), toml::Value::String(rpc_url.into()));
		table.insert("chain_id".into(), toml::Value::Integer(31337));
		table.insert(
			"private_key".into(),
			toml::Value::String(private_key.into()),
		);
		toml::Value::Table(table)
	}

	#[test]
	fn test_factory_derives_spender_from_key() {
		let ledger = create_ledger(&config("http://localhost:8545", RELAYER_KEY)).unwrap();
		assert_eq!(
			ledger.spender(),
			address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
		);
	}

	#[test]
	fn test_factory_rejects_bad_config() {
		assert!(matches!(
			create_ledger(&config("ws://localhost:8545", RELAYER_KEY)),
			Err(LedgerError::Configuration(_))
		));
		assert!(matches!(
			create_ledger(&config("http://localhost:8545", "not-a-key")),
			Err(LedgerError::Configuration(_))
		));
		assert!(matches!(
			create_ledger(&config("http://localhost:8545", "  ")),
			Err(LedgerError::Configuration(_))
		));

		let mut missing_chain = config("http://localhost:8545", RELAYER_KEY);
		if let Some(table) = missing_chain.as_table_mut() {
			table.remove("chain_id");
		}
		assert!(matches!(
			create_ledger(&missing_chain),
			Err(LedgerError::Configuration(_))
		));
	}

	#[test]
	fn test_receipt_timeout_is_configurable() {
		let mut table = config("http://localhost:8545", RELAYER_KEY);
		assert_eq!(receipt_timeout(&table), DEFAULT_RECEIPT_TIMEOUT);

		if let Some(t) = table.as_table_mut() {
			t.insert("receipt_timeout_secs".into(), toml::Value::Integer(30));
		}
		assert_eq!(receipt_timeout(&table), Duration::from_secs(30));
		assert!(create_ledger(&table).is_ok());

		if let Some(t) = table.as_table_mut() {
			t.insert("receipt_timeout_secs".into(), toml::Value::Integer(0));
		}
		assert!(matches!(
			create_ledger(&table),
			Err(LedgerError::Configuration(_))
		));
	}

	#[test]
	fn test_transport_failures_are_indeterminate() {
		let err = classify_rpc_error(
			"Failed to send transaction",
			TransportErrorKind::custom_str("connection reset"),
		);
		assert!(matches!(err, LedgerError::Unavailable(_)));
		assert!(!err.is_definite_rejection());
	}

	#[test]
	fn test_transfer_request_encoding() {
		let ledger = AlloyLedger::new(
			"http://localhost:8545",
			31337,
			RELAYER_KEY.parse().unwrap(),
		)
		.unwrap();

		let asset = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
		let owner = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
		let recipient = address!("90F79bf6EB2c4f870365E785982E1f101E93b906");
		let request = ledger.transfer_request(asset, owner, recipient, U256::from(10u64));

		assert_eq!(request.from, Some(ledger.spender()));
		let input = request.input.input().cloned().unwrap_or_default();
		// transferFrom(address,address,uint256)
		assert_eq!(&input[..4], &[0x23, 0xb8, 0x72, 0xdd]);
		assert_eq!(input.len(), 4 + 32 * 3);

		let decoded = IERC20::transferFromCall::abi_decode(&input, true).unwrap();
		assert_eq!(decoded.from, owner);
		assert_eq!(decoded.to, recipient);
		assert_eq!(decoded.value, U256::from(10u64));
	}
}
