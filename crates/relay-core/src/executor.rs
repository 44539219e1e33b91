//! Relay executor.
//!
//! Verifies a signed transfer intent and, if it has never run before, moves
//! the funds through the ledger. The order of operations is fixed:
//! digest, signature, replay claim, transfer. A definite ledger rejection
//! rolls the claim back; any other answer settles it for good.

use crate::replay::{ReplayEntry, ReplayRecord, ReplayStatus};
use relay_codec::{get_hash, get_intent_hash, recover_intent_signer, signing_hash};
use relay_ledger::{LedgerError, LedgerService};
use relay_storage::StorageService;
use relay_types::{
	truncate_id, Address, Digest, Signature, SigningScheme, TransferIntent,
	B256, U256,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Reasons an execution did not complete.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
	/// The signature is malformed or was not produced by the intent's sender.
	#[error("Invalid signature")]
	InvalidSignature,
	/// The intent's digest is already in the replay record.
	#[error("Intent already executed")]
	AlreadyExecuted,
	/// Another executor sharing the replay storage is executing the intent.
	#[error("Intent execution in progress")]
	InProgress,
	/// The ledger refused the transfer and no funds moved.
	#[error("Transfer rejected: {0}")]
	TransferRejected(String),
	#[error("Invalid intent: {0}")]
	InvalidIntent(String),
	/// The ledger outcome is unknown. The intent stays marked as executed.
	#[error("Ledger unavailable: {0}")]
	LedgerUnavailable(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl ExecutionError {
	/// Whether resubmitting the same intent and signature can succeed later.
	///
	/// A ledger rejection qualifies once the owner fixes their balance or
	/// allowance. An execution in progress elsewhere may still be rolled back.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ExecutionError::TransferRejected(_) | ExecutionError::InProgress
		)
	}
}

/// Proof of a completed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReceipt {
	/// Digest of the executed intent.
	pub digest: Digest,
}

/// Executes signed transfer intents at most once each.
pub struct RelayExecutor {
	replay: Arc<ReplayRecord>,
	ledger: Arc<LedgerService>,
	scheme: SigningScheme,
}

impl RelayExecutor {
	/// Creates an executor with its own replay record over `storage`.
	pub fn new(
		storage: Arc<StorageService>,
		ledger: Arc<LedgerService>,
		scheme: SigningScheme,
	) -> Self {
		Self::with_replay(Arc::new(ReplayRecord::new(storage)), ledger, scheme)
	}

	/// Creates an executor sharing `replay` with other executors.
	///
	/// Executors in one process should share their replay record: submissions
	/// of the same digest then wait for each other instead of failing with
	/// [`ExecutionError::InProgress`].
	pub fn with_replay(
		replay: Arc<ReplayRecord>,
		ledger: Arc<LedgerService>,
		scheme: SigningScheme,
	) -> Self {
		Self {
			replay,
			ledger,
			scheme,
		}
	}

	pub fn replay(&self) -> &Arc<ReplayRecord> {
		&self.replay
	}

	/// The signing convention signatures are checked against.
	pub fn scheme(&self) -> &SigningScheme {
		&self.scheme
	}

	/// Identity the ledger moves funds as. Owners must approve it.
	pub fn spender(&self) -> Address {
		self.ledger.spender()
	}

	/// Digest of a transfer, identical to [`relay_codec::get_hash`].
	pub fn get_hash(
		&self,
		sender: &Address,
		amount: U256,
		recipient: &Address,
		nonce: U256,
		asset: &Address,
	) -> Digest {
		get_hash(sender, amount, recipient, nonce, asset)
	}

	/// Hash a sender must sign for `intent` under this executor's convention.
	pub fn signing_hash(&self, intent: &TransferIntent) -> B256 {
		signing_hash(&self.scheme, intent)
	}

	/// Whether the intent with `digest` has been executed.
	///
	/// An execution still waiting on the ledger reads as not executed. An
	/// execution whose outcome the ledger could not report reads as executed.
	pub async fn is_executed(&self, digest: &Digest) -> Result<bool, ExecutionError> {
		self.replay
			.contains(*digest)
			.await
			.map_err(|e| ExecutionError::Storage(e.to_string()))
	}

	/// The settled replay entry for `digest`, if any.
	pub async fn executed_entry(
		&self,
		digest: &Digest,
	) -> Result<Option<ReplayEntry>, ExecutionError> {
		self.replay
			.entry(*digest)
			.await
			.map_err(|e| ExecutionError::Storage(e.to_string()))
	}

	/// Executes a transfer given as separate fields.
	pub async fn execute_parts(
		&self,
		sender: Address,
		amount: U256,
		recipient: Address,
		nonce: U256,
		asset: Address,
		signature: &Signature,
	) -> Result<ExecutionReceipt, ExecutionError> {
		let intent = TransferIntent::new(sender, amount, recipient, nonce, asset);
		self.execute(&intent, signature).await
	}

	/// Verifies `signature` over `intent` and executes the transfer once.
	pub async fn execute(
		&self,
		intent: &TransferIntent,
		signature: &Signature,
	) -> Result<ExecutionReceipt, ExecutionError> {
		let digest = get_intent_hash(intent);
		self.execute_digest(digest, intent, signature).await
	}

	#[instrument(skip_all, fields(digest = %truncate_id(&digest.to_string()), sender = %intent.sender))]
	async fn execute_digest(
		&self,
		digest: Digest,
		intent: &TransferIntent,
		signature: &Signature,
	) -> Result<ExecutionReceipt, ExecutionError> {
		if intent.amount.is_zero() {
			tracing::warn!("Rejected intent with zero amount");
			return Err(ExecutionError::InvalidIntent(
				"amount must be positive".to_string(),
			));
		}

		match recover_intent_signer(&self.scheme, intent, signature) {
			Ok(signer) if signer == intent.sender => {},
			Ok(signer) => {
				tracing::warn!(signer = %signer, "Signature does not match sender");
				return Err(ExecutionError::InvalidSignature);
			},
			Err(e) => {
				tracing::warn!(error = %e, "Signature recovery failed");
				return Err(ExecutionError::InvalidSignature);
			},
		}

		let guard = self.replay.lock(digest).await;
		tracing::debug!("Acquired digest lock");

		let claim = ReplayEntry::in_flight(*intent);
		let marked = guard.mark(&claim).await.map_err(|e| {
			tracing::error!(error = %e, "Failed to claim intent");
			ExecutionError::Storage(e.to_string())
		})?;
		if !marked {
			let existing = guard
				.stored()
				.await
				.map_err(|e| ExecutionError::Storage(e.to_string()))?;
			return Err(match existing {
				Some(entry) if entry.status.is_settled() => {
					tracing::warn!("Replay rejected");
					ExecutionError::AlreadyExecuted
				},
				_ => {
					tracing::info!("Intent is being executed elsewhere");
					ExecutionError::InProgress
				},
			});
		}

		match self
			.ledger
			.transfer_from(intent.asset, intent.sender, intent.recipient, intent.amount)
			.await
		{
			Ok(()) => {
				tracing::info!(
					recipient = %intent.recipient,
					amount = %intent.amount,
					"Executed transfer"
				);
				// The funds moved; a failed write leaves the claim in flight,
				// which still blocks replays.
				if let Err(e) = guard.settle(&claim.settled(ReplayStatus::Executed)).await {
					tracing::error!(error = %e, "Failed to record executed intent");
				}
				Ok(ExecutionReceipt { digest })
			},
			Err(e) if e.is_definite_rejection() => {
				tracing::debug!("Rolling back replay mark");
				if let Err(rollback) = guard.unmark().await {
					tracing::error!(
						error = %rollback,
						"Failed to roll back replay mark after rejected transfer"
					);
					return Err(ExecutionError::Storage(format!(
						"Failed to roll back replay mark after rejection ({}): {}",
						e, rollback
					)));
				}
				tracing::warn!(error = %e, "Transfer rejected by ledger");
				Err(ExecutionError::TransferRejected(e.to_string()))
			},
			Err(e) => {
				tracing::error!(
					error = %e,
					"Ledger outcome unknown, keeping intent marked as executed"
				);
				if let Err(settle) = guard
					.settle(&claim.settled(ReplayStatus::Unresolved))
					.await
				{
					tracing::error!(error = %settle, "Failed to record unresolved intent");
				}
				Err(match e {
					LedgerError::Unavailable(reason) => ExecutionError::LedgerUnavailable(reason),
					other => ExecutionError::LedgerUnavailable(other.to_string()),
				})
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;
	use async_trait::async_trait;
	use mockall::mock;
	use relay_ledger::LedgerInterface;
	use relay_storage::implementations::memory::MemoryStorage;
	use relay_types::{ConfigSchema, Eip712Domain};

	mock! {
		pub Ledger {}

		#[async_trait]
		impl LedgerInterface for Ledger {
			fn config_schema(&self) -> Box<dyn ConfigSchema>;
			fn spender(&self) -> Address;
			async fn transfer_from(
				&self,
				asset: Address,
				owner: Address,
				recipient: Address,
				amount: U256,
			) -> Result<(), LedgerError>;
		}
	}

	fn wallet() -> PrivateKeySigner {
		"0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
			.parse()
			.unwrap()
	}

	fn intent() -> TransferIntent {
		TransferIntent::new(
			wallet().address(),
			U256::from(10u64),
			Address::repeat_byte(0x90),
			U256::from(1u64),
			Address::repeat_byte(0x5f),
		)
	}

	fn sign(intent: &TransferIntent) -> Signature {
		let sig = wallet()
			.sign_message_sync(get_intent_hash(intent).as_slice())
			.unwrap();
		Signature::from(sig.as_bytes())
	}

	fn executor(ledger: MockLedger) -> RelayExecutor {
		RelayExecutor::new(
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			Arc::new(LedgerService::new(Arc::new(ledger))),
			SigningScheme::PersonalSign,
		)
	}

	#[tokio::test]
	async fn test_success_calls_ledger_once_with_intent_fields() {
		let intent = intent();
		let mut ledger = MockLedger::new();
		ledger
			.expect_transfer_from()
			.withf(move |asset, owner, recipient, amount| {
				*asset == intent.asset
					&& *owner == intent.sender
					&& *recipient == intent.recipient
					&& *amount == intent.amount
			})
			.times(1)
			.returning(|_, _, _, _| Ok(()));
		let executor = executor(ledger);

		let receipt = executor.execute(&intent, &sign(&intent)).await.unwrap();
		assert_eq!(receipt.digest, get_intent_hash(&intent));
		assert!(executor.is_executed(&receipt.digest).await.unwrap());

		let entry = executor.executed_entry(&receipt.digest).await.unwrap().unwrap();
		assert_eq!(entry.intent, intent);
		assert_eq!(entry.status, ReplayStatus::Executed);

		assert_eq!(
			executor.execute(&intent, &sign(&intent)).await,
			Err(ExecutionError::AlreadyExecuted)
		);
	}

	#[tokio::test]
	async fn test_invalid_signature_never_reaches_ledger() {
		let mut ledger = MockLedger::new();
		ledger.expect_transfer_from().times(0);
		let executor = executor(ledger);

		let intent = intent();
		let tampered = TransferIntent {
			amount: U256::from(11u64),
			..intent
		};
		assert_eq!(
			executor.execute(&tampered, &sign(&intent)).await,
			Err(ExecutionError::InvalidSignature)
		);
		assert!(!executor
			.is_executed(&get_intent_hash(&tampered))
			.await
			.unwrap());

		let garbage = Signature::from([0u8; 65]);
		assert_eq!(
			executor.execute(&intent, &garbage).await,
			Err(ExecutionError::InvalidSignature)
		);
	}

	#[tokio::test]
	async fn test_zero_amount_rejected() {
		let mut ledger = MockLedger::new();
		ledger.expect_transfer_from().times(0);
		let executor = executor(ledger);

		let zero = TransferIntent {
			amount: U256::ZERO,
			..intent()
		};
		assert!(matches!(
			executor.execute(&zero, &sign(&zero)).await,
			Err(ExecutionError::InvalidIntent(_))
		));
	}

	#[tokio::test]
	async fn test_rejection_rolls_back_mark() {
		let mut ledger = MockLedger::new();
		let mut calls = 0;
		ledger
			.expect_transfer_from()
			.times(2)
			.returning(move |_, _, _, _| {
				calls += 1;
				if calls == 1 {
					Err(LedgerError::Rejected("paused".to_string()))
				} else {
					Ok(())
				}
			});
		let executor = executor(ledger);
		let intent = intent();
		let signature = sign(&intent);

		let err = executor.execute(&intent, &signature).await.unwrap_err();
		assert!(matches!(err, ExecutionError::TransferRejected(_)));
		assert!(err.is_retryable());
		assert!(!executor
			.is_executed(&get_intent_hash(&intent))
			.await
			.unwrap());

		executor.execute(&intent, &signature).await.unwrap();
	}

	#[tokio::test]
	async fn test_indeterminate_outcome_keeps_mark() {
		let mut ledger = MockLedger::new();
		ledger
			.expect_transfer_from()
			.times(1)
			.returning(|_, _, _, _| Err(LedgerError::Unavailable("timeout".to_string())));
		let executor = executor(ledger);
		let intent = intent();
		let signature = sign(&intent);

		let err = executor.execute(&intent, &signature).await.unwrap_err();
		assert_eq!(err, ExecutionError::LedgerUnavailable("timeout".to_string()));
		assert!(!err.is_retryable());
		let digest = get_intent_hash(&intent);
		assert!(executor.is_executed(&digest).await.unwrap());
		assert_eq!(
			executor
				.executed_entry(&digest)
				.await
				.unwrap()
				.map(|entry| entry.status),
			Some(ReplayStatus::Unresolved)
		);

		assert_eq!(
			executor.execute(&intent, &signature).await,
			Err(ExecutionError::AlreadyExecuted)
		);
	}

	#[tokio::test]
	async fn test_claim_held_by_other_record_is_in_progress() {
		let mut ledger = MockLedger::new();
		ledger.expect_transfer_from().times(0);
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let executor = RelayExecutor::new(
			Arc::clone(&storage),
			Arc::new(LedgerService::new(Arc::new(ledger))),
			SigningScheme::PersonalSign,
		);

		// A second process holds an unsettled claim in the same storage
		let intent = intent();
		let digest = get_intent_hash(&intent);
		let elsewhere = ReplayRecord::new(storage);
		let guard = elsewhere.lock(digest).await;
		assert!(guard.mark(&ReplayEntry::in_flight(intent)).await.unwrap());

		let err = executor.execute(&intent, &sign(&intent)).await.unwrap_err();
		assert_eq!(err, ExecutionError::InProgress);
		assert!(err.is_retryable());
		assert!(!executor.is_executed(&digest).await.unwrap());
	}

	#[tokio::test]
	async fn test_eip712_executor_rejects_personal_signature() {
		let mut ledger = MockLedger::new();
		ledger.expect_transfer_from().times(0);
		let executor = RelayExecutor::new(
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			Arc::new(LedgerService::new(Arc::new(ledger))),
			SigningScheme::Eip712(Eip712Domain {
				domain_name: "MetaTokenTransfer".to_string(),
				chain_id: 31337,
				verifying_contract: Address::repeat_byte(0x11),
			}),
		);

		let intent = intent();
		assert_eq!(
			executor.execute(&intent, &sign(&intent)).await,
			Err(ExecutionError::InvalidSignature)
		);
	}

	#[test]
	fn test_get_hash_matches_codec() {
		let executor = executor(MockLedger::new());
		let intent = intent();
		assert_eq!(
			executor.get_hash(
				&intent.sender,
				intent.amount,
				&intent.recipient,
				intent.nonce,
				&intent.asset
			),
			get_intent_hash(&intent)
		);
	}

	#[test]
	fn test_retryable_errors() {
		assert!(ExecutionError::TransferRejected("x".into()).is_retryable());
		assert!(ExecutionError::InProgress.is_retryable());
		assert!(!ExecutionError::InvalidSignature.is_retryable());
		assert!(!ExecutionError::AlreadyExecuted.is_retryable());
		assert!(!ExecutionError::InvalidIntent("x".into()).is_retryable());
		assert!(!ExecutionError::LedgerUnavailable("x".into()).is_retryable());
		assert!(!ExecutionError::Storage("x".into()).is_retryable());
	}
}
