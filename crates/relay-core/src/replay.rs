//! Replay record keyed by intent digest.
//!
//! A digest is claimed through the storage service's compare-and-insert,
//! which is what makes "at most once" hold across executors, and across
//! processes, sharing a backend. The claim is written as [`ReplayStatus::InFlight`]
//! and settled once the ledger answers, so lookups never report a transfer
//! that may still be rolled back. Lookups read storage directly and never
//! wait for an execution in progress.
//!
//! Within a process, executions of one digest are serialized by a per-digest
//! async mutex. Executors that share a [`ReplayRecord`] share that lock table.

use dashmap::DashMap;
use relay_storage::{StorageError, StorageService};
use relay_types::{current_timestamp, Digest, StorageKey, TransferIntent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Where an intent is in its single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
	/// Claimed, the ledger has not answered yet.
	InFlight,
	/// The transfer completed.
	Executed,
	/// The ledger could not say whether funds moved. Never executed again.
	Unresolved,
}

impl ReplayStatus {
	/// Whether the claim is final.
	pub fn is_settled(&self) -> bool {
		!matches!(self, ReplayStatus::InFlight)
	}
}

/// What the replay record keeps for a claimed digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEntry {
	/// The intent that was executed.
	pub intent: TransferIntent,
	pub status: ReplayStatus,
	/// UNIX timestamp (seconds) of the last status change.
	pub executed_at: u64,
}

impl ReplayEntry {
	/// A fresh claim for `intent`.
	pub fn in_flight(intent: TransferIntent) -> Self {
		Self {
			intent,
			status: ReplayStatus::InFlight,
			executed_at: current_timestamp(),
		}
	}

	/// The same entry moved to `status`.
	pub fn settled(&self, status: ReplayStatus) -> Self {
		Self {
			intent: self.intent,
			status,
			executed_at: current_timestamp(),
		}
	}
}

/// Set of claimed digests.
pub struct ReplayRecord {
	storage: Arc<StorageService>,
	locks: DashMap<Digest, Arc<Mutex<()>>>,
}

impl ReplayRecord {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			locks: DashMap::new(),
		}
	}

	/// Waits for exclusive access to `digest`.
	///
	/// Dropping the returned future before it resolves leaves no lock entry
	/// behind.
	pub async fn lock(&self, digest: Digest) -> DigestGuard<'_> {
		// Declared before the wait so it is dropped after the pending lock
		// future, which lets it release the table entry on cancellation.
		let mut guard = DigestGuard {
			record: self,
			digest,
			guard: None,
		};
		let mutex = self.locks.entry(digest).or_default().clone();
		guard.guard = Some(mutex.lock_owned().await);
		guard
	}

	/// Returns whether `digest` has been executed, or its outcome is unknown.
	///
	/// A claim whose transfer is still running reads as not executed.
	pub async fn contains(&self, digest: Digest) -> Result<bool, StorageError> {
		Ok(self.entry(digest).await?.is_some())
	}

	/// Returns the settled entry for `digest`, if any.
	pub async fn entry(&self, digest: Digest) -> Result<Option<ReplayEntry>, StorageError> {
		Ok(self
			.stored(digest)
			.await?
			.filter(|entry| entry.status.is_settled()))
	}

	/// Number of digests with a live lock entry.
	pub fn active_locks(&self) -> usize {
		self.locks.len()
	}

	async fn stored(&self, digest: Digest) -> Result<Option<ReplayEntry>, StorageError> {
		match self
			.storage
			.retrieve(StorageKey::Executed.as_str(), &storage_id(&digest))
			.await
		{
			Ok(entry) => Ok(Some(entry)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	fn release(&self, digest: &Digest) {
		self.locks.remove_if(digest, |_, mutex| Arc::strong_count(mutex) == 1);
	}
}

fn storage_id(digest: &Digest) -> String {
	digest.to_string()
}

/// Exclusive access to one digest of a [`ReplayRecord`].
///
/// The lock entry is removed from the table when the last holder or waiter
/// goes away.
pub struct DigestGuard<'a> {
	record: &'a ReplayRecord,
	digest: Digest,
	guard: Option<OwnedMutexGuard<()>>,
}

impl DigestGuard<'_> {
	pub fn digest(&self) -> Digest {
		self.digest
	}

	/// Claims the digest with `entry`.
	///
	/// Returns `false` if it already was claimed, in which case the stored
	/// entry is left untouched.
	pub async fn mark(&self, entry: &ReplayEntry) -> Result<bool, StorageError> {
		self.record
			.storage
			.insert_if_absent(StorageKey::Executed.as_str(), &storage_id(&self.digest), entry)
			.await
	}

	/// Overwrites the claim with its final entry.
	pub async fn settle(&self, entry: &ReplayEntry) -> Result<(), StorageError> {
		self.record
			.storage
			.store(StorageKey::Executed.as_str(), &storage_id(&self.digest), entry)
			.await
	}

	/// Removes the claim again.
	pub async fn unmark(&self) -> Result<(), StorageError> {
		self.record
			.storage
			.remove(StorageKey::Executed.as_str(), &storage_id(&self.digest))
			.await
	}

	/// The stored entry, settled or not.
	pub async fn stored(&self) -> Result<Option<ReplayEntry>, StorageError> {
		self.record.stored(self.digest).await
	}
}

impl Drop for DigestGuard<'_> {
	fn drop(&mut self) {
		// Unlock before checking whether anyone else still references the mutex
		drop(self.guard.take());
		self.record.release(&self.digest);
	}
}
