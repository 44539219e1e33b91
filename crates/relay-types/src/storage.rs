//! Storage namespaces used by the relay.

/// Storage keys for the relay's data collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Replay entries of intents, keyed by digest.
	Executed,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Executed => "executed",
		}
	}
}
