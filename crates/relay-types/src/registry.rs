//! Registry trait for self-registering implementations.

/// Base trait for backend registries.
///
/// Every storage and ledger backend exposes a `Registry` type implementing
/// this trait, pairing the name used under `implementations` in the TOML
/// configuration with the factory that builds it:
/// - "memory" for `storage.implementations.memory`
/// - "file" for `storage.implementations.file`
/// - "evm_alloy" for `ledger.implementations.evm_alloy`
pub trait ImplementationRegistry {
	/// The configuration name of this implementation.
	const NAME: &'static str;

	/// The factory function type, defined by the owning crate.
	type Factory;

	/// Returns the factory that builds this implementation from its config table.
	fn factory() -> Self::Factory;
}
