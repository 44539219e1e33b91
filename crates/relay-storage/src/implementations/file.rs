//! File-based storage backend.
//!
//! One file per key under a base directory. Writes go to a uniquely named
//! temporary file first, so readers never observe a partially written value:
//! - `set_bytes` renames the temporary file over the target.
//! - `set_bytes_if_absent` hard-links the temporary file to the target, which
//!   fails atomically when the target exists. Several relayer processes can
//!   therefore share one directory and still agree on who created a key.
//!
//! The temporary file is flushed to disk before it is published, and the
//! directory is synced afterwards, so a created key survives a power loss.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use relay_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const DEFAULT_STORAGE_PATH: &str = "./data/replay";

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	temp_counter: AtomicU64,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			temp_counter: AtomicU64::new(0),
		}
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	fn temp_path(&self, target: &Path) -> PathBuf {
		let seq = self.temp_counter.fetch_add(1, Ordering::Relaxed);
		target.with_extension(format!("{}.{}.tmp", std::process::id(), seq))
	}

	/// Writes `value` to a fresh temporary file next to `target`.
	async fn write_temp(&self, target: &Path, value: Vec<u8>) -> Result<PathBuf, StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let temp = self.temp_path(target);
		let mut file = fs::File::create(&temp)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		file.write_all(&value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		file.sync_all()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(temp)
	}

	/// Flushes directory entries (links, renames, removals) to disk.
	#[cfg(unix)]
	async fn sync_dir(&self) -> Result<(), StorageError> {
		let dir = fs::File::open(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		dir.sync_all()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	#[cfg(not(unix))]
	async fn sync_dir(&self) -> Result<(), StorageError> {
		Ok(())
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.get_file_path(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		let temp = self.write_temp(&path, value).await?;

		fs::rename(&temp, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		self.sync_dir().await
	}

	async fn set_bytes_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		let temp = self.write_temp(&path, value).await?;

		let linked = fs::hard_link(&temp, &path).await;
		if let Err(e) = fs::remove_file(&temp).await {
			tracing::warn!("Failed to remove temporary file {:?}: {}", temp, e);
		}

		match linked {
			Ok(()) => {
				self.sync_dir().await?;
				Ok(true)
			},
			Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.get_file_path(key)).await {
			Ok(()) => self.sync_dir().await,
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".to_string())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for stored entries (default: "./data/replay")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
