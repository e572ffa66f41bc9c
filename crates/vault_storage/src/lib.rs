#![forbid(unsafe_code)]

//! Content-addressed blob storage. `LocalStorageBackend` is the one concrete
//! backend specified here; a second (object-storage) backend is out of
//! scope, so the contract is kept narrow and easy to implement again later.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Result of a successful `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
	pub key: String,
	pub size: u64,
	pub content_type: String,
	pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("invalid storage key: {0}")]
	InvalidKey(String),
}

/// Content-addressed blob store contract.
#[async_trait]
pub trait StorageBackend: Send + Sync {
	async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<StoredObject, StorageError>;
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;
	/// May return a public URL, a pre-signed URL with TTL >= 60s, or `None`
	/// (the caller must proxy the bytes itself).
	fn url(&self, key: &str) -> Option<String>;
}

/// Builds the content-addressed key `<ns>/blobs/sha256/<aa>/<bb>/<hex64>.<ext>`
/// for the given bytes. Identical bytes always produce an identical key.
pub fn content_addressed_key(namespace: &str, bytes: &[u8], ext: &str) -> String {
	let hex64 = hex::encode(Sha256::digest(bytes));
	let aa = &hex64[0..2];
	let bb = &hex64[2..4];
	format!("{namespace}/blobs/sha256/{aa}/{bb}/{hex64}.{ext}")
}

/// Local filesystem implementation, rooted under `root_dir`. The namespace
/// is just the first path segment under that root; no bucket/account
/// concept exists at this layer.
pub struct LocalStorageBackend {
	root_dir: PathBuf,
	public_base_url: Option<String>,
}

impl LocalStorageBackend {
	pub fn new(root_dir: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
		Self {
			root_dir: root_dir.into(),
			public_base_url: public_base_url.map(|u| u.trim().trim_end_matches('/').to_string()).filter(|u| !u.is_empty()),
		}
	}

	fn full_path(&self, key: &str) -> Result<PathBuf, StorageError> {
		if key.contains("..") {
			return Err(StorageError::InvalidKey(key.to_string()));
		}
		Ok(self.root_dir.join(key.trim_start_matches('/')))
	}
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
	async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<StoredObject, StorageError> {
		let path = self.full_path(key)?;
		let size = bytes.len() as u64;

		if tokio::fs::try_exists(&path).await.unwrap_or(false) {
			return Ok(StoredObject {
				key: key.to_string(),
				size,
				content_type: content_type.to_string(),
				url: self.url(key),
			});
		}

		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		let tmp_path = tmp_path_for(&path);
		write_atomic(&tmp_path, &path, &bytes).await?;

		Ok(StoredObject {
			key: key.to_string(),
			size,
			content_type: content_type.to_string(),
			url: self.url(key),
		})
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let path = self.full_path(key)?;
		Ok(tokio::fs::try_exists(&path).await?)
	}

	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.full_path(key)?;
		Ok(tokio::fs::read(&path).await?)
	}

	fn url(&self, key: &str) -> Option<String> {
		let base = self.public_base_url.as_ref()?;
		Some(format!("{base}/{}", key.trim_start_matches('/')))
	}
}

fn tmp_path_for(path: &Path) -> PathBuf {
	let mut tmp = path.as_os_str().to_os_string();
	tmp.push(".tmp");
	PathBuf::from(tmp)
}

async fn write_atomic(tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
	use tokio::io::AsyncWriteExt;

	let mut file = tokio::fs::File::create(tmp_path).await?;
	file.write_all(bytes).await?;
	file.sync_all().await?;
	drop(file);
	tokio::fs::rename(tmp_path, final_path).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key_is_content_addressed() {
		let key_a = content_addressed_key("vault", b"hello", "webp");
		let key_b = content_addressed_key("vault", b"hello", "webp");
		assert_eq!(key_a, key_b);

		let key_c = content_addressed_key("vault", b"goodbye", "webp");
		assert_ne!(key_a, key_c);
		assert!(key_a.starts_with("vault/blobs/sha256/"));
		assert!(key_a.ends_with(".webp"));
	}

	#[tokio::test]
	async fn put_then_get_roundtrips() {
		let dir = tempfile::tempdir().unwrap();
		let backend = LocalStorageBackend::new(dir.path(), None);
		let key = content_addressed_key("vault", b"hello world", "bin");

		let stored = backend.put(&key, b"hello world".to_vec(), "application/octet-stream").await.unwrap();
		assert_eq!(stored.size, 11);
		assert!(backend.exists(&key).await.unwrap());
		assert_eq!(backend.get_bytes(&key).await.unwrap(), b"hello world");
	}

	#[tokio::test]
	async fn put_is_idempotent_for_existing_key() {
		let dir = tempfile::tempdir().unwrap();
		let backend = LocalStorageBackend::new(dir.path(), None);
		let key = content_addressed_key("vault", b"same bytes", "bin");

		backend.put(&key, b"same bytes".to_vec(), "application/octet-stream").await.unwrap();
		// A second put with identical bytes must be a no-op, not an error.
		let second = backend.put(&key, b"same bytes".to_vec(), "application/octet-stream").await.unwrap();
		assert_eq!(second.size, 10);
	}

	#[tokio::test]
	async fn url_uses_public_base_when_configured() {
		let dir = tempfile::tempdir().unwrap();
		let backend = LocalStorageBackend::new(dir.path(), Some("https://cdn.example/v".to_string()));
		assert_eq!(backend.url("vault/blobs/sha256/ab/cd/x.webp").as_deref(), Some("https://cdn.example/v/vault/blobs/sha256/ab/cd/x.webp"));
	}

	#[tokio::test]
	async fn url_is_none_without_public_base() {
		let dir = tempfile::tempdir().unwrap();
		let backend = LocalStorageBackend::new(dir.path(), None);
		assert_eq!(backend.url("vault/blobs/sha256/ab/cd/x.webp"), None);
	}

	#[tokio::test]
	async fn rejects_path_traversal_keys() {
		let dir = tempfile::tempdir().unwrap();
		let backend = LocalStorageBackend::new(dir.path(), None);
		assert!(backend.put("../escape", b"x".to_vec(), "text/plain").await.is_err());
	}
}
