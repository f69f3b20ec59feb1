//! Document stores holding the whole registry map as one document

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::RegistryDocument;
use crate::error::{RegistryError, Result};

/// Find / replace-all access to the single registry document
#[async_trait]
pub trait DocumentStore: Send + Sync {
	/// Loads the stored document, if any
	async fn find(&self) -> Result<Option<RegistryDocument>>;

	/// Replaces the stored document wholesale
	async fn replace_all(&self, document: &RegistryDocument) -> Result<()>;
}

/// Stores the registry document as a JSON file
///
/// Writes go to a sibling temporary file that is renamed over the target, so
/// readers never observe a partially written document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
	path: PathBuf,
}

impl JsonFileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn temp_path(&self) -> PathBuf {
		let mut name = self.path.file_name().unwrap_or_default().to_os_string();
		name.push(".tmp");
		self.path.with_file_name(name)
	}
}

#[async_trait]
impl DocumentStore for JsonFileStore {
	async fn find(&self) -> Result<Option<RegistryDocument>> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(err) => Err(err.into()),
		}
	}

	async fn replace_all(&self, document: &RegistryDocument) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}

		let bytes = serde_json::to_vec(document)?;
		let temp_path = self.temp_path();
		tokio::fs::write(&temp_path, bytes).await?;
		tokio::fs::rename(&temp_path, &self.path).await?;
		Ok(())
	}
}

/// In-memory store, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
	document: Mutex<Option<RegistryDocument>>,
	writes: AtomicUsize,
	failing: AtomicBool,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Store pre-loaded with `document`
	pub fn with_document(document: RegistryDocument) -> Self {
		let store = Self::default();
		*store.document.lock() = Some(document);
		store
	}

	/// Number of successful `replace_all` calls
	pub fn writes(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}

	/// Currently stored document
	pub fn document(&self) -> Option<RegistryDocument> {
		self.document.lock().clone()
	}

	/// Makes every subsequent call fail until reset
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	fn check(&self) -> Result<()> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(RegistryError::Store("store unreachable".to_string()));
		}
		Ok(())
	}
}

#[async_trait]
impl DocumentStore for MemoryStore {
	async fn find(&self) -> Result<Option<RegistryDocument>> {
		self.check()?;
		Ok(self.document.lock().clone())
	}

	async fn replace_all(&self, document: &RegistryDocument) -> Result<()> {
		self.check()?;
		*self.document.lock() = Some(document.clone());
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}
