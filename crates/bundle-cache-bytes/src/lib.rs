//! # Bundle Cache Bytes
//!
//! In-memory, size-bounded cache of file and archive bytes keyed by disk path.
//!
//! - [`ByteCache::read`] serves cached bytes while the on-disk size still
//!   matches, otherwise reads through and repopulates the entry.
//! - [`ByteCache::write_as_stream`] returns a [`CacheWriter`] sink that writes
//!   to disk and mirrors every chunk into the cache.
//! - [`ByteCache::remove`] evicts a single path, typically on a file-watch
//!   change or removal notification.
//!
//! ## Eviction
//!
//! Every insertion adds the entry's byte length plus a fixed per-entry
//! overhead to a running total. When the total exceeds the ceiling, entries
//! are ranked by length ascending and retained smallest-first until the
//! budget is spent; the largest entries are shed first, independent of how
//! recently or how often they were read.
//!
//! ```rust
//! use bundle_cache_bytes::{ByteCache, ByteCacheConfig};
//! use bytes::Bytes;
//!
//! let cache = ByteCache::new(ByteCacheConfig::default().with_max_bytes(1024).with_entry_overhead(0));
//! cache.insert("small.js", Bytes::from(vec![0u8; 100]));
//! cache.insert("large.js", Bytes::from(vec![0u8; 1000]));
//!
//! assert!(cache.contains("small.js".as_ref()));
//! assert!(!cache.contains("large.js".as_ref()));
//! ```

mod entry;
pub mod statistics;
pub mod writer;

pub use statistics::ByteCacheStatistics;
pub use writer::CacheWriter;

use bytes::Bytes;
use entry::ByteEntry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Default ceiling for accounted bytes (64 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;

/// Default bookkeeping cost charged per entry on top of its length
pub const DEFAULT_ENTRY_OVERHEAD: u64 = 256;

/// Byte cache configuration
#[derive(Debug, Clone)]
pub struct ByteCacheConfig {
	/// Ceiling for accounted bytes
	pub max_bytes: u64,
	/// Fixed cost added per entry
	pub entry_overhead: u64,
}

impl ByteCacheConfig {
	/// Sets the ceiling for accounted bytes
	pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
		self.max_bytes = max_bytes;
		self
	}

	/// Sets the fixed per-entry overhead
	pub fn with_entry_overhead(mut self, overhead: u64) -> Self {
		self.entry_overhead = overhead;
		self
	}
}

impl Default for ByteCacheConfig {
	fn default() -> Self {
		Self {
			max_bytes: DEFAULT_MAX_BYTES,
			entry_overhead: DEFAULT_ENTRY_OVERHEAD,
		}
	}
}

/// Inspection record for one cached path
#[derive(Debug, Clone)]
pub struct EntryInfo {
	pub path: PathBuf,
	pub size: u64,
	pub created_at: SystemTime,
	pub last_access: SystemTime,
}

#[derive(Default)]
struct CacheState {
	entries: HashMap<PathBuf, ByteEntry>,
	accounted: u64,
}

struct Inner {
	config: ByteCacheConfig,
	state: Mutex<CacheState>,
	hits: AtomicU64,
	misses: AtomicU64,
	evictions: AtomicU64,
}

/// Size-bounded byte cache keyed by disk path
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Clone)]
pub struct ByteCache {
	inner: Arc<Inner>,
}

impl ByteCache {
	/// Creates an empty cache
	pub fn new(config: ByteCacheConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				config,
				state: Mutex::new(CacheState::default()),
				hits: AtomicU64::new(0),
				misses: AtomicU64::new(0),
				evictions: AtomicU64::new(0),
			}),
		}
	}

	/// Reads `path`, serving cached bytes while the on-disk size matches
	///
	/// # Errors
	///
	/// Returns the underlying I/O error when the file cannot be stat'ed or
	/// read. A missing file also drops any stale entry for it.
	pub async fn read(&self, path: &Path) -> io::Result<Bytes> {
		let metadata = match tokio::fs::metadata(path).await {
			Ok(metadata) => metadata,
			Err(err) => {
				if err.kind() == io::ErrorKind::NotFound {
					self.remove(path);
				}
				return Err(err);
			}
		};

		if let Some(bytes) = self.lookup(path, Some(metadata.len())) {
			self.inner.hits.fetch_add(1, Ordering::Relaxed);
			tracing::debug!("Byte cache hit: {}", path.display());
			return Ok(bytes);
		}

		self.inner.misses.fetch_add(1, Ordering::Relaxed);
		tracing::debug!("Byte cache miss: {}", path.display());

		let bytes = Bytes::from(tokio::fs::read(path).await?);
		self.insert(path, bytes.clone());
		Ok(bytes)
	}

	/// Returns cached bytes without consulting the disk
	pub fn get(&self, path: &Path) -> Option<Bytes> {
		self.lookup(path, None)
	}

	fn lookup(&self, path: &Path, expected_len: Option<u64>) -> Option<Bytes> {
		let mut state = self.inner.state.lock();
		let entry = state.entries.get_mut(path)?;
		if let Some(expected) = expected_len {
			if entry.len() != expected {
				return None;
			}
		}
		entry.touch();
		Some(entry.bytes.clone())
	}

	/// Inserts or replaces the bytes cached for `path`, then enforces the
	/// ceiling
	pub fn insert(&self, path: impl Into<PathBuf>, bytes: Bytes) {
		let overhead = self.inner.config.entry_overhead;
		let entry = ByteEntry::new(bytes);
		let cost = entry.len() + overhead;

		let mut state = self.inner.state.lock();
		if let Some(previous) = state.entries.insert(path.into(), entry) {
			state.accounted = state.accounted.saturating_sub(previous.len() + overhead);
		}
		state.accounted += cost;

		if state.accounted > self.inner.config.max_bytes {
			self.enforce_ceiling(&mut state);
		}
	}

	fn enforce_ceiling(&self, state: &mut CacheState) {
		let overhead = self.inner.config.entry_overhead;
		let max_bytes = self.inner.config.max_bytes;

		let mut ranked: Vec<(PathBuf, u64)> = state
			.entries
			.iter()
			.map(|(path, entry)| (path.clone(), entry.len() + overhead))
			.collect();
		ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

		let mut kept = 0u64;
		let mut evicted = 0u64;
		for (path, cost) in ranked {
			if kept + cost <= max_bytes {
				kept += cost;
			} else {
				state.entries.remove(&path);
				evicted += 1;
				tracing::debug!("Byte cache evicted {} ({} bytes)", path.display(), cost);
			}
		}

		state.accounted = kept;
		self.inner.evictions.fetch_add(evicted, Ordering::Relaxed);
	}

	/// Evicts one path. Returns whether an entry was present.
	pub fn remove(&self, path: &Path) -> bool {
		let overhead = self.inner.config.entry_overhead;
		let mut state = self.inner.state.lock();
		match state.entries.remove(path) {
			Some(entry) => {
				state.accounted = state.accounted.saturating_sub(entry.len() + overhead);
				true
			}
			None => false,
		}
	}

	/// Moves the entry cached under `from` to `to`, mirroring a file rename
	pub fn rename(&self, from: &Path, to: impl Into<PathBuf>) {
		let overhead = self.inner.config.entry_overhead;
		let to = to.into();
		let mut state = self.inner.state.lock();
		if let Some(entry) = state.entries.remove(from) {
			if let Some(previous) = state.entries.insert(to, entry) {
				state.accounted = state.accounted.saturating_sub(previous.len() + overhead);
			}
		} else if let Some(previous) = state.entries.remove(&to) {
			state.accounted = state.accounted.saturating_sub(previous.len() + overhead);
		}
	}

	/// Opens `path` for writing; chunks are mirrored into the cache and
	/// committed when the writer is shut down
	///
	/// # Errors
	///
	/// Returns an error if the file cannot be created.
	pub async fn write_as_stream(&self, path: impl Into<PathBuf>) -> io::Result<CacheWriter> {
		let path = path.into();
		let file = tokio::fs::File::create(&path).await?;
		Ok(CacheWriter::new(file, path, self.clone()))
	}

	/// Whether `path` currently has an entry
	pub fn contains(&self, path: &Path) -> bool {
		self.inner.state.lock().entries.contains_key(path)
	}

	/// Number of cached entries
	pub fn len(&self) -> usize {
		self.inner.state.lock().entries.len()
	}

	/// Whether the cache holds no entries
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Bytes currently accounted against the ceiling
	pub fn accounted_bytes(&self) -> u64 {
		self.inner.state.lock().accounted
	}

	/// Lists entries, smallest first
	pub fn entries(&self) -> Vec<EntryInfo> {
		let state = self.inner.state.lock();
		let mut entries: Vec<EntryInfo> = state
			.entries
			.iter()
			.map(|(path, entry)| EntryInfo {
				path: path.clone(),
				size: entry.len(),
				created_at: entry.created_at,
				last_access: entry.last_access,
			})
			.collect();
		entries.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path)));
		entries
	}

	/// Snapshot of the cache counters
	pub fn statistics(&self) -> ByteCacheStatistics {
		let state = self.inner.state.lock();
		ByteCacheStatistics {
			hits: self.inner.hits.load(Ordering::Relaxed),
			misses: self.inner.misses.load(Ordering::Relaxed),
			evictions: self.inner.evictions.load(Ordering::Relaxed),
			entry_count: state.entries.len() as u64,
			accounted_bytes: state.accounted,
		}
	}
}

impl Default for ByteCache {
	fn default() -> Self {
		Self::new(ByteCacheConfig::default())
	}
}
