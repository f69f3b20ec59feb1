//! Byte cache statistics

/// Snapshot of byte cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteCacheStatistics {
	/// Reads served from memory
	pub hits: u64,
	/// Reads that went to disk
	pub misses: u64,
	/// Entries shed by the size ceiling
	pub evictions: u64,
	/// Current number of entries in cache
	pub entry_count: u64,
	/// Accounted bytes, including per-entry overhead
	pub accounted_bytes: u64,
}

impl ByteCacheStatistics {
	/// Calculate hit rate (0.0 to 1.0)
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_bytes::ByteCacheStatistics;
	///
	/// let stats = ByteCacheStatistics {
	///     hits: 3,
	///     misses: 1,
	///     ..Default::default()
	/// };
	/// assert_eq!(stats.hit_rate(), 0.75);
	/// ```
	pub fn hit_rate(&self) -> f64 {
		let total = self.hits + self.misses;
		if total == 0 {
			0.0
		} else {
			self.hits as f64 / total as f64
		}
	}
}
