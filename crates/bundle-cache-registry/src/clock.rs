//! Strictly increasing version clock

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Version value for a URL the registry has never seen
pub const UNKNOWN_VERSION: i64 = -1;

/// Issues version stamps in milliseconds since the Unix epoch
///
/// Every call to [`VersionClock::now`] returns a value strictly greater than
/// any value issued or observed before, even when the wall clock stalls or
/// steps backwards.
#[derive(Debug, Default)]
pub struct VersionClock {
	last: AtomicI64,
}

impl VersionClock {
	pub fn new() -> Self {
		Self::default()
	}

	/// Next version stamp
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_registry::VersionClock;
	///
	/// let clock = VersionClock::new();
	/// let first = clock.now();
	/// let second = clock.now();
	/// assert!(second > first);
	/// ```
	pub fn now(&self) -> i64 {
		let wall = Utc::now().timestamp_millis();
		let mut current = self.last.load(Ordering::Relaxed);
		loop {
			let next = wall.max(current + 1);
			match self
				.last
				.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
			{
				Ok(_) => return next,
				Err(actual) => current = actual,
			}
		}
	}

	/// Ensures later stamps are greater than `version`
	pub fn observe(&self, version: i64) {
		self.last.fetch_max(version, Ordering::AcqRel);
	}
}
