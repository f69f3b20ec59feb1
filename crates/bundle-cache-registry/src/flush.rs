//! Debounced write-through of the registry to its document store

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::{DocumentStore, Registry};

/// Timing for coalescing registry writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
	/// A write happens once no mutation arrived for this long
	pub quiet: Duration,
	/// Upper bound between the first pending mutation and its write
	pub max_delay: Duration,
}

impl FlushPolicy {
	pub fn new(quiet: Duration, max_delay: Duration) -> Self {
		Self { quiet, max_delay }
	}
}

impl Default for FlushPolicy {
	fn default() -> Self {
		Self {
			quiet: Duration::from_millis(500),
			max_delay: Duration::from_secs(5),
		}
	}
}

/// Flush loop; exits once the registry is dropped
pub(crate) async fn run(
	registry: Weak<Registry>,
	store: Arc<dyn DocumentStore>,
	signal: Arc<Notify>,
	policy: FlushPolicy,
) {
	loop {
		signal.notified().await;

		let deadline = Instant::now() + policy.max_delay;
		loop {
			tokio::select! {
				_ = signal.notified() => continue,
				_ = tokio::time::sleep(policy.quiet) => break,
				_ = tokio::time::sleep_until(deadline) => break,
			}
		}

		let Some(registry) = registry.upgrade() else {
			break;
		};
		let document = registry.snapshot();
		drop(registry);

		match store.replace_all(&document).await {
			Ok(()) => tracing::debug!("Persisted registry ({} urls)", document.urls.len()),
			Err(err) => tracing::warn!("Failed to persist registry, keeping in-memory state: {}", err),
		}
	}

	tracing::debug!("Registry flush loop stopped");
}
