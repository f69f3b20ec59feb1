//! Bundle requests with at most one build in flight per page

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::{Bundle, BuildStatistics, BundleBuilder};
use crate::error::{ArchiveError, Result};

type BuildOutcome = std::result::Result<Bundle, Arc<ArchiveError>>;
type InFlight = Shared<BoxFuture<'static, BuildOutcome>>;
type InFlightTable = Arc<Mutex<HashMap<String, InFlight>>>;

/// Request-facing side of the archive cache
///
/// The first request for a page starts a build on its own task; requests for
/// the same page arriving before it settles await the same outcome. A build
/// runs to completion even when every caller has gone away.
pub struct ArchiveServer {
	builder: Arc<BundleBuilder>,
	in_flight: InFlightTable,
}

impl ArchiveServer {
	pub fn new(builder: BundleBuilder) -> Self {
		Self {
			builder: Arc::new(builder),
			in_flight: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	pub fn builder(&self) -> &BundleBuilder {
		&self.builder
	}

	pub fn statistics(&self) -> BuildStatistics {
		self.builder.statistics()
	}

	/// Number of pages with a build currently running
	pub fn in_flight(&self) -> usize {
		self.in_flight.lock().len()
	}

	/// Current archive for `url`
	///
	/// # Errors
	///
	/// Returns [`ArchiveError::Shared`] wrapping the build's error; every
	/// request that awaited the failed build receives the same error.
	pub async fn bundle(&self, url: &str) -> Result<Bundle> {
		let pending = {
			let mut in_flight = self.in_flight.lock();
			match in_flight.get(url) {
				Some(pending) => {
					tracing::debug!("Awaiting in-flight build for {}", url);
					pending.clone()
				}
				None => {
					let pending = self.spawn_build(url);
					in_flight.insert(url.to_string(), pending.clone());
					pending
				}
			}
		};

		pending.await.map_err(ArchiveError::Shared)
	}

	/// Starts the build task; the slot is cleared as soon as it settles
	///
	/// Must be called with the table locked so the task cannot clear the slot
	/// before it is inserted.
	fn spawn_build(&self, url: &str) -> InFlight {
		let builder = self.builder.clone();
		let table = self.in_flight.clone();
		let key = url.to_string();

		let task = tokio::spawn(async move {
			let outcome = builder.build(&key).await;
			table.lock().remove(&key);
			if let Err(err) = &outcome {
				builder.record_failure();
				tracing::error!("Building archive for {} failed: {}", key, err);
			}
			outcome.map_err(Arc::new)
		});

		let table = self.in_flight.clone();
		let key = url.to_string();
		async move {
			match task.await {
				Ok(outcome) => outcome,
				Err(err) => {
					table.lock().remove(&key);
					Err(Arc::new(ArchiveError::Join(err.to_string())))
				}
			}
		}
		.boxed()
		.shared()
	}
}
