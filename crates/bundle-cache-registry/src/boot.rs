//! Platform start-up gate for the stale-entry pruning pass

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default)]
struct GateState {
	booted: bool,
	pending: usize,
}

impl GateState {
	fn ready(&self) -> bool {
		self.booted && self.pending == 0
	}
}

/// Tracks whether start-up, including deferred work reported by
/// collaborators, has completed
///
/// # Examples
///
/// ```
/// use bundle_cache_registry::BootGate;
/// use std::sync::Arc;
///
/// let gate = Arc::new(BootGate::new(0));
/// let compile = gate.defer();
/// gate.mark_booted();
/// assert!(!gate.is_ready());
///
/// drop(compile);
/// assert!(gate.is_ready());
/// ```
#[derive(Debug)]
pub struct BootGate {
	started_at: i64,
	state: watch::Sender<GateState>,
}

impl BootGate {
	/// Creates a gate for a platform that started at version `started_at`
	pub fn new(started_at: i64) -> Self {
		let (state, _) = watch::channel(GateState::default());
		Self { started_at, state }
	}

	/// Version stamp taken when the platform started
	pub fn started_at(&self) -> i64 {
		self.started_at
	}

	/// Registers a unit of deferred start-up work; completion is signalled by
	/// dropping the returned guard
	pub fn defer(self: &Arc<Self>) -> DeferredWork {
		self.state.send_modify(|state| state.pending += 1);
		DeferredWork { gate: self.clone() }
	}

	/// Signals that the platform itself finished booting
	pub fn mark_booted(&self) {
		self.state.send_modify(|state| state.booted = true);
	}

	pub fn is_ready(&self) -> bool {
		self.state.borrow().ready()
	}

	/// Resolves once booted with no deferred work outstanding
	pub async fn wait_ready(&self) {
		let mut receiver = self.state.subscribe();
		// The sender lives in `self`, so the channel cannot close here.
		let _ = receiver.wait_for(GateState::ready).await;
	}
}

/// Guard for one unit of deferred start-up work
#[derive(Debug)]
pub struct DeferredWork {
	gate: Arc<BootGate>,
}

impl Drop for DeferredWork {
	fn drop(&mut self) {
		self.gate
			.state
			.send_modify(|state| state.pending = state.pending.saturating_sub(1));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::time::Duration;

	#[rstest]
	#[tokio::test]
	async fn test_wait_ready_after_boot_and_deferred_work() {
		let gate = Arc::new(BootGate::new(42));
		let work = gate.defer();

		let waiter = {
			let gate = gate.clone();
			tokio::spawn(async move { gate.wait_ready().await })
		};

		gate.mark_booted();
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(!waiter.is_finished());

		drop(work);
		tokio::time::timeout(Duration::from_secs(1), waiter)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(gate.started_at(), 42);
	}

	#[rstest]
	fn test_not_ready_before_boot() {
		let gate = BootGate::new(0);
		assert!(!gate.is_ready());
		gate.mark_booted();
		assert!(gate.is_ready());
	}
}
