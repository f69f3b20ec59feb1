//! Short-lived cache in front of [`Registry::get_scripts`]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::Registry;

/// Default lifetime of a cached script list
pub const DEFAULT_SCRIPTS_TTL: Duration = Duration::from_secs(1);

/// Client-side view of the registry's script lists
///
/// Lists are cached per scope for `ttl`, so a burst of page loads resolves
/// its scripts with a single registry walk.
pub struct ScriptsClient {
	registry: Arc<Registry>,
	ttl: Duration,
	cache: Mutex<HashMap<String, (Instant, Arc<Vec<String>>)>>,
}

impl ScriptsClient {
	pub fn new(registry: Arc<Registry>) -> Self {
		Self::with_ttl(registry, DEFAULT_SCRIPTS_TTL)
	}

	pub fn with_ttl(registry: Arc<Registry>, ttl: Duration) -> Self {
		Self {
			registry,
			ttl,
			cache: Mutex::new(HashMap::new()),
		}
	}

	/// Scripts for `scope`, served from cache while fresh
	pub fn get_scripts(&self, scope: &str) -> Arc<Vec<String>> {
		let mut cache = self.cache.lock();
		if let Some((fetched_at, scripts)) = cache.get(scope) {
			if fetched_at.elapsed() < self.ttl {
				return scripts.clone();
			}
		}

		let scripts = Arc::new(self.registry.get_scripts(scope));
		cache.insert(scope.to_string(), (Instant::now(), scripts.clone()));
		scripts
	}

	/// Drops every cached list
	pub fn invalidate(&self) {
		self.cache.lock().clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use tempfile::TempDir;

	#[rstest]
	fn test_cached_until_invalidated() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().join("faculty.json");
		std::fs::write(&path, r#"{"autorun": ["/boot.js"]}"#).unwrap();

		let registry = Arc::new(Registry::default());
		registry.add_url("/faculty.json", &path, 24);

		let client = ScriptsClient::with_ttl(registry.clone(), Duration::from_secs(60));
		assert_eq!(*client.get_scripts("admin"), vec!["/boot.js".to_string()]);

		std::fs::write(&path, r#"{"autorun": ["/other.js"]}"#).unwrap();
		registry.update_version("/faculty.json", &path, 25);
		assert_eq!(*client.get_scripts("admin"), vec!["/boot.js".to_string()]);

		client.invalidate();
		assert_eq!(*client.get_scripts("admin"), vec!["/other.js".to_string()]);
	}
}
