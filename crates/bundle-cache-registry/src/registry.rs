//! The URL dependency and version registry

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config_entry::{ConfigEntry, DEFAULT_CONFIG_FILE_NAME, is_config_url};
use crate::{
	BootGate, DocumentStore, FlushPolicy, RegistryDocument, RelatedEntry, Result, UNKNOWN_VERSION,
	UrlEntry, VersionClock, flush,
};

/// Default ceiling for files included in a closure (64 KiB)
pub const DEFAULT_SIZE_CEILING: u64 = 64 * 1024;

/// How far a change propagates to `grand` versions of dependents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
	/// Only entries that link directly to the changed URL
	OneHop,
	/// Every entry that reaches the changed URL through `links`
	#[default]
	Transitive,
}

/// Registry tuning
#[derive(Debug, Clone)]
pub struct RegistryOptions {
	/// Entries larger than this are left out of closures
	pub size_ceiling: u64,
	/// File names parsed as [`ConfigEntry`]
	pub config_file_names: Vec<String>,
	pub propagation: Propagation,
}

impl RegistryOptions {
	pub fn with_size_ceiling(mut self, size_ceiling: u64) -> Self {
		self.size_ceiling = size_ceiling;
		self
	}

	pub fn with_config_file_names(mut self, names: Vec<String>) -> Self {
		self.config_file_names = names;
		self
	}

	pub fn with_propagation(mut self, propagation: Propagation) -> Self {
		self.propagation = propagation;
		self
	}
}

impl Default for RegistryOptions {
	fn default() -> Self {
		Self {
			size_ceiling: DEFAULT_SIZE_CEILING,
			config_file_names: vec![DEFAULT_CONFIG_FILE_NAME.to_string()],
			propagation: Propagation::default(),
		}
	}
}

/// Result of a [`Registry::link`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOutcome {
	/// Edges that were newly recorded
	pub added: Vec<String>,
	/// Candidates dropped because they would close a cycle
	pub rejected: Vec<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
	entries: BTreeMap<String, UrlEntry>,
	configs: BTreeMap<String, ConfigEntry>,
}

impl RegistryState {
	/// Bumps `grand` on the dependents of `url`, returning how many changed
	fn bump_dependents(&mut self, url: &str, now: i64, propagation: Propagation) -> usize {
		let mut visited: HashSet<String> = HashSet::from([url.to_string()]);
		let mut frontier = vec![url.to_string()];
		let mut bumped = 0;

		while let Some(current) = frontier.pop() {
			let parents: Vec<String> = self
				.entries
				.iter()
				.filter(|(key, entry)| entry.links.contains(&current) && !visited.contains(*key))
				.map(|(key, _)| key.clone())
				.collect();

			for parent in parents {
				visited.insert(parent.clone());
				if let Some(entry) = self.entries.get_mut(&parent) {
					entry.version.bump_grand(now);
					bumped += 1;
				}
				if propagation == Propagation::Transitive {
					frontier.push(parent);
				}
			}
		}

		bumped
	}

	fn strip_links_to(&mut self, url: &str) {
		for entry in self.entries.values_mut() {
			entry.links.remove(url);
		}
	}
}

/// Authoritative map from URL to disk location, size, version stamp and
/// outgoing links
///
/// All operations take `&self`; the registry is meant to be shared behind an
/// `Arc` by the archive server, the link-discovery hook and the file-watch
/// collaborator.
pub struct Registry {
	state: RwLock<RegistryState>,
	clock: VersionClock,
	options: RegistryOptions,
	flush_signal: OnceLock<Arc<Notify>>,
}

impl Registry {
	pub fn new(options: RegistryOptions) -> Self {
		Self {
			state: RwLock::new(RegistryState::default()),
			clock: VersionClock::new(),
			options,
			flush_signal: OnceLock::new(),
		}
	}

	pub fn options(&self) -> &RegistryOptions {
		&self.options
	}

	/// Next version stamp from the registry clock
	pub fn now(&self) -> i64 {
		self.clock.now()
	}

	/// Inserts or refreshes `url`, setting both versions to now and keeping
	/// any existing links
	pub fn add_url(&self, url: &str, path: impl Into<PathBuf>, size: u64) {
		let path = path.into();
		let now = self.clock.now();
		{
			let mut state = self.state.write();
			match state.entries.get_mut(url) {
				Some(entry) => {
					entry.path = path.clone();
					entry.size = size;
					entry.version.touch(now);
				}
				None => {
					state
						.entries
						.insert(url.to_string(), UrlEntry::new(path.clone(), size, now));
				}
			}
		}
		tracing::debug!("Registered {} -> {} ({} bytes)", url, path.display(), size);

		self.refresh_config(url, &path);
		self.schedule_persist();
	}

	/// Records a change to `url` and bumps the grand version of its
	/// dependents; unknown URLs are added instead
	pub fn update_version(&self, url: &str, path: impl Into<PathBuf>, size: u64) {
		let path = path.into();
		if !self.contains(url) {
			self.add_url(url, path, size);
			return;
		}

		let now = self.clock.now();
		let bumped = {
			let mut state = self.state.write();
			if let Some(entry) = state.entries.get_mut(url) {
				entry.path = path.clone();
				entry.size = size;
				entry.version.touch(now);
			}
			state.bump_dependents(url, now, self.options.propagation)
		};
		tracing::debug!("Updated {} (bumped {} dependents)", url, bumped);

		self.refresh_config(url, &path);
		self.schedule_persist();
	}

	/// Records dependency edges from `url` to each of `urls`
	///
	/// A candidate that already links back to `url`, or is `url` itself, is
	/// rejected with a warning; the remaining candidates are still linked.
	/// Adding a new edge changes the closure of `url`, so its grand version
	/// (and its dependents') is bumped.
	pub fn link<I, S>(&self, url: &str, urls: I) -> LinkOutcome
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut outcome = LinkOutcome::default();
		let now = self.clock.now();
		let mut state = self.state.write();

		for candidate in urls {
			let candidate = candidate.as_ref();
			let closes_cycle = candidate == url
				|| state
					.entries
					.get(candidate)
					.is_some_and(|entry| entry.links.contains(url));
			if closes_cycle {
				tracing::warn!("Rejected cyclic link {} -> {}", url, candidate);
				outcome.rejected.push(candidate.to_string());
				continue;
			}

			let entry = state
				.entries
				.entry(url.to_string())
				.or_insert_with(|| UrlEntry::new(PathBuf::new(), 0, now));
			if entry.links.insert(candidate.to_string()) {
				outcome.added.push(candidate.to_string());
			}
		}

		if !outcome.added.is_empty() {
			if let Some(entry) = state.entries.get_mut(url) {
				entry.version.bump_grand(now);
			}
			state.bump_dependents(url, now, self.options.propagation);
			drop(state);

			tracing::debug!("Linked {} -> {:?}", url, outcome.added);
			self.schedule_persist();
		}

		outcome
	}

	/// Forgets `url`: strips it from every entry's links and drops its entry
	/// and config. Returns whether the entry existed.
	pub fn remove_url(&self, url: &str) -> bool {
		let now = self.clock.now();
		let existed = {
			let mut state = self.state.write();
			state.bump_dependents(url, now, self.options.propagation);
			state.strip_links_to(url);
			state.configs.remove(url);
			state.entries.remove(url).is_some()
		};

		if existed {
			tracing::debug!("Removed {}", url);
		}
		self.schedule_persist();
		existed
	}

	/// Transitive dependencies of `url`, depth-first and de-duplicated
	///
	/// Never includes `url` itself, link-only entries, or entries larger than
	/// the size ceiling. Oversized entries are still traversed.
	pub fn get_related(&self, url: &str) -> Vec<RelatedEntry> {
		let state = self.state.read();
		let Some(root) = state.entries.get(url) else {
			return Vec::new();
		};

		let mut visited: HashSet<&str> = HashSet::from([url]);
		let mut stack: Vec<&str> = root.links.iter().rev().map(String::as_str).collect();
		let mut related = Vec::new();

		while let Some(current) = stack.pop() {
			if !visited.insert(current) {
				continue;
			}
			let Some(entry) = state.entries.get(current) else {
				continue;
			};

			if entry.size <= self.options.size_ceiling && !entry.is_link_only() {
				related.push(RelatedEntry {
					url: current.to_string(),
					path: entry.path.clone(),
					size: entry.size,
					version: entry.version,
				});
			}
			stack.extend(entry.links.iter().rev().map(String::as_str));
		}

		related
	}

	/// Grand version of `url`, or `-1` when unknown
	pub fn get_grand_version(&self, url: &str) -> i64 {
		self.state
			.read()
			.entries
			.get(url)
			.map_or(UNKNOWN_VERSION, |entry| entry.version.grand)
	}

	pub fn entry(&self, url: &str) -> Option<UrlEntry> {
		self.state.read().entries.get(url).cloned()
	}

	pub fn contains(&self, url: &str) -> bool {
		self.state.read().entries.contains_key(url)
	}

	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// URL registered for a disk path, if any
	pub fn url_for_path(&self, path: &std::path::Path) -> Option<String> {
		self.state
			.read()
			.entries
			.iter()
			.find(|(_, entry)| entry.path == path)
			.map(|(url, _)| url.clone())
	}

	/// Parsed config for `url`, when it is a recognized config file
	pub fn config(&self, url: &str) -> Option<ConfigEntry> {
		self.state.read().configs.get(url).cloned()
	}

	/// Scripts every config file lists for `scope`, in URL order, without
	/// duplicates
	pub fn get_scripts(&self, scope: &str) -> Vec<String> {
		let state = self.state.read();
		let mut seen = HashSet::new();
		state
			.configs
			.values()
			.flat_map(|config| config.scripts_for(scope))
			.filter(|script| seen.insert(script.as_str()))
			.cloned()
			.collect()
	}

	fn refresh_config(&self, url: &str, path: &std::path::Path) {
		if !is_config_url(url, &self.options.config_file_names) {
			return;
		}

		match ConfigEntry::load(path) {
			Ok(config) => {
				tracing::debug!("Loaded config {}", url);
				self.state.write().configs.insert(url.to_string(), config);
			}
			Err(err) => {
				tracing::warn!("Ignoring unreadable config {}: {}", url, err);
				self.state.write().configs.remove(url);
			}
		}
	}

	/// Removes every entry whose empirical version predates `cutoff`
	pub fn prune_older_than(&self, cutoff: i64) -> Vec<String> {
		let removed: Vec<String> = {
			let mut state = self.state.write();
			let stale: Vec<String> = state
				.entries
				.iter()
				.filter(|(_, entry)| entry.version.empirical < cutoff)
				.map(|(url, _)| url.clone())
				.collect();
			for url in &stale {
				state.entries.remove(url);
				state.configs.remove(url);
				state.strip_links_to(url);
			}
			stale
		};

		if !removed.is_empty() {
			tracing::info!("Pruned {} stale registry entries", removed.len());
			self.schedule_persist();
		}
		removed
	}

	/// Copy of the whole map in persisted form
	pub fn snapshot(&self) -> RegistryDocument {
		RegistryDocument {
			urls: self.state.read().entries.clone(),
		}
	}

	/// Replaces the whole map with `document`
	pub fn load(&self, document: RegistryDocument) {
		let max_version = document
			.urls
			.values()
			.map(|entry| entry.version.grand.max(entry.version.empirical))
			.max();
		if let Some(version) = max_version {
			self.clock.observe(version);
		}

		let configs: BTreeMap<String, ConfigEntry> = document
			.urls
			.iter()
			.filter(|(url, _)| is_config_url(url, &self.options.config_file_names))
			.filter_map(|(url, entry)| match ConfigEntry::load(&entry.path) {
				Ok(config) => Some((url.clone(), config)),
				Err(err) => {
					tracing::warn!("Ignoring unreadable config {}: {}", url, err);
					None
				}
			})
			.collect();

		let mut state = self.state.write();
		state.entries = document.urls;
		state.configs = configs;
	}

	/// Loads the stored document, returning the number of entries restored
	///
	/// # Errors
	///
	/// Returns the store's error; the in-memory map is left untouched then.
	pub async fn restore(&self, store: &dyn DocumentStore) -> Result<usize> {
		let Some(document) = store.find().await? else {
			return Ok(0);
		};
		let count = document.urls.len();
		self.load(document);
		tracing::info!("Restored {} registry entries", count);
		Ok(count)
	}

	/// Writes the current map immediately
	///
	/// # Errors
	///
	/// Returns the store's error.
	pub async fn flush_now(&self, store: &dyn DocumentStore) -> Result<()> {
		store.replace_all(&self.snapshot()).await
	}

	/// Starts the debounced write-through loop for `store`
	///
	/// Only the first attached store receives scheduled writes.
	pub fn attach_store(
		self: &Arc<Self>,
		store: Arc<dyn DocumentStore>,
		policy: FlushPolicy,
	) -> JoinHandle<()> {
		let signal = Arc::new(Notify::new());
		if self.flush_signal.set(signal.clone()).is_err() {
			tracing::warn!("A document store is already attached; scheduled writes go to the first one");
		}
		tokio::spawn(flush::run(Arc::downgrade(self), store, signal, policy))
	}

	/// Schedules a debounced write of the whole map
	pub fn schedule_persist(&self) {
		if let Some(signal) = self.flush_signal.get() {
			signal.notify_one();
		}
	}

	/// Prunes stale entries once `gate` reports start-up complete
	pub fn spawn_pruner(self: &Arc<Self>, gate: Arc<BootGate>) -> JoinHandle<Vec<String>> {
		let registry = self.clone();
		tokio::spawn(async move {
			gate.wait_ready().await;
			registry.prune_older_than(gate.started_at())
		})
	}
}

impl Default for Registry {
	fn default() -> Self {
		Self::new(RegistryOptions::default())
	}
}

impl Drop for Registry {
	fn drop(&mut self) {
		// Wakes the flush loop so it notices the registry is gone.
		if let Some(signal) = self.flush_signal.get() {
			signal.notify_one();
		}
	}
}
