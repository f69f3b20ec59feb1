//! File-system side of the registry: start-up scan and change watching
//!
//! Front-end files under each mounted directory are registered under the
//! mount's URL prefix. Changes reported by the watcher are forwarded to the
//! registry and evict the file from the byte cache.

use bundle_cache_bytes::ByteCache;
use bundle_cache_registry::Registry;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// Extensions of files the registry tracks
pub const FRONT_END_EXTENSIONS: &[&str] = &["html", "htm", "js", "mjs", "css", "json", "svg"];

/// Whether `path` has a tracked front-end extension
pub fn is_front_end_file(path: &Path) -> bool {
	path.extension()
		.and_then(|extension| extension.to_str())
		.is_some_and(|extension| {
			FRONT_END_EXTENSIONS
				.iter()
				.any(|known| known.eq_ignore_ascii_case(extension))
		})
}

/// A directory served under a URL prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
	pub prefix: String,
	pub dir: PathBuf,
}

impl Mount {
	/// Mounts `dir` under `prefix`
	///
	/// `dir` is resolved against the current directory, since watcher events
	/// always carry absolute paths.
	pub fn new(prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
		let dir = dir.into();
		let dir = dir
			.canonicalize()
			.or_else(|_| std::path::absolute(&dir))
			.unwrap_or(dir);
		Self {
			prefix: prefix.into().trim_end_matches('/').to_string(),
			dir,
		}
	}

	/// URL of `path` under this mount, if it lies inside the directory
	pub fn url_for(&self, path: &Path) -> Option<String> {
		let relative = path.strip_prefix(&self.dir).ok()?;
		let segments: Vec<&str> = relative
			.components()
			.map(|component| component.as_os_str().to_str())
			.collect::<Option<_>>()?;
		if segments.is_empty() {
			return None;
		}
		Some(format!("{}/{}", self.prefix, segments.join("/")))
	}
}

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
	Created(PathBuf),
	Modified(PathBuf),
	Deleted(PathBuf),
	Error(String),
}

/// Applies file-system observations to the registry and byte cache
#[derive(Clone)]
pub struct FileEvents {
	registry: Arc<Registry>,
	cache: ByteCache,
	mounts: Vec<Mount>,
	size_ceiling: u64,
}

impl FileEvents {
	pub fn new(registry: Arc<Registry>, cache: ByteCache, mounts: Vec<Mount>, size_ceiling: u64) -> Self {
		Self {
			registry,
			cache,
			mounts,
			size_ceiling,
		}
	}

	pub fn mounts(&self) -> &[Mount] {
		&self.mounts
	}

	fn url_for(&self, path: &Path) -> Option<String> {
		self.mounts.iter().find_map(|mount| mount.url_for(path))
	}

	/// Registers every front-end file within the size ceiling under every
	/// mount, returning how many were registered
	pub fn scan(&self) -> usize {
		let mut registered = 0;
		for mount in &self.mounts {
			for entry in WalkDir::new(&mount.dir).follow_links(true) {
				let entry = match entry {
					Ok(entry) => entry,
					Err(err) => {
						tracing::warn!("Skipping unreadable entry under {}: {}", mount.dir.display(), err);
						continue;
					}
				};
				if !entry.file_type().is_file() || !is_front_end_file(entry.path()) {
					continue;
				}
				let Ok(metadata) = entry.metadata() else {
					continue;
				};
				if metadata.len() > self.size_ceiling {
					continue;
				}
				if let Some(url) = mount.url_for(entry.path()) {
					self.registry.add_url(&url, entry.path(), metadata.len());
					registered += 1;
				}
			}
		}
		tracing::info!("Registered {} front-end files", registered);
		registered
	}

	/// Forwards one watcher event
	pub fn apply(&self, event: &WatchEvent) {
		match event {
			WatchEvent::Created(path) | WatchEvent::Modified(path) => self.changed(path),
			WatchEvent::Deleted(path) => self.deleted(path),
			WatchEvent::Error(message) => tracing::warn!("File watcher error: {}", message),
		}
	}

	fn changed(&self, path: &Path) {
		if !is_front_end_file(path) {
			return;
		}
		self.cache.remove(path);

		let Some(url) = self.url_for(path) else {
			return;
		};
		match std::fs::metadata(path) {
			Ok(metadata) if metadata.is_file() && metadata.len() <= self.size_ceiling => {
				self.registry.update_version(&url, path, metadata.len());
			}
			Ok(metadata) if metadata.is_file() => {
				tracing::debug!("Ignoring {} ({} bytes exceeds the size ceiling)", url, metadata.len());
			}
			Ok(_) => {}
			Err(_) => self.deleted(path),
		}
	}

	fn deleted(&self, path: &Path) {
		self.cache.remove(path);
		if let Some(url) = self.url_for(path) {
			self.registry.remove_url(&url);
		}
	}
}

/// File system watcher
///
/// Monitors directories for file changes and sends events through a channel.
pub struct FileWatcher {
	_watcher: RecommendedWatcher,
	receiver: mpsc::UnboundedReceiver<WatchEvent>,
}

impl FileWatcher {
	/// Watches every directory in `paths` recursively
	///
	/// # Errors
	///
	/// Returns an error if the platform watcher cannot be created or a path
	/// cannot be watched.
	pub fn new(paths: &[PathBuf]) -> notify::Result<Self> {
		let (tx, rx) = mpsc::unbounded_channel();

		let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
			let event = match res {
				Ok(event) => {
					let Some(path) = event.paths.first().cloned() else {
						return;
					};
					match event.kind {
						EventKind::Create(_) => WatchEvent::Created(path),
						EventKind::Modify(_) => WatchEvent::Modified(path),
						EventKind::Remove(_) => WatchEvent::Deleted(path),
						_ => return,
					}
				}
				Err(e) => WatchEvent::Error(e.to_string()),
			};

			let _ = tx.send(event);
		})?;

		for path in paths {
			watcher.watch(path, RecursiveMode::Recursive)?;
		}

		Ok(Self {
			_watcher: watcher,
			receiver: rx,
		})
	}

	/// Waits for the next file system event; `None` once the watcher closed
	pub async fn next_event(&mut self) -> Option<WatchEvent> {
		self.receiver.recv().await
	}

	/// Forwards every event to `events` until the watcher closes
	pub fn spawn(mut self, events: FileEvents) -> JoinHandle<()> {
		tokio::spawn(async move {
			while let Some(event) = self.next_event().await {
				tracing::debug!("File event: {:?}", event);
				events.apply(&event);
			}
		})
	}
}
