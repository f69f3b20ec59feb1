//! Full builds and incremental patches of page archives

use bundle_cache_bytes::ByteCache;
use bundle_cache_registry::{Registry, RelatedEntry, UNKNOWN_VERSION};
use bytes::Bytes;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::ArchiveConfig;
use crate::error::{ArchiveError, Result};
use crate::manifest::{ArchiveManifest, member_name, zip_time};

/// How a bundle request was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
	/// The archive on disk was already current
	ServedFromDisk,
	/// Nothing changed; only the archive's modification time was advanced
	Touched,
	/// Changed members were replaced in the existing archive
	Patched,
	/// Every member was read fresh
	FullBuild,
}

/// A ready-to-serve archive
#[derive(Debug, Clone)]
pub struct Bundle {
	pub bytes: Bytes,
	/// Grand version of the page when the build started
	pub version: i64,
	pub kind: BuildKind,
	pub path: PathBuf,
}

/// Snapshot of the build counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStatistics {
	pub full_builds: u64,
	pub patches: u64,
	pub served_from_disk: u64,
	pub touches: u64,
	pub failures: u64,
}

#[derive(Debug, Default)]
struct BuildCounters {
	full_builds: AtomicU64,
	patches: AtomicU64,
	served_from_disk: AtomicU64,
	touches: AtomicU64,
	failures: AtomicU64,
}

/// Builds and patches the archive of one page at a time
///
/// Callers are expected to serialize builds per page; [`crate::ArchiveServer`]
/// does so with its in-flight table.
pub struct BundleBuilder {
	registry: Arc<Registry>,
	cache: ByteCache,
	config: ArchiveConfig,
	counters: BuildCounters,
}

impl BundleBuilder {
	pub fn new(registry: Arc<Registry>, cache: ByteCache, config: ArchiveConfig) -> Self {
		Self {
			registry,
			cache,
			config,
			counters: BuildCounters::default(),
		}
	}

	/// Scratch location of the archive for `url`
	pub fn archive_path(&self, url: &str) -> PathBuf {
		let digest = Sha256::digest(url.as_bytes());
		self.config
			.scratch_dir
			.join(format!("{}.zip", hex::encode(digest)))
	}

	pub fn statistics(&self) -> BuildStatistics {
		BuildStatistics {
			full_builds: self.counters.full_builds.load(Ordering::Relaxed),
			patches: self.counters.patches.load(Ordering::Relaxed),
			served_from_disk: self.counters.served_from_disk.load(Ordering::Relaxed),
			touches: self.counters.touches.load(Ordering::Relaxed),
			failures: self.counters.failures.load(Ordering::Relaxed),
		}
	}

	pub(crate) fn record_failure(&self) {
		self.counters.failures.fetch_add(1, Ordering::Relaxed);
	}

	/// Returns a current archive for `url`, building or patching as needed
	///
	/// # Errors
	///
	/// Returns [`ArchiveError::UnknownPage`] for URLs the registry does not
	/// know, and I/O, zip or corruption errors when the archive cannot be
	/// produced.
	pub async fn build(&self, url: &str) -> Result<Bundle> {
		let version = self.registry.get_grand_version(url);
		if version == UNKNOWN_VERSION {
			return Err(ArchiveError::UnknownPage(url.to_string()));
		}
		let related = self.registry.get_related(url);
		let archive_path = self.archive_path(url);
		tokio::fs::create_dir_all(&self.config.scratch_dir).await?;

		match tokio::fs::metadata(&archive_path).await {
			Ok(metadata) if metadata.len() > 0 => {
				if modified_version(metadata.modified().ok()) >= version {
					let bytes = self.cache.read(&archive_path).await?;
					self.counters.served_from_disk.fetch_add(1, Ordering::Relaxed);
					tracing::debug!("Serving current archive for {} (version {})", url, version);
					return Ok(Bundle {
						bytes,
						version,
						kind: BuildKind::ServedFromDisk,
						path: archive_path,
					});
				}
				self.patch(url, version, related, archive_path).await
			}
			Ok(_) => self.full_build(url, version, related, archive_path).await,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				self.full_build(url, version, related, archive_path).await
			}
			Err(err) => Err(err.into()),
		}
	}

	async fn full_build(
		&self,
		url: &str,
		version: i64,
		related: Vec<RelatedEntry>,
		archive_path: PathBuf,
	) -> Result<Bundle> {
		let (fetched, skipped) = self.fetch_members(&related).await;
		let bytes = tokio::task::spawn_blocking(move || write_full(&related, &fetched))
			.await
			.map_err(|err| ArchiveError::Join(err.to_string()))??;

		let stamp = archive_stamp(version, skipped);
		let bytes = self.commit(&archive_path, bytes, stamp).await?;
		self.counters.full_builds.fetch_add(1, Ordering::Relaxed);
		tracing::info!("Built archive for {} (version {}, {} bytes)", url, stamp, bytes.len());

		Ok(Bundle {
			bytes,
			version: stamp,
			kind: BuildKind::FullBuild,
			path: archive_path,
		})
	}

	async fn patch(
		&self,
		url: &str,
		version: i64,
		related: Vec<RelatedEntry>,
		archive_path: PathBuf,
	) -> Result<Bundle> {
		let (existing, archive) = self.open_for_patch(&archive_path).await?;
		let manifest = ArchiveManifest::from_comment(archive.comment());

		let changed: Vec<RelatedEntry> = related
			.iter()
			.filter(|entry| {
				manifest
					.version_of(&entry.url)
					.is_none_or(|recorded| recorded < entry.version.empirical)
			})
			.cloned()
			.collect();
		let closure: HashSet<&str> = related.iter().map(|entry| entry.url.as_str()).collect();
		let dropped = manifest
			.members
			.keys()
			.filter(|member| !closure.contains(member.as_str()))
			.count();

		if changed.is_empty() && dropped == 0 {
			tracing::warn!("No member of the archive for {} changed; advancing its mtime", url);
			set_version(&archive_path, version).await?;
			self.counters.touches.fetch_add(1, Ordering::Relaxed);
			return Ok(Bundle {
				bytes: existing,
				version,
				kind: BuildKind::Touched,
				path: archive_path,
			});
		}

		let (fetched, skipped) = self.fetch_members(&changed).await;
		let bytes = tokio::task::spawn_blocking(move || {
			write_patched(archive, &manifest, &related, &fetched)
		})
		.await
		.map_err(|err| ArchiveError::Join(err.to_string()))??;

		let stamp = archive_stamp(version, skipped);
		let bytes = self.commit(&archive_path, bytes, stamp).await?;
		self.counters.patches.fetch_add(1, Ordering::Relaxed);
		tracing::info!(
			"Patched archive for {} (version {}, {} refreshed, {} skipped, {} dropped)",
			url,
			stamp,
			changed.len() - skipped,
			skipped,
			dropped
		);

		Ok(Bundle {
			bytes,
			version: stamp,
			kind: BuildKind::Patched,
			path: archive_path,
		})
	}

	/// Opens the existing archive, retrying once from disk when the cached
	/// copy does not parse
	async fn open_for_patch(
		&self,
		archive_path: &Path,
	) -> Result<(Bytes, ZipArchive<Cursor<Bytes>>)> {
		let cached = self.cache.read(archive_path).await?;
		match ZipArchive::new(Cursor::new(cached.clone())) {
			Ok(archive) => return Ok((cached, archive)),
			Err(err) => {
				tracing::warn!(
					"Archive {} unreadable ({}); retrying from disk",
					archive_path.display(),
					err
				);
				self.cache.remove(archive_path);
			}
		}

		let fresh = self.cache.read(archive_path).await?;
		match ZipArchive::new(Cursor::new(fresh.clone())) {
			Ok(archive) => Ok((fresh, archive)),
			Err(err) => {
				self.cache.remove(archive_path);
				Err(ArchiveError::Corrupt {
					path: archive_path.display().to_string(),
					reason: err.to_string(),
				})
			}
		}
	}

	/// Reads every entry concurrently; failures are logged and skipped
	///
	/// Returns the members read and how many were skipped while still
	/// registered. Vanished files are deregistered and not counted.
	async fn fetch_members(&self, entries: &[RelatedEntry]) -> (HashMap<String, Bytes>, usize) {
		let reads = entries.iter().map(|entry| async move {
			let read = tokio::time::timeout(self.config.fetch_timeout, self.cache.read(&entry.path));
			match read.await {
				Ok(Ok(bytes)) => MemberRead::Fetched(entry.url.clone(), bytes),
				Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
					tracing::warn!("{} vanished from {}; deregistering", entry.url, entry.path.display());
					self.registry.remove_url(&entry.url);
					MemberRead::Vanished
				}
				Ok(Err(err)) => {
					tracing::warn!("Skipping {}: {}", entry.url, err);
					MemberRead::Skipped
				}
				Err(_) => {
					tracing::warn!(
						"Skipping {}: read took longer than {:?}",
						entry.url,
						self.config.fetch_timeout
					);
					MemberRead::Skipped
				}
			}
		});

		let mut fetched = HashMap::new();
		let mut skipped = 0;
		for read in join_all(reads).await {
			match read {
				MemberRead::Fetched(url, bytes) => {
					fetched.insert(url, bytes);
				}
				MemberRead::Skipped => skipped += 1,
				MemberRead::Vanished => {}
			}
		}
		(fetched, skipped)
	}

	/// Writes `bytes` through a temporary file, then swaps it in place
	async fn commit(&self, archive_path: &Path, bytes: Vec<u8>, version: i64) -> Result<Bytes> {
		let temp_path = archive_path.with_extension("zip.tmp");
		let mut writer = self.cache.write_as_stream(&temp_path).await?;
		writer.write_all(&bytes).await?;
		let bytes = writer.finish().await?;

		tokio::fs::rename(&temp_path, archive_path).await?;
		self.cache.rename(&temp_path, archive_path);
		set_version(archive_path, version).await?;
		Ok(bytes)
	}
}

enum MemberRead {
	Fetched(String, Bytes),
	Skipped,
	Vanished,
}

/// Modification time for an archive built at `version`
///
/// An archive missing members that are still registered is stamped just
/// below `version`, so the next request patches it instead of serving it.
fn archive_stamp(version: i64, skipped: usize) -> i64 {
	if skipped == 0 { version } else { version - 1 }
}

fn member_options(version: i64) -> SimpleFileOptions {
	SimpleFileOptions::default()
		.compression_method(CompressionMethod::Deflated)
		.last_modified_time(zip_time(version))
}

fn write_member(
	writer: &mut ZipWriter<Cursor<Vec<u8>>>,
	entry: &RelatedEntry,
	bytes: &[u8],
) -> Result<()> {
	writer.start_file(member_name(&entry.url), member_options(entry.version.empirical))?;
	writer.write_all(bytes)?;
	Ok(())
}

fn write_full(related: &[RelatedEntry], fetched: &HashMap<String, Bytes>) -> Result<Vec<u8>> {
	let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
	let mut manifest = ArchiveManifest::default();

	for entry in related {
		if let Some(bytes) = fetched.get(&entry.url) {
			write_member(&mut writer, entry, bytes)?;
			manifest
				.members
				.insert(entry.url.clone(), entry.version.empirical);
		}
	}

	writer.set_comment(manifest.to_comment()?);
	Ok(writer.finish()?.into_inner())
}

fn write_patched(
	mut archive: ZipArchive<Cursor<Bytes>>,
	previous: &ArchiveManifest,
	related: &[RelatedEntry],
	fetched: &HashMap<String, Bytes>,
) -> Result<Vec<u8>> {
	let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
	let mut manifest = ArchiveManifest::default();

	for entry in related {
		if let Some(bytes) = fetched.get(&entry.url) {
			write_member(&mut writer, entry, bytes)?;
			manifest
				.members
				.insert(entry.url.clone(), entry.version.empirical);
			continue;
		}

		// Unchanged, or its refresh failed: carry the old copy forward.
		let Some(recorded) = previous.version_of(&entry.url) else {
			continue;
		};
		let Some(index) = archive.index_for_name(member_name(&entry.url)) else {
			continue;
		};
		let member = archive.by_index_raw(index)?;
		writer.raw_copy_file(member)?;
		manifest.members.insert(entry.url.clone(), recorded);
	}

	writer.set_comment(manifest.to_comment()?);
	Ok(writer.finish()?.into_inner())
}

/// Archive modification time as a version stamp
fn modified_version(modified: Option<SystemTime>) -> i64 {
	modified
		.and_then(|time| time.duration_since(UNIX_EPOCH).ok())
		.and_then(|elapsed| i64::try_from(elapsed.as_millis()).ok())
		.unwrap_or(UNKNOWN_VERSION)
}

/// Sets the archive modification time to `version`
async fn set_version(path: &Path, version: i64) -> Result<()> {
	let path = path.to_path_buf();
	let modified = UNIX_EPOCH + Duration::from_millis(u64::try_from(version).unwrap_or_default());
	tokio::task::spawn_blocking(move || {
		std::fs::File::options()
			.write(true)
			.open(&path)?
			.set_modified(modified)
	})
	.await
	.map_err(|err| ArchiveError::Join(err.to_string()))??;
	Ok(())
}
