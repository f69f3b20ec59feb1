//! Assembly of the bundle-cache components into one HTTP handler

use bundle_cache_archive::{
	ArchiveConfig, ArchiveHandler, ArchiveServer, BundleBuilder, LinkDiscoveryMiddleware,
	LoaderInjectionMiddleware, PublicFiles,
};
use bundle_cache_bytes::{ByteCache, ByteCacheConfig};
use bundle_cache_http::{Handler, MiddlewareChain};
use bundle_cache_registry::{Registry, RegistryOptions, ScriptsClient};
use std::sync::Arc;

use crate::assets::AssetHandler;
use crate::settings::Settings;
use crate::watcher::{FileEvents, FileWatcher, Mount};

/// One registry, byte cache and archive server wired together
///
/// Components are owned here and handed to the archive handler, the
/// middleware and the file-watch collaborator, so several services can live
/// in one process without sharing state.
pub struct BundleCacheService {
	registry: Arc<Registry>,
	cache: ByteCache,
	server: Arc<ArchiveServer>,
	scripts: ScriptsClient,
	files: FileEvents,
	handler: Arc<dyn Handler>,
}

impl BundleCacheService {
	pub fn new(settings: &Settings) -> Self {
		let registry = Arc::new(Registry::new(
			RegistryOptions::default()
				.with_size_ceiling(settings.size_ceiling)
				.with_config_file_names(settings.config_file_names.clone())
				.with_propagation(settings.propagation),
		));
		let cache = ByteCache::new(ByteCacheConfig::default().with_max_bytes(settings.byte_cache_max_bytes));

		let config = ArchiveConfig::new(&settings.scratch_dir, &settings.public_dir)
			.with_prefix(settings.prefix.as_str())
			.with_domains(settings.domains.clone())
			.with_fetch_timeout(settings.fetch_timeout())
			.with_size_ceiling(settings.size_ceiling);

		let server = Arc::new(ArchiveServer::new(BundleBuilder::new(
			registry.clone(),
			cache.clone(),
			config.clone(),
		)));
		let archive = ArchiveHandler::new(
			server.clone(),
			registry.clone(),
			PublicFiles::new(&settings.public_dir, cache.clone()),
			&config,
		)
		.with_fallback(Arc::new(AssetHandler::new(registry.clone(), cache.clone())));

		let handler = MiddlewareChain::new(Arc::new(archive))
			.with_middleware(Arc::new(LinkDiscoveryMiddleware::new(
				registry.clone(),
				config.clone(),
			)))
			.with_middleware(Arc::new(LoaderInjectionMiddleware::new(config)));

		let mounts = settings
			.roots
			.iter()
			.map(|(prefix, dir)| Mount::new(prefix.as_str(), dir))
			.collect();
		let files = FileEvents::new(registry.clone(), cache.clone(), mounts, settings.size_ceiling);

		Self {
			scripts: ScriptsClient::with_ttl(registry.clone(), settings.scripts_ttl()),
			registry,
			cache,
			server,
			files,
			handler: Arc::new(handler),
		}
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	pub fn cache(&self) -> &ByteCache {
		&self.cache
	}

	pub fn server(&self) -> &Arc<ArchiveServer> {
		&self.server
	}

	/// Per-scope script lists for collaborators
	pub fn scripts(&self) -> &ScriptsClient {
		&self.scripts
	}

	/// The request handler with loader injection and link discovery applied
	pub fn handler(&self) -> Arc<dyn Handler> {
		self.handler.clone()
	}

	/// Registers every front-end file under the mounted roots
	///
	/// # Errors
	///
	/// Returns an error if the blocking scan task panics.
	pub async fn scan(&self) -> Result<usize, tokio::task::JoinError> {
		let files = self.files.clone();
		tokio::task::spawn_blocking(move || files.scan()).await
	}

	/// Starts forwarding file changes under the mounted roots
	///
	/// # Errors
	///
	/// Returns an error if the roots cannot be watched.
	pub fn watch(&self) -> notify::Result<tokio::task::JoinHandle<()>> {
		let dirs: Vec<_> = self
			.files
			.mounts()
			.iter()
			.map(|mount| mount.dir.clone())
			.collect();
		let watcher = FileWatcher::new(&dirs)?;
		Ok(watcher.spawn(self.files.clone()))
	}
}
