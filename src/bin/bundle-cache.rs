//! bundle-cache service binary

use anyhow::Context;
use bundle_cache::registry::{BootGate, JsonFileStore};
use bundle_cache::{BundleCacheService, Settings, logging};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "bundle-cache", version, about = "Serve live, dependency-tracked asset bundles")]
struct Cli {
	/// Settings file (TOML)
	#[arg(long, short)]
	config: Option<PathBuf>,

	/// Address to listen on, overriding the settings
	#[arg(long)]
	listen: Option<SocketAddr>,

	/// Skip watching the mounted roots for changes
	#[arg(long)]
	no_watch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
	if let Some(listen) = cli.listen {
		settings.listen = listen;
	}
	if cli.no_watch {
		settings.watch = false;
	}
	logging::init(&settings.log_level);

	let service = BundleCacheService::new(&settings);
	let registry = service.registry().clone();

	let store = Arc::new(JsonFileStore::new(&settings.store_path));
	match registry.restore(store.as_ref()).await {
		Ok(count) => tracing::info!("Loaded {} registry entries from {}", count, store.path().display()),
		Err(err) => tracing::warn!("Starting with an empty registry: {}", err),
	}
	let flusher = registry.attach_store(store.clone(), settings.flush_policy());

	let gate = Arc::new(BootGate::new(registry.now()));
	let pruner = registry.spawn_pruner(gate.clone());
	{
		let _scan = gate.defer();
		service.scan().await.context("Start-up scan failed")?;
	}

	let watcher = if settings.watch {
		Some(service.watch().context("Failed to watch mounted roots")?)
	} else {
		None
	};
	gate.mark_booted();

	bundle_cache::http::serve(settings.listen, service.handler(), shutdown_signal()).await?;

	if let Some(watcher) = watcher {
		watcher.abort();
	}
	pruner.abort();
	flusher.abort();
	registry
		.flush_now(store.as_ref())
		.await
		.context("Failed to persist the registry on shutdown")?;
	tracing::info!("Registry persisted; shutting down");
	Ok(())
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!("Failed to listen for Ctrl-C: {}", err);
		std::future::pending::<()>().await;
	}
	tracing::info!("Shutdown requested");
}
