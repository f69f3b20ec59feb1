//! # Bundle Cache
//!
//! Live, dependency-tracked asset bundles for front ends assembled from many
//! independently deployed services.
//!
//! Every page gets one zip archive holding the page's whole dependency
//! closure. The closure is learned from real traffic, versions follow file
//! changes as they happen, and archives are patched member by member instead
//! of being rebuilt.
//!
//! ## Crates
//!
//! - [`http`]: request/response types, middleware chain and the hyper server
//! - [`bytes_cache`]: size-bounded byte cache for hot files and archives
//! - [`registry`]: URL to file, version and link registry with persistence
//! - [`archive`]: bundle endpoints, loader injection and link discovery
//!
//! ## Example
//!
//! ```rust,no_run
//! use bundle_cache::{BundleCacheService, Settings};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::load(None)?;
//! let service = BundleCacheService::new(&settings);
//! service.scan().await?;
//! bundle_cache::http::serve(settings.listen, service.handler(), std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

pub use bundle_cache_archive as archive;
pub use bundle_cache_bytes as bytes_cache;
pub use bundle_cache_http as http;
pub use bundle_cache_registry as registry;

pub mod assets;
pub mod logging;
pub mod service;
pub mod settings;
pub mod watcher;

pub use assets::AssetHandler;
pub use service::BundleCacheService;
pub use settings::{Settings, SettingsError};
pub use watcher::{FileEvents, FileWatcher, Mount, WatchEvent};
