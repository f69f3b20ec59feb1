//! # Bundle Cache Registry
//!
//! Authoritative map from URL to disk location, size, version stamp and
//! outgoing dependency links.
//!
//! ## Features
//!
//! - **Two-part versions**: `empirical` tracks the resource, `grand` also
//!   covers everything it depends on
//! - **Dependency closure**: [`Registry::get_related`] walks links depth-first
//!   and skips oversized files
//! - **Persistence**: the whole map is written through a [`DocumentStore`] with
//!   debounced coalescing
//! - **Pruning**: entries untouched since start-up are removed once the
//!   [`BootGate`] opens
//! - **Script configs**: recognized config files are parsed and merged by
//!   [`Registry::get_scripts`]
//!
//! ## Example
//!
//! ```
//! use bundle_cache_registry::{Registry, RegistryOptions};
//!
//! let registry = Registry::new(RegistryOptions::default());
//! registry.add_url("/index.html", "/srv/index.html", 120);
//! registry.add_url("/app.js", "/srv/app.js", 300);
//! registry.link("/index.html", ["/app.js"]);
//!
//! let related = registry.get_related("/index.html");
//! assert_eq!(related.len(), 1);
//! assert_eq!(related[0].url, "/app.js");
//! ```

mod boot;
mod clock;
pub mod config_entry;
mod entry;
pub mod error;
mod flush;
mod registry;
mod scripts;
mod store;

pub use boot::{BootGate, DeferredWork};
pub use clock::{UNKNOWN_VERSION, VersionClock};
pub use config_entry::{ConfigEntry, DEFAULT_CONFIG_FILE_NAME};
pub use entry::{RegistryDocument, RelatedEntry, UrlEntry, VersionStamp};
pub use error::{RegistryError, Result};
pub use flush::FlushPolicy;
pub use registry::{
	DEFAULT_SIZE_CEILING, LinkOutcome, Propagation, Registry, RegistryOptions,
};
pub use scripts::{DEFAULT_SCRIPTS_TTL, ScriptsClient};
pub use store::{DocumentStore, JsonFileStore, MemoryStore};
