//! # Bundle Cache Archive
//!
//! Request-facing half of the bundle cache: one zip archive per page holding
//! the page's whole dependency closure, patched in place as members change.
//!
//! ## Endpoints
//!
//! - `GET <prefix>/bundle-cache/getGrandVersion`: `{"version": n}` for the
//!   page named by `x-bundle-cache-path`
//! - `GET <prefix>/bundle-cache/grand`: the page's archive, with its version in
//!   `X-bundle-cache-version`
//! - `GET <prefix>/bundle-cache/public/*`: the browser loader and its files
//!
//! ## Middleware
//!
//! - [`LoaderInjectionMiddleware`] adds the loader to HTML pages
//! - [`LinkDiscoveryMiddleware`] feeds observed page to resource requests into
//!   the registry

pub mod builder;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod inject;
pub mod manifest;
pub mod public;
pub mod server;

pub use builder::{Bundle, BuildKind, BuildStatistics, BundleBuilder};
pub use config::ArchiveConfig;
pub use discovery::{LinkCandidate, LinkDiscoveryMiddleware};
pub use error::{ArchiveError, Result};
pub use handler::ArchiveHandler;
pub use inject::LoaderInjectionMiddleware;
pub use manifest::ArchiveManifest;
pub use public::PublicFiles;
pub use server::ArchiveServer;
