//! Archive server configuration

use std::path::PathBuf;
use std::time::Duration;

/// Header naming the page a bundle or version query is for
pub const PATH_HEADER: &str = "x-bundle-cache-path";

/// Header carrying the served bundle version
pub const VERSION_HEADER: &str = "X-bundle-cache-version";

/// Header a page's loader sets to declare the requesting document
pub const SOURCE_HEADER: &str = "x-bundle-cache-src";

/// Browser loader script under the public root
pub const LOADER_SCRIPT: &str = "bundle-cache-loader.js";

/// Configuration shared by the archive endpoints and middlewares
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
	/// Directory holding one archive per page
	pub scratch_dir: PathBuf,
	/// Directory served under `<prefix>/bundle-cache/public/`
	pub public_dir: PathBuf,
	/// URL prefix the endpoints are mounted under, without a trailing `/`
	pub prefix: String,
	/// Hosts whose pages may declare links
	pub domains: Vec<String>,
	/// Upper bound for reading one member during a build
	pub fetch_timeout: Duration,
	/// Largest response considered by link discovery
	pub size_ceiling: u64,
}

impl ArchiveConfig {
	pub fn new(scratch_dir: impl Into<PathBuf>, public_dir: impl Into<PathBuf>) -> Self {
		Self {
			scratch_dir: scratch_dir.into(),
			public_dir: public_dir.into(),
			prefix: String::new(),
			domains: vec!["localhost".to_string()],
			fetch_timeout: Duration::from_secs(5),
			size_ceiling: bundle_cache_registry::DEFAULT_SIZE_CEILING,
		}
	}

	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = prefix.into().trim_end_matches('/').to_string();
		self
	}

	pub fn with_domains(mut self, domains: Vec<String>) -> Self {
		self.domains = domains;
		self
	}

	pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
		self.fetch_timeout = timeout;
		self
	}

	pub fn with_size_ceiling(mut self, size_ceiling: u64) -> Self {
		self.size_ceiling = size_ceiling;
		self
	}

	/// Path prefix shared by every bundle-cache endpoint
	pub fn endpoint_root(&self) -> String {
		format!("{}/bundle-cache", self.prefix)
	}

	/// URL the injected loader script is served from
	pub fn loader_url(&self) -> String {
		format!("{}/public/{}", self.endpoint_root(), LOADER_SCRIPT)
	}

	/// Whether `host` is one of the configured platform domains
	pub fn is_platform_host(&self, host: &str) -> bool {
		self.domains
			.iter()
			.any(|domain| domain.eq_ignore_ascii_case(host))
	}
}
