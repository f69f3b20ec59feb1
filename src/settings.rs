//! Service settings
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `BUNDLE_CACHE_*` environment variables
//!
//! ```toml
//! listen = "127.0.0.1:8080"
//! domains = ["localhost", "app.example.com"]
//! propagation = "transitive"
//!
//! [roots]
//! "/shop" = "/srv/faculties/shop/static"
//! "/admin" = "/srv/faculties/admin/static"
//! ```

use bundle_cache_registry::{DEFAULT_CONFIG_FILE_NAME, FlushPolicy, Propagation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "BUNDLE_CACHE_";

/// Errors raised while loading or validating settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("Cannot read settings file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Invalid settings file: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("Invalid value for '{key}': {message}")]
	InvalidValue { key: String, message: String },
}

impl SettingsError {
	fn invalid(key: &str, message: impl Into<String>) -> Self {
		Self::InvalidValue {
			key: key.to_string(),
			message: message.into(),
		}
	}
}

/// Everything the service needs to start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
	pub listen: SocketAddr,
	/// URL prefix of the bundle-cache endpoints
	pub prefix: String,
	/// Hosts whose pages may declare dependency links
	pub domains: Vec<String>,
	/// URL prefix to directory mounts scanned and watched for front-end files
	pub roots: BTreeMap<String, PathBuf>,
	pub scratch_dir: PathBuf,
	pub public_dir: PathBuf,
	/// JSON document holding the persisted registry
	pub store_path: PathBuf,
	pub byte_cache_max_bytes: u64,
	pub size_ceiling: u64,
	pub fetch_timeout_ms: u64,
	pub persist_quiet_ms: u64,
	pub persist_max_delay_ms: u64,
	pub propagation: Propagation,
	pub config_file_names: Vec<String>,
	pub scripts_ttl_ms: u64,
	pub watch: bool,
	pub log_level: String,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
			prefix: String::new(),
			domains: vec!["localhost".to_string(), "127.0.0.1".to_string()],
			roots: BTreeMap::new(),
			scratch_dir: PathBuf::from("var/bundle-cache/archives"),
			public_dir: PathBuf::from("public"),
			store_path: PathBuf::from("var/bundle-cache/registry.json"),
			byte_cache_max_bytes: bundle_cache_bytes::DEFAULT_MAX_BYTES,
			size_ceiling: bundle_cache_registry::DEFAULT_SIZE_CEILING,
			fetch_timeout_ms: 5_000,
			persist_quiet_ms: 500,
			persist_max_delay_ms: 5_000,
			propagation: Propagation::default(),
			config_file_names: vec![DEFAULT_CONFIG_FILE_NAME.to_string()],
			scripts_ttl_ms: 1_000,
			watch: true,
			log_level: "info".to_string(),
		}
	}
}

impl Settings {
	/// Loads defaults, then `path` if given, then the process environment,
	/// and validates the result
	///
	/// # Errors
	///
	/// Returns an error if the file cannot be read or parsed, or if any
	/// value is out of range.
	pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
		let mut settings = match path {
			Some(path) => Self::from_file(path)?,
			None => Self::default(),
		};
		settings.apply_env(std::env::vars())?;
		settings.validate()?;
		Ok(settings)
	}

	/// Parses a TOML settings file; missing fields keep their defaults
	///
	/// # Errors
	///
	/// Returns an error if the file cannot be read, is not valid TOML, or
	/// names a key `Settings` does not have.
	pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
		let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Ok(toml::from_str(&content)?)
	}

	/// Applies `BUNDLE_CACHE_*` overrides from `vars`; other variables are
	/// ignored
	///
	/// Lists are comma separated; `BUNDLE_CACHE_ROOTS` takes
	/// `prefix=dir` pairs.
	///
	/// # Errors
	///
	/// Returns an error for unknown keys and unparsable values.
	pub fn apply_env<I>(&mut self, vars: I) -> Result<(), SettingsError>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (key, value) in vars {
			let Some(name) = key.strip_prefix(ENV_PREFIX) else {
				continue;
			};
			let name = name.to_ascii_lowercase();
			let value = value.trim();

			match name.as_str() {
				"listen" => self.listen = parse(&key, value)?,
				"prefix" => self.prefix = value.to_string(),
				"domains" => self.domains = split_list(value),
				"roots" => self.roots = parse_roots(&key, value)?,
				"scratch_dir" => self.scratch_dir = PathBuf::from(value),
				"public_dir" => self.public_dir = PathBuf::from(value),
				"store_path" => self.store_path = PathBuf::from(value),
				"byte_cache_max_bytes" => self.byte_cache_max_bytes = parse(&key, value)?,
				"size_ceiling" => self.size_ceiling = parse(&key, value)?,
				"fetch_timeout_ms" => self.fetch_timeout_ms = parse(&key, value)?,
				"persist_quiet_ms" => self.persist_quiet_ms = parse(&key, value)?,
				"persist_max_delay_ms" => self.persist_max_delay_ms = parse(&key, value)?,
				"propagation" => {
					self.propagation = match value.to_ascii_lowercase().as_str() {
						"transitive" => Propagation::Transitive,
						"one_hop" | "one-hop" => Propagation::OneHop,
						other => {
							return Err(SettingsError::invalid(
								&key,
								format!("expected 'transitive' or 'one_hop', got '{}'", other),
							));
						}
					}
				}
				"config_file_names" => self.config_file_names = split_list(value),
				"scripts_ttl_ms" => self.scripts_ttl_ms = parse(&key, value)?,
				"watch" => self.watch = parse_bool(&key, value)?,
				"log_level" => self.log_level = value.to_string(),
				_ => return Err(SettingsError::invalid(&key, "unknown setting")),
			}
		}
		Ok(())
	}

	/// Checks cross-field constraints
	///
	/// # Errors
	///
	/// Returns the first violated constraint.
	pub fn validate(&self) -> Result<(), SettingsError> {
		if self.size_ceiling == 0 {
			return Err(SettingsError::invalid("size_ceiling", "must be greater than zero"));
		}
		if self.byte_cache_max_bytes < self.size_ceiling {
			return Err(SettingsError::invalid(
				"byte_cache_max_bytes",
				"must be at least size_ceiling",
			));
		}
		if self.fetch_timeout_ms == 0 {
			return Err(SettingsError::invalid("fetch_timeout_ms", "must be greater than zero"));
		}
		if self.persist_quiet_ms > self.persist_max_delay_ms {
			return Err(SettingsError::invalid(
				"persist_quiet_ms",
				"must not exceed persist_max_delay_ms",
			));
		}
		if self.domains.is_empty() {
			return Err(SettingsError::invalid("domains", "at least one domain is required"));
		}
		if !self.prefix.is_empty() && !self.prefix.starts_with('/') {
			return Err(SettingsError::invalid("prefix", "must start with '/'"));
		}
		if let Some(prefix) = self.roots.keys().find(|prefix| !prefix.starts_with('/')) {
			return Err(SettingsError::invalid(
				"roots",
				format!("mount '{}' must start with '/'", prefix),
			));
		}
		Ok(())
	}

	pub fn fetch_timeout(&self) -> Duration {
		Duration::from_millis(self.fetch_timeout_ms)
	}

	pub fn scripts_ttl(&self) -> Duration {
		Duration::from_millis(self.scripts_ttl_ms)
	}

	pub fn flush_policy(&self) -> FlushPolicy {
		FlushPolicy::new(
			Duration::from_millis(self.persist_quiet_ms),
			Duration::from_millis(self.persist_max_delay_ms),
		)
	}
}

fn parse<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
	T: std::str::FromStr,
	T::Err: std::fmt::Display,
{
	value
		.parse()
		.map_err(|err: T::Err| SettingsError::invalid(key, err.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
	match value.to_ascii_lowercase().as_str() {
		"true" | "1" | "yes" | "on" => Ok(true),
		"false" | "0" | "no" | "off" => Ok(false),
		other => Err(SettingsError::invalid(key, format!("'{}' is not a boolean", other))),
	}
}

fn split_list(value: &str) -> Vec<String> {
	value
		.split(',')
		.map(str::trim)
		.filter(|item| !item.is_empty())
		.map(str::to_string)
		.collect()
}

fn parse_roots(key: &str, value: &str) -> Result<BTreeMap<String, PathBuf>, SettingsError> {
	split_list(value)
		.into_iter()
		.map(|pair| match pair.split_once('=') {
			Some((prefix, dir)) => Ok((prefix.trim().to_string(), PathBuf::from(dir.trim()))),
			None => Err(SettingsError::invalid(key, format!("'{}' is not prefix=dir", pair))),
		})
		.collect()
}
