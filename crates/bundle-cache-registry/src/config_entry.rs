//! Per-service script configuration files

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name recognized as a script configuration when none is configured
pub const DEFAULT_CONFIG_FILE_NAME: &str = "faculty.json";

/// Parsed contents of a recognized config file
///
/// ```json
/// { "autorun": ["/shared/boot.js"], "run": { "admin": ["/admin/panel.js"] } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
	/// Scripts loaded in every scope
	#[serde(default)]
	pub autorun: Vec<String>,
	/// Scripts keyed by named scope
	#[serde(default)]
	pub run: BTreeMap<String, Vec<String>>,
}

impl ConfigEntry {
	/// Reads and parses a config file
	///
	/// # Errors
	///
	/// Returns an error if the file cannot be read or is not valid JSON.
	pub fn load(path: &Path) -> crate::Result<Self> {
		let content = std::fs::read(path)?;
		Ok(serde_json::from_slice(&content)?)
	}

	/// Scripts for `scope`: autorun entries first, then the scope's own list
	pub fn scripts_for(&self, scope: &str) -> impl Iterator<Item = &String> {
		self.autorun
			.iter()
			.chain(self.run.get(scope).into_iter().flatten())
	}
}

/// Whether `url`'s last path segment is one of `names`
///
/// # Examples
///
/// ```
/// use bundle_cache_registry::config_entry::is_config_url;
///
/// let names = vec!["faculty.json".to_string()];
/// assert!(is_config_url("/admin/faculty.json", &names));
/// assert!(!is_config_url("/admin/faculty.json.bak", &names));
/// ```
pub fn is_config_url(url: &str, names: &[String]) -> bool {
	let path = url.split(['?', '#']).next().unwrap_or_default();
	let file_name = path.rsplit('/').next().unwrap_or_default();
	names.iter().any(|name| name == file_name)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use tempfile::TempDir;

	#[rstest]
	fn test_load_with_defaults() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().join("faculty.json");
		std::fs::write(&path, r#"{"run": {"admin": ["/admin.js"]}}"#).unwrap();

		let entry = ConfigEntry::load(&path).unwrap();
		assert!(entry.autorun.is_empty());
		assert_eq!(entry.run["admin"], vec!["/admin.js".to_string()]);
	}

	#[rstest]
	fn test_load_rejects_invalid_json() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().join("faculty.json");
		std::fs::write(&path, "not json").unwrap();

		assert!(ConfigEntry::load(&path).is_err());
	}

	#[rstest]
	fn test_scripts_for_scope() {
		let mut entry = ConfigEntry {
			autorun: vec!["/boot.js".to_string()],
			..Default::default()
		};
		entry
			.run
			.insert("admin".to_string(), vec!["/admin.js".to_string()]);

		let admin: Vec<_> = entry.scripts_for("admin").cloned().collect();
		assert_eq!(admin, vec!["/boot.js", "/admin.js"]);

		let other: Vec<_> = entry.scripts_for("public").cloned().collect();
		assert_eq!(other, vec!["/boot.js"]);
	}

	#[rstest]
	fn test_is_config_url_ignores_query() {
		let names = vec![DEFAULT_CONFIG_FILE_NAME.to_string()];
		assert!(is_config_url("/faculty.json?v=2", &names));
		assert!(!is_config_url("/faculty.js", &names));
	}
}
