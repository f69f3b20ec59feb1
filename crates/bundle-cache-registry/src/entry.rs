//! Registry entry types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Two-part version stamp
///
/// `empirical` is the last observed change to the resource itself; `grand`
/// also covers the resource's dependencies. `grand >= empirical` always holds
/// and neither value ever decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
	pub empirical: i64,
	pub grand: i64,
}

impl VersionStamp {
	/// Stamp with both fields set to `now`
	pub fn at(now: i64) -> Self {
		Self {
			empirical: now,
			grand: now,
		}
	}

	/// Records a change to the resource itself
	pub fn touch(&mut self, now: i64) {
		self.empirical = self.empirical.max(now);
		self.grand = self.grand.max(self.empirical);
	}

	/// Records a change somewhere in the resource's dependencies
	pub fn bump_grand(&mut self, now: i64) {
		self.grand = self.grand.max(now);
	}
}

/// One registry row describing one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
	/// Backing disk location; empty for link-only entries
	pub path: PathBuf,
	/// Last observed byte length
	pub size: u64,
	pub version: VersionStamp,
	/// URLs this entry depends on
	#[serde(default)]
	pub links: BTreeSet<String>,
}

impl UrlEntry {
	pub fn new(path: impl Into<PathBuf>, size: u64, now: i64) -> Self {
		Self {
			path: path.into(),
			size,
			version: VersionStamp::at(now),
			links: BTreeSet::new(),
		}
	}

	/// Whether this entry was created by `link` alone and has no file
	pub fn is_link_only(&self) -> bool {
		self.path.as_os_str().is_empty()
	}
}

/// A member of a URL's dependency closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedEntry {
	pub url: String,
	pub path: PathBuf,
	pub size: u64,
	pub version: VersionStamp,
}

/// The whole registry map as stored in the document store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
	pub urls: BTreeMap<String, UrlEntry>,
}
