//! Member versions recorded inside an archive

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// URL to `empirical` version of every member, stored as the zip comment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
	pub members: BTreeMap<String, i64>,
}

impl ArchiveManifest {
	/// Parses a zip comment; archives without a readable manifest behave as
	/// if every member were stale
	pub fn from_comment(comment: &[u8]) -> Self {
		if comment.is_empty() {
			return Self::default();
		}
		match serde_json::from_slice(comment) {
			Ok(manifest) => manifest,
			Err(err) => {
				tracing::warn!("Ignoring unreadable archive manifest: {}", err);
				Self::default()
			}
		}
	}

	pub fn to_comment(&self) -> crate::Result<String> {
		Ok(serde_json::to_string(self)?)
	}

	/// Recorded version of `url`, if it is a member
	pub fn version_of(&self, url: &str) -> Option<i64> {
		self.members.get(url).copied()
	}
}

/// Zip member name for a registry URL
pub fn member_name(url: &str) -> &str {
	url.trim_start_matches('/')
}

/// Zip modification time for a version stamp, clamped to the zip range
pub fn zip_time(version: i64) -> zip::DateTime {
	use chrono::{Datelike, Timelike};

	chrono::DateTime::from_timestamp_millis(version)
		.and_then(|time| {
			zip::DateTime::from_date_and_time(
				u16::try_from(time.year()).ok()?,
				time.month() as u8,
				time.day() as u8,
				time.hour() as u8,
				time.minute() as u8,
				time.second() as u8,
			)
			.ok()
		})
		.unwrap_or_default()
}
