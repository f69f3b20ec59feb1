//! Archive server errors

use std::sync::Arc;

/// Errors raised while building, patching or serving a bundle
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Zip error: {0}")]
	Zip(#[from] zip::result::ZipError),

	#[error("Manifest error: {0}")]
	Manifest(#[from] serde_json::Error),

	#[error("Archive {path} is corrupt: {reason}")]
	Corrupt { path: String, reason: String },

	#[error("No registry entry for {0}")]
	UnknownPage(String),

	#[error("Build task failed: {0}")]
	Join(String),

	/// Error shared by every request that awaited the same build
	#[error("{0}")]
	Shared(Arc<ArchiveError>),
}

impl From<ArchiveError> for bundle_cache_http::Error {
	fn from(error: ArchiveError) -> Self {
		match error {
			ArchiveError::UnknownPage(url) => Self::NotFound(format!("No bundle for {}", url)),
			ArchiveError::Shared(inner) => match inner.as_ref() {
				ArchiveError::UnknownPage(url) => Self::NotFound(format!("No bundle for {}", url)),
				other => Self::Internal(other.to_string()),
			},
			other => Self::Internal(other.to_string()),
		}
	}
}

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_unknown_page_maps_to_not_found() {
		let error: bundle_cache_http::Error = ArchiveError::UnknownPage("/p".to_string()).into();
		assert_eq!(error.status_code(), 404);

		let shared: bundle_cache_http::Error =
			ArchiveError::Shared(Arc::new(ArchiveError::UnknownPage("/p".to_string()))).into();
		assert_eq!(shared.status_code(), 404);
	}

	#[rstest]
	fn test_build_failures_map_to_internal() {
		let error: bundle_cache_http::Error = ArchiveError::Corrupt {
			path: "/tmp/x.zip".to_string(),
			reason: "bad header".to_string(),
		}
		.into();
		assert_eq!(error.status_code(), 500);
	}
}
