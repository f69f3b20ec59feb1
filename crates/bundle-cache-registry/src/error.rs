//! Registry error types

/// Errors raised by registry persistence and config parsing
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Document store error: {0}")]
	Store(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
