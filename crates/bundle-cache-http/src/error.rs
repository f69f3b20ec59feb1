//! Error type shared by handlers and middleware

/// Errors surfaced while handling a request
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Bad request: {0}")]
	BadRequest(String),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Forbidden: {0}")]
	Forbidden(String),

	#[error("Method not allowed: {0}")]
	MethodNotAllowed(String),

	#[error("Internal error: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("HTTP error: {0}")]
	Http(#[from] hyper::Error),
}

impl Error {
	/// HTTP status code this error maps to
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_http::Error;
	///
	/// assert_eq!(Error::BadRequest("missing header".into()).status_code(), 400);
	/// assert_eq!(Error::Internal("boom".into()).status_code(), 500);
	/// ```
	pub fn status_code(&self) -> u16 {
		match self {
			Error::BadRequest(_) => 400,
			Error::Forbidden(_) => 403,
			Error::NotFound(_) => 404,
			Error::MethodNotAllowed(_) => 405,
			Error::Internal(_) | Error::Serialization(_) | Error::Io(_) | Error::Http(_) => 500,
		}
	}
}

/// Result alias used across the HTTP layer
pub type Result<T> = std::result::Result<T, Error>;
