use bytes::Bytes;
use hyper::{HeaderMap, StatusCode};
use serde::Serialize;

/// HTTP Response representation
#[derive(Debug, Clone)]
pub struct Response {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: Bytes,
	/// Indicates whether the middleware chain should stop processing
	stop_chain: bool,
}

impl Response {
	/// Create a new Response with the given status code
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_http::Response;
	/// use hyper::StatusCode;
	///
	/// let response = Response::new(StatusCode::OK);
	/// assert_eq!(response.status, StatusCode::OK);
	/// assert!(response.body.is_empty());
	/// ```
	pub fn new(status: StatusCode) -> Self {
		Self {
			status,
			headers: HeaderMap::new(),
			body: Bytes::new(),
			stop_chain: false,
		}
	}

	/// Create a Response with HTTP 200 OK status
	pub fn ok() -> Self {
		Self::new(StatusCode::OK)
	}

	/// Create a Response with HTTP 400 Bad Request status
	pub fn bad_request() -> Self {
		Self::new(StatusCode::BAD_REQUEST)
	}

	/// Create a Response with HTTP 403 Forbidden status
	pub fn forbidden() -> Self {
		Self::new(StatusCode::FORBIDDEN)
	}

	/// Create a Response with HTTP 404 Not Found status
	pub fn not_found() -> Self {
		Self::new(StatusCode::NOT_FOUND)
	}

	/// Create a Response with HTTP 500 Internal Server Error status
	pub fn internal_server_error() -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR)
	}

	/// Set the response body
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_http::Response;
	/// use bytes::Bytes;
	///
	/// let response = Response::ok().with_body("Hello, World!");
	/// assert_eq!(response.body, Bytes::from("Hello, World!"));
	/// ```
	pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();
		self
	}

	/// Add a custom header to the response
	///
	/// Invalid header names or values are silently dropped.
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_http::Response;
	///
	/// let response = Response::ok().with_header("X-bundle-cache-version", "42");
	/// assert_eq!(
	///     response.headers.get("x-bundle-cache-version").unwrap().to_str().unwrap(),
	///     "42"
	/// );
	/// ```
	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		if let Ok(header_name) = hyper::header::HeaderName::from_bytes(name.as_bytes()) {
			if let Ok(header_value) = hyper::header::HeaderValue::from_str(value) {
				self.headers.insert(header_name, header_value);
			}
		}
		self
	}

	/// Set the Content-Type header
	pub fn with_content_type(self, content_type: &str) -> Self {
		self.with_header(hyper::header::CONTENT_TYPE.as_str(), content_type)
	}

	/// Set the response body to JSON and add appropriate Content-Type header
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_http::Response;
	/// use serde_json::json;
	///
	/// let response = Response::ok().with_json(&json!({"version": 7})).unwrap();
	/// assert_eq!(
	///     response.headers.get("content-type").unwrap().to_str().unwrap(),
	///     "application/json"
	/// );
	/// ```
	pub fn with_json<T: Serialize>(mut self, data: &T) -> crate::Result<Self> {
		let json =
			serde_json::to_vec(data).map_err(|e| crate::Error::Serialization(e.to_string()))?;
		self.body = Bytes::from(json);
		self.headers.insert(
			hyper::header::CONTENT_TYPE,
			hyper::header::HeaderValue::from_static("application/json"),
		);
		Ok(self)
	}

	/// Content-Type header value without parameters, lowercased
	pub fn content_type(&self) -> Option<String> {
		self.headers
			.get(hyper::header::CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(|value| {
				value
					.split(';')
					.next()
					.unwrap_or_default()
					.trim()
					.to_ascii_lowercase()
			})
	}

	/// Whether the response carries an HTML document
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_http::Response;
	///
	/// let response = Response::ok().with_content_type("text/html; charset=utf-8");
	/// assert!(response.is_html());
	/// assert!(!Response::ok().with_content_type("text/css").is_html());
	/// ```
	pub fn is_html(&self) -> bool {
		self.content_type().as_deref() == Some("text/html")
	}

	/// Check if this response should stop the middleware chain
	pub fn should_stop_chain(&self) -> bool {
		self.stop_chain
	}

	/// Set whether this response should stop the middleware chain
	pub fn with_stop_chain(mut self, stop: bool) -> Self {
		self.stop_chain = stop;
		self
	}
}

impl From<crate::Error> for Response {
	fn from(error: crate::Error) -> Self {
		let status =
			StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let body = serde_json::json!({
			"error": error.to_string(),
		});

		Response::new(status)
			.with_json(&body)
			.unwrap_or_else(|_| Response::internal_server_error())
	}
}
