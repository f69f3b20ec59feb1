use bytes::Bytes;
use hyper::{HeaderMap, Method, Uri, Version};

/// HTTP request with a fully buffered body
#[derive(Debug, Clone)]
pub struct Request {
	pub method: Method,
	pub uri: Uri,
	pub version: Version,
	pub headers: HeaderMap,
	pub body: Bytes,
}

impl Request {
	/// Create a new request from its parts
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_http::Request;
	/// use hyper::{HeaderMap, Method, Uri, Version};
	/// use bytes::Bytes;
	///
	/// let request = Request::new(
	///     Method::GET,
	///     Uri::from_static("/index.html"),
	///     Version::HTTP_11,
	///     HeaderMap::new(),
	///     Bytes::new(),
	/// );
	/// assert_eq!(request.path(), "/index.html");
	/// ```
	pub fn new(method: Method, uri: Uri, version: Version, headers: HeaderMap, body: Bytes) -> Self {
		Self {
			method,
			uri,
			version,
			headers,
			body,
		}
	}

	/// Start building a request
	///
	/// # Examples
	///
	/// ```
	/// use bundle_cache_http::Request;
	/// use hyper::Method;
	///
	/// let request = Request::builder()
	///     .method(Method::GET)
	///     .uri("/app.js")
	///     .header("referer", "http://localhost/index.html")
	///     .build()
	///     .unwrap();
	/// assert_eq!(request.header("referer"), Some("http://localhost/index.html"));
	/// ```
	pub fn builder() -> RequestBuilder {
		RequestBuilder::default()
	}

	/// Path component of the request URI
	pub fn path(&self) -> &str {
		self.uri.path()
	}

	/// Header value as a string, if present and valid ASCII
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}
}

/// Builder for [`Request`]
#[derive(Debug, Default)]
pub struct RequestBuilder {
	method: Option<Method>,
	uri: Option<String>,
	version: Option<Version>,
	headers: HeaderMap,
	body: Bytes,
}

impl RequestBuilder {
	pub fn method(mut self, method: Method) -> Self {
		self.method = Some(method);
		self
	}

	pub fn uri(mut self, uri: impl Into<String>) -> Self {
		self.uri = Some(uri.into());
		self
	}

	pub fn version(mut self, version: Version) -> Self {
		self.version = Some(version);
		self
	}

	pub fn headers(mut self, headers: HeaderMap) -> Self {
		self.headers = headers;
		self
	}

	/// Add a single header; invalid names or values are ignored
	pub fn header(mut self, name: &str, value: &str) -> Self {
		if let (Ok(name), Ok(value)) = (
			hyper::header::HeaderName::from_bytes(name.as_bytes()),
			hyper::header::HeaderValue::from_str(value),
		) {
			self.headers.insert(name, value);
		}
		self
	}

	pub fn body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();
		self
	}

	/// Finish the request
	///
	/// # Errors
	///
	/// Returns [`crate::Error::BadRequest`] if the URI does not parse.
	pub fn build(self) -> crate::Result<Request> {
		let uri = self
			.uri
			.unwrap_or_else(|| "/".to_string())
			.parse::<Uri>()
			.map_err(|e| crate::Error::BadRequest(format!("invalid uri: {}", e)))?;

		Ok(Request {
			method: self.method.unwrap_or(Method::GET),
			uri,
			version: self.version.unwrap_or(Version::HTTP_11),
			headers: self.headers,
			body: self.body,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_builder_defaults() {
		let request = Request::builder().build().unwrap();
		assert_eq!(request.method, Method::GET);
		assert_eq!(request.path(), "/");
		assert!(request.body.is_empty());
	}

	#[rstest]
	fn test_builder_rejects_invalid_uri() {
		let result = Request::builder().uri("http://[::1").build();
		assert!(result.is_err());
	}

	#[rstest]
	fn test_header_lookup_is_case_insensitive() {
		let request = Request::builder()
			.header("X-Bundle-Cache-Path", "/index.html")
			.build()
			.unwrap();
		assert_eq!(request.header("x-bundle-cache-path"), Some("/index.html"));
		assert_eq!(request.header("referer"), None);
	}
}
