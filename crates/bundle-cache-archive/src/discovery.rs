//! Traffic-based link discovery
//!
//! Dependency edges are inferred from real navigation: when a page's markup
//! makes the browser fetch a sub-resource, the request names the page as its
//! origin and the registry learns `page -> resource`.

use async_trait::async_trait;
use bundle_cache_http::{Handler, Middleware, Request, Response, Result};
use bundle_cache_registry::Registry;
use hyper::Method;
use std::sync::Arc;

use crate::ArchiveConfig;
use crate::config::SOURCE_HEADER;

/// An edge observed from one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
	pub from: String,
	pub to: String,
}

/// URL declared as the origin of a request; the loader's explicit header
/// takes precedence over the standard referrer
pub fn declared_origin(request: &Request) -> Option<&str> {
	request
		.header(SOURCE_HEADER)
		.or_else(|| request.header(hyper::header::REFERER.as_str()))
}

/// Whether a URL path names an HTML document
///
/// # Examples
///
/// ```
/// use bundle_cache_archive::discovery::is_html_path;
///
/// assert!(is_html_path("/admin/"));
/// assert!(is_html_path("/admin/users"));
/// assert!(is_html_path("/index.html"));
/// assert!(!is_html_path("/app.js"));
/// ```
pub fn is_html_path(path: &str) -> bool {
	if path.ends_with('/') {
		return true;
	}
	let file_name = path.rsplit('/').next().unwrap_or_default();
	if !file_name.contains('.') {
		return true;
	}
	mime_guess::from_path(file_name)
		.first()
		.is_some_and(|mime| mime.essence_str() == "text/html")
}

/// Decides whether a completed request yields a dependency edge
pub fn link_candidate(
	config: &ArchiveConfig,
	method: &Method,
	requested: &str,
	origin: Option<&str>,
	response: &Response,
) -> Option<LinkCandidate> {
	if method != Method::GET || !response.status.is_success() {
		return None;
	}
	let length = response.body.len() as u64;
	if length == 0 || length > config.size_ceiling {
		return None;
	}

	let origin = url::Url::parse(origin?).ok()?;
	if !origin.host_str().is_some_and(|host| config.is_platform_host(host)) {
		return None;
	}

	// Only pages are roots, and only sub-resources are dependencies.
	if !is_html_path(origin.path()) || response.is_html() {
		return None;
	}

	Some(LinkCandidate {
		from: origin.path().to_string(),
		to: requested.to_string(),
	})
}

/// Records `origin -> requested` edges for responses that pass
/// [`link_candidate`]
pub struct LinkDiscoveryMiddleware {
	registry: Arc<Registry>,
	config: ArchiveConfig,
}

impl LinkDiscoveryMiddleware {
	pub fn new(registry: Arc<Registry>, config: ArchiveConfig) -> Self {
		Self { registry, config }
	}
}

#[async_trait]
impl Middleware for LinkDiscoveryMiddleware {
	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let method = request.method.clone();
		let requested = request.path().to_string();
		let origin = declared_origin(&request).map(str::to_string);

		let response = next.handle(request).await?;

		if let Some(candidate) =
			link_candidate(&self.config, &method, &requested, origin.as_deref(), &response)
		{
			let outcome = self.registry.link(&candidate.from, [candidate.to.as_str()]);
			if !outcome.added.is_empty() {
				tracing::debug!("Discovered link {} -> {}", candidate.from, candidate.to);
			}
		}
		Ok(response)
	}

	fn should_continue(&self, request: &Request) -> bool {
		!request.path().starts_with(&self.config.endpoint_root())
	}
}
