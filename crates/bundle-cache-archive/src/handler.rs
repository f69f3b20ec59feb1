//! HTTP endpoints of the archive server

use async_trait::async_trait;
use bundle_cache_http::{Error, Handler, Request, Response, Result};
use bundle_cache_registry::{Registry, UNKNOWN_VERSION};
use hyper::Method;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{PATH_HEADER, VERSION_HEADER};
use crate::{ArchiveConfig, ArchiveServer, PublicFiles};

#[derive(Debug, Serialize)]
struct VersionBody {
	version: i64,
}

/// Routes `<prefix>/bundle-cache/*` requests; everything else goes to the
/// fallback handler
pub struct ArchiveHandler {
	server: Arc<ArchiveServer>,
	registry: Arc<Registry>,
	public: PublicFiles,
	endpoint_root: String,
	fallback: Option<Arc<dyn Handler>>,
}

impl ArchiveHandler {
	pub fn new(
		server: Arc<ArchiveServer>,
		registry: Arc<Registry>,
		public: PublicFiles,
		config: &ArchiveConfig,
	) -> Self {
		Self {
			server,
			registry,
			public,
			endpoint_root: config.endpoint_root(),
			fallback: None,
		}
	}

	/// Handler for requests outside the bundle-cache endpoints
	pub fn with_fallback(mut self, fallback: Arc<dyn Handler>) -> Self {
		self.fallback = Some(fallback);
		self
	}

	fn get_grand_version(&self, request: &Request) -> Result<Response> {
		let Some(url) = request.header(PATH_HEADER) else {
			return Err(Error::BadRequest(format!("Missing {} header", PATH_HEADER)));
		};
		let version = self.registry.get_grand_version(url);
		Response::ok().with_json(&VersionBody { version })
	}

	async fn grand(&self, request: &Request) -> Result<Response> {
		let Some(url) = request.header(PATH_HEADER) else {
			return Err(Error::Internal(format!("Missing {} header", PATH_HEADER)));
		};
		if self.registry.get_grand_version(url) == UNKNOWN_VERSION {
			return Err(Error::NotFound(format!("No bundle for {}", url)));
		}

		let bundle = self.server.bundle(url).await?;
		Ok(Response::ok()
			.with_content_type("application/zip")
			.with_header(VERSION_HEADER, &bundle.version.to_string())
			.with_body(bundle.bytes))
	}
}

#[async_trait]
impl Handler for ArchiveHandler {
	async fn handle(&self, request: Request) -> Result<Response> {
		if !request.path().starts_with(self.endpoint_root.as_str()) {
			return match &self.fallback {
				Some(fallback) => fallback.handle(request).await,
				None => Err(Error::NotFound(format!("No route for {}", request.path()))),
			};
		}

		let endpoint = &request.path()[self.endpoint_root.len()..];
		if request.method != Method::GET && request.method != Method::HEAD {
			return Err(Error::MethodNotAllowed(format!(
				"{} {}",
				request.method,
				request.path()
			)));
		}
		match endpoint {
			"/getGrandVersion" => self.get_grand_version(&request),
			"/grand" => self.grand(&request).await,
			_ => match endpoint.strip_prefix("/public/") {
				Some(relative) => self.public.serve(relative).await,
				None => Err(Error::NotFound(format!("No route for {}", request.path()))),
			},
		}
	}
}
