//! Serves registered front-end files for requests outside the bundle-cache
//! endpoints

use async_trait::async_trait;
use bundle_cache_bytes::ByteCache;
use bundle_cache_http::{Error, Handler, Request, Response, Result};
use bundle_cache_registry::Registry;
use std::sync::Arc;

/// Looks the request path up in the registry and answers with the backing
/// file, read through the byte cache
pub struct AssetHandler {
	registry: Arc<Registry>,
	cache: ByteCache,
}

impl AssetHandler {
	pub fn new(registry: Arc<Registry>, cache: ByteCache) -> Self {
		Self { registry, cache }
	}
}

#[async_trait]
impl Handler for AssetHandler {
	async fn handle(&self, request: Request) -> Result<Response> {
		let url = request.path();
		let entry = match self.registry.entry(url) {
			Some(entry) if !entry.is_link_only() => entry,
			_ => return Err(Error::NotFound(format!("No asset registered for {}", url))),
		};

		let bytes = match self.cache.read(&entry.path).await {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				tracing::warn!("{} vanished from {}; deregistering", url, entry.path.display());
				self.registry.remove_url(url);
				return Err(Error::NotFound(format!("No asset registered for {}", url)));
			}
			Err(err) => return Err(err.into()),
		};

		let content_type = mime_guess::from_path(&entry.path).first_or_octet_stream();
		Ok(Response::ok()
			.with_content_type(content_type.as_ref())
			.with_body(bytes))
	}
}
