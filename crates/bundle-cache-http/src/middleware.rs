//! Request handlers and the middleware wrapped around them
//!
//! The bundle-cache service is one [`Handler`] (the archive endpoints with a
//! static-file fallback) behind a [`MiddlewareChain`] that injects the loader
//! into pages and records dependency links from the traffic it sees.
//!
//! ```rust
//! use bundle_cache_http::{Handler, Middleware, MiddlewareChain, Request, Response, Result};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Page;
//!
//! #[async_trait]
//! impl Handler for Page {
//!     async fn handle(&self, _request: Request) -> Result<Response> {
//!         Ok(Response::ok().with_content_type("text/html").with_body("<html></html>"))
//!     }
//! }
//!
//! struct NoStore;
//!
//! #[async_trait]
//! impl Middleware for NoStore {
//!     async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
//!         Ok(next.handle(request).await?.with_header("cache-control", "no-store"))
//!     }
//! }
//!
//! let chain = MiddlewareChain::new(Arc::new(Page)).with_middleware(Arc::new(NoStore));
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::{Request, Response, Result};

/// Turns a request into a response
#[async_trait]
pub trait Handler: Send + Sync {
	/// # Errors
	///
	/// Returns an error that the server maps to a status response.
	async fn handle(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
	async fn handle(&self, request: Request) -> Result<Response> {
		(**self).handle(request).await
	}
}

/// Code that runs around the rest of the chain
///
/// An implementation may rewrite the request, short-circuit with its own
/// response, or inspect what `next` returns.
#[async_trait]
pub trait Middleware: Send + Sync {
	/// # Errors
	///
	/// Returns an error from this middleware or from `next`.
	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response>;

	/// Whether this middleware takes part in handling `request`
	///
	/// Returning `false` skips it for that request only; the endpoints use
	/// this to stay out of their own traffic.
	fn should_continue(&self, _request: &Request) -> bool {
		true
	}
}

/// A handler with middleware wrapped around it
///
/// The first middleware added is the outermost: it sees the request first
/// and the response last.
pub struct MiddlewareChain {
	layers: Vec<Arc<dyn Middleware>>,
	endpoint: Arc<dyn Handler>,
}

impl MiddlewareChain {
	pub fn new(endpoint: Arc<dyn Handler>) -> Self {
		Self {
			layers: Vec::new(),
			endpoint,
		}
	}

	/// Wraps `middleware` inside the ones already added
	pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
		self.add_middleware(middleware);
		self
	}

	pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
		self.layers.push(middleware);
	}
}

#[async_trait]
impl Handler for MiddlewareChain {
	async fn handle(&self, request: Request) -> Result<Response> {
		let active: Arc<[Arc<dyn Middleware>]> = self
			.layers
			.iter()
			.filter(|layer| layer.should_continue(&request))
			.cloned()
			.collect();
		if active.is_empty() {
			return self.endpoint.handle(request).await;
		}

		Stage {
			active,
			position: 0,
			endpoint: self.endpoint.clone(),
		}
		.handle(request)
		.await
	}
}

/// The remainder of a chain, starting at `position`
struct Stage {
	active: Arc<[Arc<dyn Middleware>]>,
	position: usize,
	endpoint: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Stage {
	async fn handle(&self, request: Request) -> Result<Response> {
		match self.active.get(self.position) {
			Some(layer) => {
				let next = Arc::new(Stage {
					active: self.active.clone(),
					position: self.position + 1,
					endpoint: self.endpoint.clone(),
				});
				layer.process(request, next).await
			}
			None => self.endpoint.handle(request).await,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct MockHandler {
		response_body: String,
	}

	#[async_trait]
	impl Handler for MockHandler {
		async fn handle(&self, _request: Request) -> Result<Response> {
			Ok(Response::ok().with_body(self.response_body.clone()))
		}
	}

	struct PrefixMiddleware {
		prefix: String,
	}

	#[async_trait]
	impl Middleware for PrefixMiddleware {
		async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
			let response = next.handle(request).await?;
			let current_body = String::from_utf8(response.body.to_vec()).unwrap_or_default();
			Ok(Response::ok().with_body(format!("{}{}", self.prefix, current_body)))
		}
	}

	struct AssetsOnlyMiddleware;

	#[async_trait]
	impl Middleware for AssetsOnlyMiddleware {
		async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
			let response = next.handle(request).await?;
			let current_body = String::from_utf8(response.body.to_vec()).unwrap_or_default();
			Ok(Response::ok().with_body(format!("asset:{}", current_body)))
		}

		fn should_continue(&self, request: &Request) -> bool {
			request.path().starts_with("/assets/")
		}
	}

	fn request(path: &str) -> Request {
		Request::builder().uri(path).build().unwrap()
	}

	#[rstest]
	#[tokio::test]
	async fn test_middleware_chain_empty() {
		let handler = Arc::new(MockHandler {
			response_body: "Test".to_string(),
		});
		let chain = MiddlewareChain::new(handler);

		let response = chain.handle(request("/")).await.unwrap();
		assert_eq!(response.body, "Test");
	}

	#[rstest]
	#[tokio::test]
	async fn test_middleware_chain_order() {
		let handler = Arc::new(MockHandler {
			response_body: "Data".to_string(),
		});
		let chain = MiddlewareChain::new(handler)
			.with_middleware(Arc::new(PrefixMiddleware {
				prefix: "M1:".to_string(),
			}))
			.with_middleware(Arc::new(PrefixMiddleware {
				prefix: "M2:".to_string(),
			}));

		let response = chain.handle(request("/")).await.unwrap();
		assert_eq!(response.body, "M1:M2:Data");
	}

	#[rstest]
	#[tokio::test]
	async fn test_middleware_conditional_skip() {
		let handler = Arc::new(MockHandler {
			response_body: "Body".to_string(),
		});
		let mut chain = MiddlewareChain::new(handler);
		chain.add_middleware(Arc::new(AssetsOnlyMiddleware));

		let response = chain.handle(request("/assets/app.js")).await.unwrap();
		assert_eq!(response.body, "asset:Body");

		let response = chain.handle(request("/index.html")).await.unwrap();
		assert_eq!(response.body, "Body");
	}

	struct Refuse;

	#[async_trait]
	impl Middleware for Refuse {
		async fn process(&self, _request: Request, _next: Arc<dyn Handler>) -> Result<Response> {
			Ok(Response::forbidden().with_body("refused"))
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_middleware_can_answer_without_next() {
		let handler = Arc::new(MockHandler {
			response_body: "Unreached".to_string(),
		});
		let chain = MiddlewareChain::new(handler)
			.with_middleware(Arc::new(PrefixMiddleware {
				prefix: "outer:".to_string(),
			}))
			.with_middleware(Arc::new(Refuse))
			.with_middleware(Arc::new(PrefixMiddleware {
				prefix: "inner:".to_string(),
			}));

		let response = chain.handle(request("/")).await.unwrap();
		assert_eq!(response.body, "outer:refused");
	}
}
