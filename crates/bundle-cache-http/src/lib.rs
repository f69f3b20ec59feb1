//! # Bundle Cache HTTP
//!
//! Minimal HTTP plumbing shared by the bundle-cache crates.
//!
//! - [`Request`] / [`Response`] - fully buffered request and response values
//! - [`Handler`] / [`Middleware`] - the async traits every endpoint and
//!   response hook implements
//! - [`MiddlewareChain`] - composes middleware around a handler
//! - [`serve`] - hyper HTTP/1.1 accept loop with graceful shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use bundle_cache_http::{Handler, Request, Response, Result, serve};
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Handler for Hello {
//!     async fn handle(&self, _request: Request) -> Result<Response> {
//!         Ok(Response::ok().with_body("hello"))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let addr = "127.0.0.1:8080".parse().unwrap();
//! serve(addr, Arc::new(Hello), std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use error::{Error, Result};
pub use middleware::{Handler, Middleware, MiddlewareChain};
pub use request::Request;
pub use response::Response;
pub use server::serve;
