//! hyper HTTP/1.1 accept loop

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use crate::{Handler, Request, Response};

/// Listen on `addr` and dispatch every request to `handler` until `shutdown`
/// resolves.
///
/// Handler errors are rendered through `From<Error> for Response`, so a
/// failing handler still produces a well-formed status code. Connections
/// already in flight when `shutdown` fires are allowed to finish on their own
/// tasks.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or `accept` fails.
pub async fn serve<F>(addr: SocketAddr, handler: Arc<dyn Handler>, shutdown: F) -> crate::Result<()>
where
	F: Future<Output = ()> + Send,
{
	let listener = TcpListener::bind(addr).await?;
	tracing::info!("Server listening on http://{}", addr);

	tokio::pin!(shutdown);

	loop {
		tokio::select! {
			result = listener.accept() => {
				let (stream, socket_addr) = result?;
				let handler = handler.clone();

				tokio::task::spawn(async move {
					if let Err(err) = handle_connection(stream, handler).await {
						tracing::debug!(peer = %socket_addr, "Error handling connection: {:?}", err);
					}
				});
			}
			_ = &mut shutdown => {
				tracing::info!("Shutdown signal received, stopping server...");
				break;
			}
		}
	}

	Ok(())
}

async fn handle_connection(stream: TcpStream, handler: Arc<dyn Handler>) -> crate::Result<()> {
	let io = TokioIo::new(stream);
	let service = RequestService { handler };

	http1::Builder::new().serve_connection(io, service).await?;

	Ok(())
}

struct RequestService {
	handler: Arc<dyn Handler>,
}

impl Service<hyper::Request<Incoming>> for RequestService {
	type Response = hyper::Response<Full<Bytes>>;
	type Error = Box<dyn std::error::Error + Send + Sync>;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

	fn call(&self, req: hyper::Request<Incoming>) -> Self::Future {
		let handler = self.handler.clone();

		Box::pin(async move {
			let (parts, body) = req.into_parts();
			let body_bytes = body.collect().await?.to_bytes();

			let request = Request::new(
				parts.method,
				parts.uri,
				parts.version,
				parts.headers,
				body_bytes,
			);

			let response = match handler.handle(request).await {
				Ok(response) => response,
				Err(err) => {
					tracing::error!("Request failed: {}", err);
					Response::from(err)
				}
			};

			let mut hyper_response = hyper::Response::builder().status(response.status);
			for (key, value) in response.headers.iter() {
				hyper_response = hyper_response.header(key, value);
			}

			Ok(hyper_response.body(Full::new(response.body))?)
		})
	}
}
