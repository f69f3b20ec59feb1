//! Loader injection into HTML responses

use async_trait::async_trait;
use bundle_cache_http::{Handler, Middleware, Request, Response, Result};
use regex::{Captures, Regex};
use std::sync::{Arc, LazyLock};

use crate::ArchiveConfig;

static HEAD_TAG: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("valid head regex"));

static SCRIPT_SRC: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"(?i)(<script\b[^>]*?\s)src(\s*=\s*)("[^"]*"|'[^']*'|[^\s>]+)"#)
		.expect("valid script regex")
});

/// Inserts the bundle loader into HTML pages and parks same-origin script
/// sources in `data-bundle-cache-src`, so the loader decides whether they
/// come from a cached bundle
pub struct LoaderInjectionMiddleware {
	config: ArchiveConfig,
}

impl LoaderInjectionMiddleware {
	pub fn new(config: ArchiveConfig) -> Self {
		Self { config }
	}

	/// Whether a script `src` points at the platform itself
	fn is_same_origin(&self, src: &str) -> bool {
		let absolute = if src.starts_with("//") {
			format!("http:{}", src)
		} else {
			src.to_string()
		};
		match url::Url::parse(&absolute) {
			Ok(parsed) => parsed
				.host_str()
				.is_some_and(|host| self.config.is_platform_host(host)),
			Err(url::ParseError::RelativeUrlWithoutBase) => true,
			Err(_) => false,
		}
	}

	fn loader_tag(&self) -> String {
		format!(
			r#"<script src="{}" data-bundle-cache-root="{}"></script>"#,
			self.config.loader_url(),
			self.config.endpoint_root()
		)
	}

	/// Rewrites one HTML document
	pub fn rewrite(&self, html: &str) -> String {
		let loader_url = self.config.loader_url();
		if html.contains(&loader_url) {
			return html.to_string();
		}

		let parked = SCRIPT_SRC.replace_all(html, |caps: &Captures<'_>| {
			let quoted = &caps[3];
			let src = quoted.trim_matches(|c| c == '"' || c == '\'');
			if self.is_same_origin(src) {
				format!("{}data-bundle-cache-src{}{}", &caps[1], &caps[2], quoted)
			} else {
				caps[0].to_string()
			}
		});

		let loader = self.loader_tag();
		match HEAD_TAG.find(&parked) {
			Some(head) => {
				let mut rewritten = String::with_capacity(parked.len() + loader.len());
				rewritten.push_str(&parked[..head.end()]);
				rewritten.push_str(&loader);
				rewritten.push_str(&parked[head.end()..]);
				rewritten
			}
			None => format!("{}{}", loader, parked),
		}
	}
}

#[async_trait]
impl Middleware for LoaderInjectionMiddleware {
	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let mut response = next.handle(request).await?;
		if !response.is_html() {
			return Ok(response);
		}

		let Ok(html) = std::str::from_utf8(&response.body) else {
			tracing::debug!("Leaving non UTF-8 HTML response untouched");
			return Ok(response);
		};
		let rewritten = self.rewrite(html);
		response.headers.remove(hyper::header::CONTENT_LENGTH);
		Ok(response.with_body(rewritten))
	}

	fn should_continue(&self, request: &Request) -> bool {
		!request.path().starts_with(&self.config.endpoint_root())
	}
}
