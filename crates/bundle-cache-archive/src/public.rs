//! Static support files served next to the bundle endpoints

use bundle_cache_bytes::ByteCache;
use bundle_cache_http::{Error, Response, Result};
use std::path::{Component, Path, PathBuf};

/// Joins `relative` onto `root`, refusing anything that could leave it
///
/// # Examples
///
/// ```
/// use bundle_cache_archive::public::safe_join;
/// use std::path::Path;
///
/// let root = Path::new("/srv/public");
/// assert!(safe_join(root, "loader/app.js").is_ok());
/// assert!(safe_join(root, "../secret").is_err());
/// ```
pub fn safe_join(root: &Path, relative: &str) -> Result<PathBuf> {
	let relative = relative.trim_start_matches('/');
	if relative.is_empty() || relative.contains('\\') || relative.contains('%') || relative.contains('\0') {
		return Err(Error::Forbidden(format!("Refusing public path {:?}", relative)));
	}

	let mut joined = root.to_path_buf();
	for component in Path::new(relative).components() {
		match component {
			Component::Normal(part) => joined.push(part),
			Component::CurDir => {}
			_ => {
				return Err(Error::Forbidden(format!("Refusing public path {:?}", relative)));
			}
		}
	}
	Ok(joined)
}

/// Serves files from the public root through the byte cache
#[derive(Clone)]
pub struct PublicFiles {
	root: PathBuf,
	cache: ByteCache,
}

impl PublicFiles {
	pub fn new(root: impl Into<PathBuf>, cache: ByteCache) -> Self {
		Self {
			root: root.into(),
			cache,
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Response for `relative` under the public root
	///
	/// # Errors
	///
	/// Returns `Forbidden` for traversal attempts and symlinks leading out of
	/// the root, and `NotFound` for missing files.
	pub async fn serve(&self, relative: &str) -> Result<Response> {
		let path = match safe_join(&self.root, relative) {
			Ok(path) => path,
			Err(err) => {
				tracing::warn!("Path traversal attempt blocked in public files: {}", relative);
				return Err(err);
			}
		};

		let resolved = match tokio::fs::canonicalize(&path).await {
			Ok(resolved) => resolved,
			Err(_) => return Err(Error::NotFound(format!("No public file {}", relative))),
		};
		let root = tokio::fs::canonicalize(&self.root).await?;
		if !resolved.starts_with(&root) {
			tracing::warn!("Public file {} resolves outside the public root", relative);
			return Err(Error::Forbidden(format!("Refusing public path {:?}", relative)));
		}
		if !tokio::fs::metadata(&resolved).await?.is_file() {
			return Err(Error::NotFound(format!("No public file {}", relative)));
		}

		let bytes = self.cache.read(&resolved).await?;
		let content_type = mime_guess::from_path(&resolved).first_or_octet_stream();
		Ok(Response::ok()
			.with_content_type(content_type.essence_str())
			.with_body(bytes))
	}
}
