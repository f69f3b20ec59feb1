//! Disk writer that mirrors its chunks into the byte cache

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::ByteCache;

/// Writable sink returned by [`ByteCache::write_as_stream`]
///
/// Every chunk accepted by the file is also appended to an in-memory copy.
/// The copy becomes the cache entry for the path once the writer is shut
/// down, so a half-written file is never served from memory.
pub struct CacheWriter {
	file: tokio::fs::File,
	path: PathBuf,
	buffer: Vec<u8>,
	cache: ByteCache,
	committed: Option<Bytes>,
}

impl CacheWriter {
	pub(crate) fn new(file: tokio::fs::File, path: PathBuf, cache: ByteCache) -> Self {
		Self {
			file,
			path,
			buffer: Vec::new(),
			cache,
			committed: None,
		}
	}

	/// Path being written
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Shuts the writer down and returns the bytes that were written
	///
	/// # Errors
	///
	/// Returns an error if flushing the file fails; nothing is cached then.
	pub async fn finish(mut self) -> io::Result<Bytes> {
		self.shutdown().await?;
		Ok(self.committed.take().unwrap_or_default())
	}

	fn commit(&mut self) {
		if self.committed.is_none() {
			let bytes = Bytes::from(std::mem::take(&mut self.buffer));
			self.cache.insert(self.path.clone(), bytes.clone());
			self.committed = Some(bytes);
		}
	}
}

impl AsyncWrite for CacheWriter {
	fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		let this = self.get_mut();
		match Pin::new(&mut this.file).poll_write(cx, buf) {
			Poll::Ready(Ok(written)) => {
				this.buffer.extend_from_slice(&buf[..written]);
				Poll::Ready(Ok(written))
			}
			other => other,
		}
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.get_mut().file).poll_flush(cx)
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		let this = self.get_mut();
		match Pin::new(&mut this.file).poll_shutdown(cx) {
			Poll::Ready(Ok(())) => {
				this.commit();
				Poll::Ready(Ok(()))
			}
			other => other,
		}
	}
}
