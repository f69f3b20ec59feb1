//! Internal cache entry structure

use bytes::Bytes;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub(crate) struct ByteEntry {
	pub(crate) bytes: Bytes,
	pub(crate) created_at: SystemTime,
	pub(crate) last_access: SystemTime,
}

impl ByteEntry {
	pub(crate) fn new(bytes: Bytes) -> Self {
		let now = SystemTime::now();
		Self {
			bytes,
			created_at: now,
			last_access: now,
		}
	}

	pub(crate) fn len(&self) -> u64 {
		self.bytes.len() as u64
	}

	pub(crate) fn touch(&mut self) {
		self.last_access = SystemTime::now();
	}
}
