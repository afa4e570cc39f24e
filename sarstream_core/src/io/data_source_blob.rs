//! This module provides an in-memory data source.
//!
//! `DataSourceBlob` wraps a [`Blob`] and counts every `read_range` call, which
//! lets tests assert the cache-hit properties of the layers above it: a
//! request that should be served from cache must leave the counter untouched.

use super::DataSourceTrait;
use crate::{Blob, ByteRange};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// A data source backed by an in-memory buffer, with a read counter.
#[derive(Debug)]
pub struct DataSourceBlob {
	blob: Blob,
	reads: AtomicU64,
}

impl DataSourceBlob {
	/// Wraps a `Blob` as a data source.
	#[must_use]
	pub fn new(blob: Blob) -> Box<DataSourceBlob> {
		Box::new(DataSourceBlob {
			blob,
			reads: AtomicU64::new(0),
		})
	}

	/// Returns the number of `read_range` calls made so far.
	pub fn read_count(&self) -> u64 {
		self.reads.load(Ordering::Relaxed)
	}
}

#[async_trait]
impl DataSourceTrait for DataSourceBlob {
	async fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		self.reads.fetch_add(1, Ordering::Relaxed);
		if range.end() > self.blob.len() {
			bail!("byte range {range:?} exceeds source length {}", self.blob.len());
		}
		self.blob.read_range(range)
	}

	fn size(&self) -> u64 {
		self.blob.len()
	}

	fn name(&self) -> &str {
		"memory"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reads_and_counts() -> Result<()> {
		let source = DataSourceBlob::new(Blob::from(b"0123456789"));
		assert_eq!(source.read_count(), 0);

		let blob = source.read_range(&ByteRange::new(2, 3)).await?;
		assert_eq!(blob.as_slice(), b"234");
		assert_eq!(source.read_count(), 1);

		assert!(source.read_range(&ByteRange::new(8, 5)).await.is_err());
		assert_eq!(source.read_count(), 2);
		Ok(())
	}

	#[tokio::test]
	async fn read_all_returns_everything() -> Result<()> {
		let source = DataSourceBlob::new(Blob::from(b"abc"));
		assert_eq!(source.read_all().await?.as_slice(), b"abc");
		assert_eq!(source.size(), 3);
		Ok(())
	}
}
