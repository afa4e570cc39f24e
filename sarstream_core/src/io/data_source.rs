//! This module defines the `DataSourceTrait` for random-access reads over
//! local files, HTTP resources and in-memory buffers.
//!
//! A data source is created once, shared behind an `Arc` for the lifetime of a
//! reader, and must tolerate concurrent overlapping `read_range` calls; request
//! fan-out and queueing are the chunk engine's business, not the source's.

use crate::{Blob, ByteRange};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Type alias for a shared dynamic implementation of the `DataSourceTrait`.
pub type DataSource = std::sync::Arc<dyn DataSourceTrait>;

/// A trait for random-access reads from a byte source of known size.
#[async_trait]
pub trait DataSourceTrait: Debug + Send + Sync {
	/// Reads a specific range of bytes from the source.
	///
	/// Fails on short reads, network failures and non-success HTTP statuses.
	async fn read_range(&self, range: &ByteRange) -> Result<Blob>;

	/// Reads the entire source.
	async fn read_all(&self) -> Result<Blob> {
		self.read_range(&ByteRange::new(0, self.size())).await
	}

	/// Returns the total size of the source in bytes.
	fn size(&self) -> u64;

	/// Returns the name of the source (path or URL).
	fn name(&self) -> &str;
}
