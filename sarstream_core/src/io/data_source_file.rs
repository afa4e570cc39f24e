//! This module provides reading from local files.
//!
//! `DataSourceFile` uses positioned reads (`read_at`), so concurrent
//! `read_range` calls never share or mutate a file cursor.

use super::DataSourceTrait;
use crate::{Blob, ByteRange};
use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use std::{fs::File, path::Path};

/// A data source backed by a local file.
#[derive(Debug)]
pub struct DataSourceFile {
	name: String,
	file: File,
	size: u64,
}

impl DataSourceFile {
	/// Opens a file and creates a `DataSourceFile`.
	///
	/// # Errors
	/// Fails if the path does not exist or is not a regular file.
	pub fn open(path: &Path) -> Result<Box<DataSourceFile>> {
		ensure!(path.exists(), "file {path:?} does not exist");
		ensure!(path.is_file(), "path {path:?} must be a file");

		let path = path.canonicalize()?;
		let file = File::open(&path)?;
		let size = file.metadata()?.len();

		Ok(Box::new(DataSourceFile {
			name: path.to_string_lossy().into_owned(),
			file,
			size,
		}))
	}
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
	use std::os::unix::fs::FileExt;
	file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
	use std::os::windows::fs::FileExt;
	let mut pos = 0;
	while pos < buf.len() {
		let n = file.seek_read(&mut buf[pos..], offset + pos as u64)?;
		if n == 0 {
			return Err(std::io::ErrorKind::UnexpectedEof.into());
		}
		pos += n;
	}
	Ok(())
}

#[async_trait]
impl DataSourceTrait for DataSourceFile {
	async fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		let mut blob = Blob::new_sized(range.length as usize);
		read_exact_at(&self.file, blob.as_mut_slice(), range.offset).with_context(|| {
			format!(
				"failed to read {} bytes at offset {} from file '{}'",
				range.length, range.offset, self.name
			)
		})?;
		Ok(blob)
	}

	fn size(&self) -> u64 {
		self.size
	}

	fn name(&self) -> &str {
		&self.name
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_fs::{NamedTempFile, fixture::FileWriteBin};

	fn fixture(content: &[u8]) -> Result<NamedTempFile> {
		let file = NamedTempFile::new("source.bin")?;
		file.write_binary(content)?;
		Ok(file)
	}

	#[tokio::test]
	async fn open_reports_size_and_name() -> Result<()> {
		let file = fixture(b"Hello, world!")?;
		let source = DataSourceFile::open(file.path())?;
		assert_eq!(source.size(), 13);
		assert!(source.name().ends_with("source.bin"));
		Ok(())
	}

	#[tokio::test]
	async fn open_missing_file_fails() {
		assert!(DataSourceFile::open(Path::new("/nonexistent/source.bin")).is_err());
	}

	#[tokio::test]
	async fn read_range_returns_exact_bytes() -> Result<()> {
		let file = fixture(b"Hello, world!")?;
		let source = DataSourceFile::open(file.path())?;
		let blob = source.read_range(&ByteRange::new(4, 6)).await?;
		assert_eq!(blob.as_slice(), b"o, wor");
		Ok(())
	}

	#[tokio::test]
	async fn read_past_end_fails() -> Result<()> {
		let file = fixture(b"short")?;
		let source = DataSourceFile::open(file.path())?;
		assert!(source.read_range(&ByteRange::new(3, 10)).await.is_err());
		Ok(())
	}

	#[tokio::test]
	async fn concurrent_reads_do_not_interfere() -> Result<()> {
		let file = fixture(b"abcdefghij")?;
		let source: std::sync::Arc<dyn DataSourceTrait> =
			std::sync::Arc::from(DataSourceFile::open(file.path())? as Box<dyn DataSourceTrait>);

		let mut handles = Vec::new();
		for i in 0..10u64 {
			let source = source.clone();
			handles.push(tokio::spawn(async move {
				source.read_range(&ByteRange::new(i, 1)).await.unwrap()
			}));
		}
		for (i, handle) in handles.into_iter().enumerate() {
			let blob = handle.await?;
			assert_eq!(blob.as_slice(), &b"abcdefghij"[i..=i]);
		}
		Ok(())
	}
}
