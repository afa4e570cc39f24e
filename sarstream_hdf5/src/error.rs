//! Error kinds for opening and reading HDF5 files.
//!
//! Parse failures during catalog building are always local (the offending
//! artifact is skipped and logged); the variants here surface at open time and
//! on explicit read operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
	/// The file is not HDF5, or a structure needed at open time is malformed.
	#[error("format error: {0}")]
	Format(String),

	/// The byte source failed (short read, network failure, bad HTTP status).
	#[error("I/O error: {0}")]
	Io(anyhow::Error),

	/// A dataset's filter pipeline names a filter outside the supported set.
	/// The dataset stays listed; reads fail with this error.
	#[error("unsupported filter id {0}")]
	UnsupportedFilter(u16),

	/// A requested dataset path or id is absent from the catalog.
	#[error("missing dataset: {0}")]
	MissingDataset(String),

	/// Decompression or element decoding produced a size inconsistent with
	/// the expected chunk element count.
	#[error("decode error: {0}")]
	Decode(String),
}

impl From<anyhow::Error> for Error {
	fn from(err: anyhow::Error) -> Self {
		Error::Io(err)
	}
}

pub type Result<T = ()> = std::result::Result<T, Error>;
