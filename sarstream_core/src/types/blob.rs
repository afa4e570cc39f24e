//! This module provides the [`Blob`] struct, a thin wrapper around [`Vec<u8>`]
//! used for every buffer that travels between data sources, filters and decoders.
//!
//! # Examples
//!
//! ```rust
//! use sarstream_core::{Blob, ByteRange};
//!
//! let blob = Blob::from(vec![0u8, 1, 2, 3, 4, 5, 6, 7]);
//! assert_eq!(blob.len(), 8);
//! assert_eq!(blob.read_range(&ByteRange::new(2, 3)).unwrap().as_slice(), &[2, 3, 4]);
//! ```

use super::ByteRange;
use anyhow::{Result, bail};
use std::fmt::Debug;

/// A simple wrapper around [`Vec<u8>`] with helpers for slicing by [`ByteRange`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
	/// Creates an empty `Blob`.
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	/// Creates a `Blob` of the given size, filled with zeros.
	#[must_use]
	pub fn new_sized(length: usize) -> Blob {
		Blob(vec![0u8; length])
	}

	/// Returns a new `Blob` containing the bytes in the given [`ByteRange`].
	///
	/// # Errors
	/// Fails if the range reaches beyond the end of the buffer.
	pub fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		let r = range.as_range_usize();
		if r.end > self.0.len() {
			bail!("byte range {range:?} exceeds blob length {}", self.0.len());
		}
		Ok(Blob(self.0[r].to_vec()))
	}

	/// Returns the underlying bytes as a slice.
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	/// Returns the underlying bytes as a mutable slice.
	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		&mut self.0
	}

	/// Interprets the bytes as UTF-8, lossily.
	#[must_use]
	pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
		String::from_utf8_lossy(&self.0)
	}

	/// Consumes the `Blob` and returns the underlying vector.
	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	/// Returns the length in bytes.
	#[must_use]
	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	/// Returns `true` if the buffer holds no bytes.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(vec: Vec<u8>) -> Self {
		Blob(vec)
	}
}

impl From<&[u8]> for Blob {
	fn from(slice: &[u8]) -> Self {
		Blob(slice.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(slice: &[u8; N]) -> Self {
		Blob(slice.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(text: &str) -> Self {
		Blob(text.as_bytes().to_vec())
	}
}

impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Blob({} bytes)", self.0.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn basic_accessors() {
		let blob = Blob::from(vec![10u8, 20, 30]);
		assert_eq!(blob.len(), 3);
		assert!(!blob.is_empty());
		assert_eq!(blob.as_slice(), &[10, 20, 30]);
		assert_eq!(blob.clone().into_vec(), vec![10, 20, 30]);
	}

	#[test]
	fn sized_is_zeroed() {
		let blob = Blob::new_sized(4);
		assert_eq!(blob.as_slice(), &[0, 0, 0, 0]);
	}

	#[test]
	fn read_range_in_bounds() -> Result<()> {
		let blob = Blob::from(vec![0u8, 1, 2, 3, 4]);
		assert_eq!(blob.read_range(&ByteRange::new(1, 3))?.as_slice(), &[1, 2, 3]);
		Ok(())
	}

	#[test]
	fn read_range_out_of_bounds() {
		let blob = Blob::from(vec![0u8, 1, 2]);
		assert!(blob.read_range(&ByteRange::new(2, 5)).is_err());
	}

	#[test]
	fn from_str_roundtrip() {
		let blob = Blob::from("sarstream");
		assert_eq!(blob.as_str(), "sarstream");
	}

	#[test]
	fn debug_prints_length() {
		assert_eq!(format!("{:?}", Blob::new_sized(7)), "Blob(7 bytes)");
	}
}
