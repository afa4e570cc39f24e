//! This module provides the `ValueReaderSlice` struct for reading typed values
//! from a byte slice with a position cursor.
//!
//! File-format structures are parsed by walking such a cursor over a prefetched
//! buffer: fixed-width integers and floats in either byte order, plus
//! variable-width unsigned integers for formats that encode their own
//! offset/length sizes (HDF5 addresses are 2, 4 or 8 bytes wide depending on
//! the superblock).
//!
//! # Examples
//!
//! ```rust
//! use sarstream_core::io::ValueReaderSlice;
//!
//! let data = &[0x01, 0x02, 0x03, 0x04];
//! let mut reader = ValueReaderSlice::new_le(data);
//! assert_eq!(reader.read_u16().unwrap(), 0x0201);
//! assert_eq!(reader.read_uint(2).unwrap(), 0x0403);
//! ```

use anyhow::{Result, bail};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::marker::PhantomData;

/// A cursor over a byte slice that decodes values in byte order `E`.
pub struct ValueReaderSlice<'a, E: ByteOrder> {
	_phantom: PhantomData<E>,
	slice: &'a [u8],
	position: usize,
}

impl<'a, E: ByteOrder> ValueReaderSlice<'a, E> {
	/// Creates a new reader over the given slice.
	#[must_use]
	pub fn new(slice: &'a [u8]) -> ValueReaderSlice<'a, E> {
		ValueReaderSlice {
			_phantom: PhantomData,
			slice,
			position: 0,
		}
	}

	/// Returns the total length of the readable data.
	pub fn len(&self) -> u64 {
		self.slice.len() as u64
	}

	/// Returns `true` if the slice is empty.
	pub fn is_empty(&self) -> bool {
		self.slice.is_empty()
	}

	/// Returns the current read position.
	pub fn position(&self) -> u64 {
		self.position as u64
	}

	/// Sets the read position.
	///
	/// # Errors
	/// Fails if the position lies beyond the end of the data.
	pub fn set_position(&mut self, position: u64) -> Result<()> {
		if position > self.len() {
			bail!("position {position} outside length {}", self.len());
		}
		self.position = position as usize;
		Ok(())
	}

	/// Advances the read position by `count` bytes.
	pub fn skip(&mut self, count: u64) -> Result<()> {
		self.set_position(self.position as u64 + count)
	}

	/// Returns the number of bytes remaining.
	pub fn remaining(&self) -> u64 {
		self.len() - self.position as u64
	}

	/// Returns `true` if any bytes remain.
	pub fn has_remaining(&self) -> bool {
		self.remaining() > 0
	}

	fn take(&mut self, count: usize) -> Result<&'a [u8]> {
		if self.position + count > self.slice.len() {
			bail!(
				"read of {count} bytes at position {} exceeds length {}",
				self.position,
				self.slice.len()
			);
		}
		let bytes = &self.slice[self.position..self.position + count];
		self.position += count;
		Ok(bytes)
	}

	/// Reads an unsigned 8-bit integer.
	pub fn read_u8(&mut self) -> Result<u8> {
		Ok(self.take(1)?[0])
	}

	/// Reads an unsigned 16-bit integer.
	pub fn read_u16(&mut self) -> Result<u16> {
		Ok(E::read_u16(self.take(2)?))
	}

	/// Reads an unsigned 32-bit integer.
	pub fn read_u32(&mut self) -> Result<u32> {
		Ok(E::read_u32(self.take(4)?))
	}

	/// Reads an unsigned 64-bit integer.
	pub fn read_u64(&mut self) -> Result<u64> {
		Ok(E::read_u64(self.take(8)?))
	}

	/// Reads a signed 32-bit integer.
	pub fn read_i32(&mut self) -> Result<i32> {
		Ok(E::read_i32(self.take(4)?))
	}

	/// Reads a 32-bit floating point number.
	pub fn read_f32(&mut self) -> Result<f32> {
		Ok(E::read_f32(self.take(4)?))
	}

	/// Reads a 64-bit floating point number.
	pub fn read_f64(&mut self) -> Result<f64> {
		Ok(E::read_f64(self.take(8)?))
	}

	/// Reads an unsigned integer of `width` bytes (1 to 8).
	pub fn read_uint(&mut self, width: usize) -> Result<u64> {
		if width == 0 || width > 8 {
			bail!("unsupported integer width {width}");
		}
		Ok(E::read_uint(self.take(width)?, width))
	}

	/// Reads `length` raw bytes.
	pub fn read_bytes(&mut self, length: u64) -> Result<&'a [u8]> {
		self.take(length as usize)
	}

	/// Reads a UTF-8 string of `length` bytes, trimming trailing NULs.
	pub fn read_string(&mut self, length: u64) -> Result<String> {
		let bytes = self.take(length as usize)?;
		let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
		Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
	}
}

impl<'a> ValueReaderSlice<'a, LittleEndian> {
	/// Creates a new reader with little-endian byte order.
	#[must_use]
	pub fn new_le(slice: &'a [u8]) -> ValueReaderSlice<'a, LittleEndian> {
		ValueReaderSlice::new(slice)
	}
}

impl<'a> ValueReaderSlice<'a, BigEndian> {
	/// Creates a new reader with big-endian byte order.
	#[must_use]
	pub fn new_be(slice: &'a [u8]) -> ValueReaderSlice<'a, BigEndian> {
		ValueReaderSlice::new(slice)
	}
}
