//! Inverse filter pipeline: deflate, shuffle and fletcher32.
//!
//! Filters are stored in application order; decoding runs them in reverse.
//! A set bit `i` in a chunk's filter mask means filter `i` was skipped when
//! the chunk was written and must be skipped when reading it back.

use crate::catalog::{FilterId, FilterSpec};
use crate::{Error, Result};
use std::io::Read;

/// Runs the inverse pipeline over one chunk's raw bytes.
///
/// `expected_size` is the natural chunk size in bytes and bounds the deflate
/// output; a mismatch is a [`Error::Decode`].
pub fn apply_inverse_pipeline(
	mut data: Vec<u8>,
	filters: &[FilterSpec],
	filter_mask: u32,
	element_size: usize,
	expected_size: usize,
) -> Result<Vec<u8>> {
	for (index, filter) in filters.iter().enumerate().rev() {
		if filter_mask & (1 << index) != 0 {
			continue;
		}
		data = match filter.id {
			FilterId::Deflate => inflate(&data, expected_size)?,
			FilterId::Shuffle => {
				let size = filter.client_data.first().map_or(element_size, |&v| v as usize);
				unshuffle(&data, size)
			}
			FilterId::Fletcher32 => verify_fletcher32(data)?,
			FilterId::Unknown(id) => return Err(Error::UnsupportedFilter(id)),
		};
	}
	Ok(data)
}

/// Decompresses an RFC 1950 zlib stream to exactly `expected_size` bytes.
fn inflate(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
	let mut output = Vec::with_capacity(expected_size);
	let mut decoder = flate2::read::ZlibDecoder::new(data);
	decoder
		.read_to_end(&mut output)
		.map_err(|err| Error::Decode(format!("inflate failed: {err}")))?;
	if output.len() != expected_size {
		return Err(Error::Decode(format!(
			"inflate produced {} bytes, expected {expected_size}",
			output.len()
		)));
	}
	Ok(output)
}

/// Inverse of the byte shuffle: the encoded form stores byte-plane `j` of `n`
/// elements at `[j*n, j*n + n)`; interleave back to natural element order.
pub fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
	if element_size <= 1 || !data.len().is_multiple_of(element_size) {
		return data.to_vec();
	}
	let count = data.len() / element_size;
	let mut output = vec![0u8; data.len()];
	for j in 0..element_size {
		let plane = &data[j * count..(j + 1) * count];
		for (k, &byte) in plane.iter().enumerate() {
			output[k * element_size + j] = byte;
		}
	}
	output
}

/// The forward shuffle, used when synthesizing test data.
pub fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
	if element_size <= 1 || !data.len().is_multiple_of(element_size) {
		return data.to_vec();
	}
	let count = data.len() / element_size;
	let mut output = vec![0u8; data.len()];
	for (k, element) in data.chunks_exact(element_size).enumerate() {
		for (j, &byte) in element.iter().enumerate() {
			output[j * count + k] = byte;
		}
	}
	output
}

/// Verifies and strips the trailing fletcher32 checksum; no data transform.
fn verify_fletcher32(data: Vec<u8>) -> Result<Vec<u8>> {
	if data.len() < 4 {
		return Err(Error::Decode("fletcher32 block shorter than checksum".to_string()));
	}
	let (payload, stored) = data.split_at(data.len() - 4);
	let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
	let computed = fletcher32(payload);
	if stored != computed {
		return Err(Error::Decode(format!(
			"fletcher32 mismatch: stored {stored:#010x}, computed {computed:#010x}"
		)));
	}
	let mut data = data;
	data.truncate(data.len() - 4);
	Ok(data)
}

/// The fletcher32 variant HDF5 uses: 16-bit big-endian words with periodic
/// modular reduction.
pub fn fletcher32(data: &[u8]) -> u32 {
	let mut sum1: u32 = 0;
	let mut sum2: u32 = 0;

	let mut words = data.chunks_exact(2);
	let mut remaining = data.len() / 2;
	while remaining > 0 {
		let block = remaining.min(360);
		remaining -= block;
		for _ in 0..block {
			let word = words.next().unwrap();
			sum1 = sum1.wrapping_add(u32::from(u16::from_be_bytes([word[0], word[1]])));
			sum2 = sum2.wrapping_add(sum1);
		}
		sum1 = (sum1 & 0xFFFF) + (sum1 >> 16);
		sum2 = (sum2 & 0xFFFF) + (sum2 >> 16);
	}
	if let [last] = words.remainder() {
		sum1 = sum1.wrapping_add(u32::from(*last) << 8);
		sum2 = sum2.wrapping_add(sum1);
		sum1 = (sum1 & 0xFFFF) + (sum1 >> 16);
		sum2 = (sum2 & 0xFFFF) + (sum2 >> 16);
	}
	sum1 = (sum1 & 0xFFFF) + (sum1 >> 16);
	sum2 = (sum2 & 0xFFFF) + (sum2 >> 16);
	(sum2 << 16) | sum1
}

/// Zlib-compresses data, used when synthesizing test chunks.
pub fn deflate(data: &[u8], level: u32) -> Vec<u8> {
	let mut encoder = flate2::read::ZlibEncoder::new(data, flate2::Compression::new(level));
	let mut output = Vec::new();
	encoder.read_to_end(&mut output).expect("in-memory deflate cannot fail");
	output
}
