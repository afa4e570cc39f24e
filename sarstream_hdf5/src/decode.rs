//! Element decoding: turns filtered-out chunk bytes into numeric buffers.
//!
//! The raster path widens or narrows everything to `f32` for downstream
//! uniformity; complex elements become linear power (|z|²) so every buffer in
//! the tile pipeline is non-negative real. Small-dataset reads keep the
//! native width instead, since coordinate arrays need full `f64` precision.
//!
//! All multi-byte values are little-endian, the byte order NISAR products are
//! written with.

use crate::catalog::ElementType;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use half::f16;

/// Decodes raw element bytes into an `f32` buffer.
pub fn decode_f32(bytes: &[u8], element_type: ElementType) -> Result<Vec<f32>> {
	let size = element_type.byte_size();
	if size == 0 || !bytes.len().is_multiple_of(size) {
		return Err(Error::Decode(format!(
			"buffer of {} bytes is not a whole number of {element_type:?} elements",
			bytes.len()
		)));
	}
	let count = bytes.len() / size;
	let mut output = Vec::with_capacity(count);

	match element_type {
		ElementType::U8 => output.extend(bytes.iter().map(|&b| f32::from(b))),
		ElementType::I16 => {
			output.extend(bytes.chunks_exact(2).map(|c| f32::from(LittleEndian::read_i16(c))));
		}
		ElementType::U16 => {
			output.extend(bytes.chunks_exact(2).map(|c| f32::from(LittleEndian::read_u16(c))));
		}
		ElementType::I32 => {
			output.extend(bytes.chunks_exact(4).map(|c| LittleEndian::read_i32(c) as f32));
		}
		ElementType::U32 => {
			output.extend(bytes.chunks_exact(4).map(|c| LittleEndian::read_u32(c) as f32));
		}
		ElementType::F16 => {
			output.extend(
				bytes
					.chunks_exact(2)
					.map(|c| f16::from_bits(LittleEndian::read_u16(c)).to_f32()),
			);
		}
		ElementType::F32 => output.extend(bytes.chunks_exact(4).map(LittleEndian::read_f32)),
		ElementType::F64 => {
			output.extend(bytes.chunks_exact(8).map(|c| LittleEndian::read_f64(c) as f32));
		}
		ElementType::ComplexF32 => {
			output.extend(bytes.chunks_exact(8).map(|c| {
				let re = LittleEndian::read_f32(&c[0..4]);
				let im = LittleEndian::read_f32(&c[4..8]);
				re.mul_add(re, im * im)
			}));
		}
		ElementType::String(_) => {
			return Err(Error::Decode("string dataset has no numeric decoding".to_string()));
		}
	}
	Ok(output)
}

/// A decoded small-dataset payload with its native width preserved.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
	F32(Vec<f32>),
	F64(Vec<f64>),
	Int(Vec<i64>),
	Text(Vec<String>),
}

impl DataValue {
	pub fn len(&self) -> usize {
		match self {
			DataValue::F32(v) => v.len(),
			DataValue::F64(v) => v.len(),
			DataValue::Int(v) => v.len(),
			DataValue::Text(v) => v.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// The value at `index` as `f64`, when numeric.
	pub fn get_f64(&self, index: usize) -> Option<f64> {
		match self {
			DataValue::F32(v) => v.get(index).map(|&x| f64::from(x)),
			DataValue::F64(v) => v.get(index).copied(),
			DataValue::Int(v) => v.get(index).map(|&x| x as f64),
			DataValue::Text(_) => None,
		}
	}

	/// The value at `index` as text, when textual.
	pub fn get_text(&self, index: usize) -> Option<&str> {
		match self {
			DataValue::Text(v) => v.get(index).map(String::as_str),
			_ => None,
		}
	}

	/// All textual entries, empty for numeric payloads.
	pub fn texts(&self) -> &[String] {
		match self {
			DataValue::Text(v) => v,
			_ => &[],
		}
	}
}

/// Decodes raw element bytes preserving the native width.
pub fn decode_values(bytes: &[u8], element_type: ElementType) -> Result<DataValue> {
	let size = element_type.byte_size();
	if size == 0 || !bytes.len().is_multiple_of(size) {
		return Err(Error::Decode(format!(
			"buffer of {} bytes is not a whole number of {element_type:?} elements",
			bytes.len()
		)));
	}

	Ok(match element_type {
		ElementType::F64 => DataValue::F64(bytes.chunks_exact(8).map(LittleEndian::read_f64).collect()),
		ElementType::U8 => DataValue::Int(bytes.iter().map(|&b| i64::from(b)).collect()),
		ElementType::I16 => DataValue::Int(bytes.chunks_exact(2).map(|c| i64::from(LittleEndian::read_i16(c))).collect()),
		ElementType::U16 => DataValue::Int(bytes.chunks_exact(2).map(|c| i64::from(LittleEndian::read_u16(c))).collect()),
		ElementType::I32 => DataValue::Int(bytes.chunks_exact(4).map(|c| i64::from(LittleEndian::read_i32(c))).collect()),
		ElementType::U32 => DataValue::Int(bytes.chunks_exact(4).map(|c| i64::from(LittleEndian::read_u32(c))).collect()),
		ElementType::String(width) => DataValue::Text(
			bytes
				.chunks_exact(width)
				.map(|c| {
					let end = c.iter().position(|&b| b == 0).unwrap_or(c.len());
					String::from_utf8_lossy(&c[..end]).trim_end().to_owned()
				})
				.collect(),
		),
		// Everything else already flows through the f32 path.
		other => DataValue::F32(decode_f32(bytes, other)?),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use rstest::rstest;

	#[test]
	fn decode_f32_identity() -> Result {
		let values = [1.5f32, -2.25, 0.0, 1e-20];
		let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
		assert_eq!(decode_f32(&bytes, ElementType::F32)?, values);
		Ok(())
	}

	#[rstest]
	#[case::u8(ElementType::U8, vec![0u8, 255, 128], vec![0.0, 255.0, 128.0])]
	#[case::i16(ElementType::I16, (-5i16).to_le_bytes().iter().chain(32767i16.to_le_bytes().iter()).copied().collect(), vec![-5.0, 32767.0])]
	#[case::u16(ElementType::U16, 65535u16.to_le_bytes().to_vec(), vec![65535.0])]
	#[case::i32(ElementType::I32, (-100_000i32).to_le_bytes().to_vec(), vec![-100_000.0])]
	#[case::u32(ElementType::U32, 3_000_000u32.to_le_bytes().to_vec(), vec![3_000_000.0])]
	fn decode_integers_widen(#[case] element_type: ElementType, #[case] bytes: Vec<u8>, #[case] expected: Vec<f32>) {
		assert_eq!(decode_f32(&bytes, element_type).unwrap(), expected);
	}

	#[test]
	fn decode_f64_narrows() -> Result {
		let bytes: Vec<u8> = [0.5f64, -1.25].iter().flat_map(|v| v.to_le_bytes()).collect();
		assert_eq!(decode_f32(&bytes, ElementType::F64)?, vec![0.5, -1.25]);
		Ok(())
	}

	#[test]
	fn decode_f16_half_precision() -> Result {
		let values = [f16::from_f32(1.0), f16::from_f32(-0.5), f16::INFINITY, f16::NAN];
		let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_bits().to_le_bytes()).collect();
		let decoded = decode_f32(&bytes, ElementType::F16)?;
		assert_eq!(decoded[0], 1.0);
		assert_eq!(decoded[1], -0.5);
		assert!(decoded[2].is_infinite());
		assert!(decoded[3].is_nan());
		Ok(())
	}

	#[test]
	fn decode_f16_subnormal() -> Result {
		// Smallest positive subnormal half: 2^-24
		let bytes = 0x0001u16.to_le_bytes().to_vec();
		let decoded = decode_f32(&bytes, ElementType::F16)?;
		assert_relative_eq!(decoded[0], 2.0f32.powi(-24));
		Ok(())
	}

	#[test]
	fn decode_complex_to_power() -> Result {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(&3.0f32.to_le_bytes());
		bytes.extend_from_slice(&4.0f32.to_le_bytes());
		let decoded = decode_f32(&bytes, ElementType::ComplexF32)?;
		assert_eq!(decoded, vec![25.0]);
		Ok(())
	}

	#[test]
	fn decode_partial_element_fails() {
		assert!(matches!(decode_f32(&[0u8; 7], ElementType::F32), Err(Error::Decode(_))));
	}

	#[test]
	fn decode_values_preserves_f64() -> Result {
		let coords = [500_000.000001f64, 500_010.000001];
		let bytes: Vec<u8> = coords.iter().flat_map(|v| v.to_le_bytes()).collect();
		match decode_values(&bytes, ElementType::F64)? {
			DataValue::F64(values) => assert_eq!(values, coords),
			other => panic!("expected F64, got {other:?}"),
		}
		Ok(())
	}

	#[test]
	fn decode_values_fixed_strings() -> Result {
		let bytes = b"HHHH\0\0\0\0HVHV\0\0\0\0".to_vec();
		let value = decode_values(&bytes, ElementType::String(8))?;
		assert_eq!(value.texts(), &["HHHH".to_string(), "HVHV".to_string()]);
		Ok(())
	}

	#[test]
	fn data_value_accessors() {
		let value = DataValue::Int(vec![32618]);
		assert_eq!(value.get_f64(0), Some(32618.0));
		assert_eq!(value.get_text(0), None);
		assert_eq!(value.len(), 1);
	}
}
