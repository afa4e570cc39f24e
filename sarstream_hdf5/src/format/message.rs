//! Header-message parsing: dataspace, datatype, data layout, filter pipeline,
//! attribute, link and the group-storage messages.
//!
//! Every parser takes the raw message body and returns `anyhow::Result`; the
//! caller decides whether a failure is fatal (it never is during catalog
//! building — malformed messages are logged and skipped).

use crate::catalog::{AttrValue, DataLayout, ElementType, FilterId, FilterSpec};
use anyhow::{Result, bail, ensure};
use byteorder::ByteOrder;
use sarstream_core::io::ValueReaderSlice;

pub const MSG_NIL: u16 = 0x0000;
pub const MSG_DATASPACE: u16 = 0x0001;
pub const MSG_LINK_INFO: u16 = 0x0002;
pub const MSG_DATATYPE: u16 = 0x0003;
pub const MSG_LINK: u16 = 0x0006;
pub const MSG_LAYOUT: u16 = 0x0008;
pub const MSG_FILTER_PIPELINE: u16 = 0x000B;
pub const MSG_ATTRIBUTE: u16 = 0x000C;
pub const MSG_CONTINUATION: u16 = 0x0010;
pub const MSG_SYMBOL_TABLE: u16 = 0x0011;

type Le<'a> = ValueReaderSlice<'a, byteorder::LittleEndian>;

/// A dataspace: dimension sizes, empty for scalars.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataspace {
	pub dims: Vec<u64>,
}

impl Dataspace {
	pub fn element_count(&self) -> u64 {
		self.dims.iter().product()
	}

	/// Parses dataspace message versions 1 and 2.
	pub fn parse(body: &[u8], length_size: u8) -> Result<Dataspace> {
		let mut r = Le::new_le(body);
		let version = r.read_u8()?;
		let rank = r.read_u8()? as usize;
		let flags = r.read_u8()?;
		match version {
			1 => r.skip(5)?,
			2 => r.skip(1)?, // dataspace type
			other => bail!("unsupported dataspace version {other}"),
		}
		ensure!(rank <= 32, "implausible dataspace rank {rank}");
		let mut dims = Vec::with_capacity(rank);
		for _ in 0..rank {
			dims.push(r.read_uint(length_size as usize)?);
		}
		// Maximum dimensions, present when flags bit 0 is set, are ignored.
		Ok(Dataspace { dims })
	}
}

/// A parsed datatype message, kept richer than [`ElementType`] so attribute
/// values of types outside the raster set (e.g. 64-bit ints) still decode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Datatype {
	pub class: u8,
	pub size: u32,
	pub signed: bool,
	pub big_endian: bool,
}

impl Datatype {
	pub fn parse(body: &[u8]) -> Result<Datatype> {
		let mut r = Le::new_le(body);
		let class_and_version = r.read_u8()?;
		let class = class_and_version & 0x0F;
		let version = class_and_version >> 4;
		ensure!((1..=3).contains(&version), "unsupported datatype version {version}");
		let bits0 = r.read_u8()?;
		r.skip(2)?; // remaining class bit fields
		let size = r.read_u32()?;
		ensure!(size > 0 && size <= 65536, "implausible datatype size {size}");
		Ok(Datatype {
			class,
			size,
			signed: bits0 & 0x08 != 0,
			big_endian: bits0 & 0x01 != 0,
		})
	}

	/// Maps the datatype onto the raster element set, `None` when outside it.
	pub fn element_type(&self) -> Option<ElementType> {
		match (self.class, self.size, self.signed) {
			(0, 1, false) => Some(ElementType::U8),
			(0, 2, true) => Some(ElementType::I16),
			(0, 2, false) => Some(ElementType::U16),
			(0, 4, true) => Some(ElementType::I32),
			(0, 4, false) => Some(ElementType::U32),
			(1, 2, _) => Some(ElementType::F16),
			(1, 4, _) => Some(ElementType::F32),
			(1, 8, _) => Some(ElementType::F64),
			(3, size, _) => Some(ElementType::String(size as usize)),
			// NISAR stores complex64 as an 8-byte compound of two floats.
			(6, 8, _) => Some(ElementType::ComplexF32),
			_ => None,
		}
	}
}

/// Raw layout information; chunk dims still carry the trailing element-size
/// dimension and are normalized during dataset assembly.
#[derive(Clone, Debug, PartialEq)]
pub enum RawLayout {
	Compact { data: Vec<u8> },
	Contiguous { address: u64, size: u64 },
	Chunked { raw_dims: Vec<u64>, index_address: u64, version: u8 },
}

impl RawLayout {
	/// Parses data layout message versions 3 and 4.
	pub fn parse(body: &[u8], offset_size: u8, length_size: u8) -> Result<RawLayout> {
		let mut r = Le::new_le(body);
		let version = r.read_u8()?;
		match version {
			3 => Self::parse_v3(&mut r, offset_size, length_size),
			4 => Self::parse_v4(&mut r, offset_size, length_size),
			other => bail!("unsupported layout version {other}"),
		}
	}

	fn parse_v3(r: &mut Le<'_>, offset_size: u8, length_size: u8) -> Result<RawLayout> {
		let class = r.read_u8()?;
		match class {
			0 => {
				let size = r.read_u16()?;
				Ok(RawLayout::Compact {
					data: r.read_bytes(size as u64)?.to_vec(),
				})
			}
			1 => Ok(RawLayout::Contiguous {
				address: r.read_uint(offset_size as usize)?,
				size: r.read_uint(length_size as usize)?,
			}),
			2 => {
				let dimensionality = r.read_u8()? as usize;
				ensure!((2..=33).contains(&dimensionality), "implausible chunk rank {dimensionality}");
				let index_address = r.read_uint(offset_size as usize)?;
				let mut raw_dims = Vec::with_capacity(dimensionality);
				for _ in 0..dimensionality {
					raw_dims.push(u64::from(r.read_u32()?));
				}
				Ok(RawLayout::Chunked {
					raw_dims,
					index_address,
					version: 3,
				})
			}
			other => bail!("unknown layout class {other}"),
		}
	}

	fn parse_v4(r: &mut Le<'_>, offset_size: u8, length_size: u8) -> Result<RawLayout> {
		let class = r.read_u8()?;
		ensure!(class == 2, "layout v4 class {class} not supported");
		let flags = r.read_u8()?;
		let dimensionality = r.read_u8()? as usize;
		ensure!((1..=33).contains(&dimensionality), "implausible chunk rank {dimensionality}");
		let dim_width = r.read_u8()? as usize;
		ensure!(matches!(dim_width, 1 | 2 | 4 | 8), "invalid dimension width {dim_width}");
		let mut raw_dims = Vec::with_capacity(dimensionality);
		for _ in 0..dimensionality {
			raw_dims.push(r.read_uint(dim_width)?);
		}
		let index_type = r.read_u8()?;
		let index_address = match index_type {
			1 => {
				// Single chunk; filtered single chunks carry size and mask.
				if flags & 0x02 != 0 {
					r.skip(length_size as u64 + 4)?;
				}
				r.read_uint(offset_size as usize)?
			}
			2 => r.read_uint(offset_size as usize)?,
			3 => {
				r.skip(1)?; // page bits
				r.read_uint(offset_size as usize)?
			}
			4 => {
				r.skip(6)?; // extensible-array config
				r.read_uint(offset_size as usize)?
			}
			5 => {
				r.skip(4 + 1 + 1)?; // node size, split %, merge %
				r.read_uint(offset_size as usize)?
			}
			other => bail!("unknown chunk index type {other}"),
		};
		Ok(RawLayout::Chunked {
			raw_dims,
			index_address,
			version: 4,
		})
	}
}

/// Normalizes raw chunk dims against the dataspace rank and corrects the
/// element type when the trailing chunk dimension disagrees with the datatype
/// width; the layout's element size takes precedence.
pub fn normalize_chunked_layout(
	raw_dims: &[u64],
	index_address: u64,
	version: u8,
	rank: usize,
	element_type: ElementType,
) -> (DataLayout, ElementType) {
	let (chunk_dims, element_size) = if raw_dims.len() == rank + 1 {
		(raw_dims[..rank].to_vec(), raw_dims[rank] as usize)
	} else {
		(raw_dims.to_vec(), element_type.byte_size())
	};

	let corrected = if element_size == element_type.byte_size() {
		element_type
	} else {
		correct_element_type(element_type, element_size)
	};

	(
		DataLayout::Chunked {
			chunk_dims,
			index_address,
			index_version: version,
		},
		corrected,
	)
}

fn correct_element_type(original: ElementType, size: usize) -> ElementType {
	use ElementType::{ComplexF32, F16, F32, F64, I16, I32, U8, U16, U32};
	let corrected = match (original, size) {
		(F16 | F32 | F64, 2) => F16,
		(F16 | F32 | F64, 4) => F32,
		(F16 | F32 | F64, 8) => F64,
		(I16 | I32, 2) => I16,
		(I16 | I32, 4) => I32,
		(U8 | U16 | U32, 1) => U8,
		(U8 | U16 | U32, 2) => U16,
		(U8 | U16 | U32, 4) => U32,
		(ComplexF32, 8) => ComplexF32,
		(other, _) => other,
	};
	if corrected.byte_size() != size {
		log::debug!("cannot reconcile element type {original:?} with layout element size {size}");
	}
	corrected
}

/// Parses filter pipeline message versions 1 and 2 into application order.
pub fn parse_filter_pipeline(body: &[u8]) -> Result<Vec<FilterSpec>> {
	let mut r = Le::new_le(body);
	let version = r.read_u8()?;
	let nfilters = r.read_u8()? as usize;
	ensure!(nfilters <= 32, "implausible filter count {nfilters}");
	match version {
		1 => r.skip(2 + 4)?,
		2 => {}
		other => bail!("unsupported filter pipeline version {other}"),
	}

	let mut filters = Vec::with_capacity(nfilters);
	for _ in 0..nfilters {
		let id = r.read_u16()?;
		let name_length = if version == 1 || id >= 256 { r.read_u16()? } else { 0 };
		let flags = r.read_u16()?;
		let num_values = r.read_u16()? as usize;
		if name_length > 0 {
			// V1 pads filter names to a multiple of eight bytes.
			let padded = if version == 1 {
				u64::from(name_length).div_ceil(8) * 8
			} else {
				u64::from(name_length)
			};
			r.skip(padded)?;
		}
		let mut client_data = Vec::with_capacity(num_values);
		for _ in 0..num_values {
			client_data.push(r.read_u32()?);
		}
		// V1 pads after an odd client-value count.
		if version == 1 && num_values % 2 == 1 {
			r.skip(4)?;
		}
		filters.push(FilterSpec {
			id: FilterId::from_raw(id),
			flags,
			client_data,
		});
	}
	Ok(filters)
}

/// A hard link to a child object.
#[derive(Clone, Debug, PartialEq)]
pub struct HardLink {
	pub name: String,
	pub address: u64,
}

/// Parses a link message, returning `None` for soft/external links.
pub fn parse_link(body: &[u8], offset_size: u8) -> Result<Option<HardLink>> {
	let mut r = Le::new_le(body);
	let version = r.read_u8()?;
	ensure!(version == 1, "unsupported link message version {version}");
	let flags = r.read_u8()?;
	let link_type = if flags & 0x08 != 0 { r.read_u8()? } else { 0 };
	if flags & 0x04 != 0 {
		r.skip(8)?; // creation order
	}
	if flags & 0x10 != 0 {
		r.skip(1)?; // charset
	}
	let name_length_size = 1usize << (flags & 0x03);
	let name_length = r.read_uint(name_length_size)?;
	ensure!(name_length > 0 && name_length < 4096, "implausible link name length {name_length}");
	let name = r.read_string(name_length)?;
	if link_type != 0 {
		return Ok(None);
	}
	let address = r.read_uint(offset_size as usize)?;
	Ok(Some(HardLink { name, address }))
}

/// Link info message; carries the fractal-heap address of dense link storage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkInfo {
	pub fractal_heap_address: u64,
}

pub fn parse_link_info(body: &[u8], offset_size: u8) -> Result<LinkInfo> {
	let mut r = Le::new_le(body);
	let version = r.read_u8()?;
	ensure!(version == 0, "unsupported link info version {version}");
	let flags = r.read_u8()?;
	if flags & 0x01 != 0 {
		r.skip(8)?; // maximum creation index
	}
	let fractal_heap_address = r.read_uint(offset_size as usize)?;
	Ok(LinkInfo { fractal_heap_address })
}

/// Symbol table message of old-style groups.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SymbolTable {
	pub btree_address: u64,
	pub heap_address: u64,
}

pub fn parse_symbol_table(body: &[u8], offset_size: u8) -> Result<SymbolTable> {
	let mut r = Le::new_le(body);
	Ok(SymbolTable {
		btree_address: r.read_uint(offset_size as usize)?,
		heap_address: r.read_uint(offset_size as usize)?,
	})
}

/// Object header continuation pointer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Continuation {
	pub offset: u64,
	pub length: u64,
}

pub fn parse_continuation(body: &[u8], offset_size: u8, length_size: u8) -> Result<Continuation> {
	let mut r = Le::new_le(body);
	Ok(Continuation {
		offset: r.read_uint(offset_size as usize)?,
		length: r.read_uint(length_size as usize)?,
	})
}

/// A parsed attribute: name plus decoded value.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
	pub name: String,
	pub value: AttrValue,
}

/// Parses attribute message versions 1 through 3 and decodes the value.
pub fn parse_attribute(body: &[u8], length_size: u8) -> Result<Option<Attribute>> {
	let mut r = Le::new_le(body);
	let version = r.read_u8()?;
	let flags = r.read_u8()?;
	let name_size = u64::from(r.read_u16()?);
	let datatype_size = u64::from(r.read_u16()?);
	let dataspace_size = u64::from(r.read_u16()?);
	match version {
		1 => {}
		2 | 3 => {
			// Shared datatype/dataspace cannot be resolved from the message alone.
			if flags & 0x03 != 0 {
				return Ok(None);
			}
			if version == 3 {
				r.skip(1)?; // name character set
			}
		}
		other => bail!("unsupported attribute version {other}"),
	}

	let pad = |size: u64| if version == 1 { size.div_ceil(8) * 8 } else { size };

	let name = {
		let bytes = r.read_bytes(pad(name_size))?;
		let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
		String::from_utf8_lossy(&bytes[..end]).into_owned()
	};
	let datatype = Datatype::parse(r.read_bytes(pad(datatype_size))?)?;
	let dataspace = Dataspace::parse(r.read_bytes(pad(dataspace_size))?, length_size)?;
	let data = r.read_bytes(r.remaining())?;

	match decode_attr_value(&datatype, &dataspace, data) {
		Some(value) => Ok(Some(Attribute { name, value })),
		None => Ok(None),
	}
}

/// Decodes a small attribute payload; unsupported types yield `None`.
fn decode_attr_value(datatype: &Datatype, dataspace: &Dataspace, data: &[u8]) -> Option<AttrValue> {
	let count = dataspace.element_count().max(1) as usize;
	let size = datatype.size as usize;
	if data.len() < count * size || count > 4096 {
		return None;
	}

	let uint_at = |i: usize| -> u64 {
		let bytes = &data[i * size..(i + 1) * size];
		if datatype.big_endian {
			byteorder::BigEndian::read_uint(bytes, size)
		} else {
			byteorder::LittleEndian::read_uint(bytes, size)
		}
	};

	match datatype.class {
		0 => {
			let decode = |i: usize| -> i64 {
				let raw = uint_at(i);
				if datatype.signed {
					// Sign-extend from the stored width.
					let shift = 64 - size * 8;
					((raw << shift) as i64) >> shift
				} else {
					raw as i64
				}
			};
			if dataspace.dims.is_empty() {
				Some(AttrValue::Int(decode(0)))
			} else {
				Some(AttrValue::IntArray((0..count).map(decode).collect()))
			}
		}
		1 => {
			let decode = |i: usize| -> Option<f64> {
				match size {
					4 => Some(f64::from(f32::from_bits(uint_at(i) as u32))),
					8 => Some(f64::from_bits(uint_at(i))),
					_ => None,
				}
			};
			if dataspace.dims.is_empty() {
				Some(AttrValue::Float(decode(0)?))
			} else {
				let values: Option<Vec<f64>> = (0..count).map(decode).collect();
				Some(AttrValue::FloatArray(values?))
			}
		}
		3 => {
			let decode = |i: usize| -> String {
				let bytes = &data[i * size..(i + 1) * size];
				let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
				String::from_utf8_lossy(&bytes[..end]).into_owned()
			};
			if dataspace.dims.is_empty() {
				Some(AttrValue::Text(decode(0)))
			} else {
				Some(AttrValue::TextArray((0..count).map(decode).collect()))
			}
		}
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dataspace_v2_simple() -> Result<()> {
		let mut body = vec![2u8, 2, 0, 1];
		body.extend_from_slice(&1024u64.to_le_bytes());
		body.extend_from_slice(&2048u64.to_le_bytes());
		let ds = Dataspace::parse(&body, 8)?;
		assert_eq!(ds.dims, vec![1024, 2048]);
		assert_eq!(ds.element_count(), 1024 * 2048);
		Ok(())
	}

	#[test]
	fn dataspace_scalar_has_no_dims() -> Result<()> {
		let body = vec![2u8, 0, 0, 0];
		let ds = Dataspace::parse(&body, 8)?;
		assert!(ds.dims.is_empty());
		assert_eq!(ds.element_count(), 1);
		Ok(())
	}

	#[test]
	fn datatype_f32() -> Result<()> {
		// version 1, class 1 (float), IEEE LE single
		let body = [0x11, 0x20, 0x1F, 0x00, 4, 0, 0, 0, 0, 0, 32, 0, 23, 8, 0, 23, 127, 0, 0, 0];
		let dt = Datatype::parse(&body)?;
		assert_eq!(dt.class, 1);
		assert_eq!(dt.size, 4);
		assert_eq!(dt.element_type(), Some(ElementType::F32));
		Ok(())
	}

	#[test]
	fn datatype_signed_int() -> Result<()> {
		let body = [0x10, 0x08, 0x00, 0x00, 2, 0, 0, 0, 0, 0, 16, 0];
		let dt = Datatype::parse(&body)?;
		assert_eq!(dt.element_type(), Some(ElementType::I16));
		Ok(())
	}

	#[test]
	fn datatype_compound_8_is_complex() -> Result<()> {
		let body = [0x16, 0x02, 0x00, 0x00, 8, 0, 0, 0];
		let dt = Datatype::parse(&body)?;
		assert_eq!(dt.element_type(), Some(ElementType::ComplexF32));
		Ok(())
	}

	#[test]
	fn layout_v3_chunked() -> Result<()> {
		let mut body = vec![3u8, 2, 3];
		body.extend_from_slice(&4096u64.to_le_bytes());
		body.extend_from_slice(&512u32.to_le_bytes());
		body.extend_from_slice(&512u32.to_le_bytes());
		body.extend_from_slice(&4u32.to_le_bytes());
		let layout = RawLayout::parse(&body, 8, 8)?;
		assert_eq!(
			layout,
			RawLayout::Chunked {
				raw_dims: vec![512, 512, 4],
				index_address: 4096,
				version: 3,
			}
		);
		Ok(())
	}

	#[test]
	fn layout_v3_contiguous() -> Result<()> {
		let mut body = vec![3u8, 1];
		body.extend_from_slice(&2000u64.to_le_bytes());
		body.extend_from_slice(&800u64.to_le_bytes());
		let layout = RawLayout::parse(&body, 8, 8)?;
		assert_eq!(layout, RawLayout::Contiguous { address: 2000, size: 800 });
		Ok(())
	}

	#[test]
	fn normalize_strips_trailing_element_dim() {
		let (layout, et) = normalize_chunked_layout(&[512, 512, 4], 4096, 3, 2, ElementType::F32);
		assert_eq!(
			layout,
			DataLayout::Chunked {
				chunk_dims: vec![512, 512],
				index_address: 4096,
				index_version: 3,
			}
		);
		assert_eq!(et, ElementType::F32);
	}

	#[test]
	fn normalize_corrects_element_size_disagreement() {
		// Datatype said f32 but the layout stores 8-byte elements.
		let (_, et) = normalize_chunked_layout(&[512, 512, 8], 4096, 3, 2, ElementType::F32);
		assert_eq!(et, ElementType::F64);
	}

	#[test]
	fn filter_pipeline_v1_padding() -> Result<()> {
		let mut body = vec![1u8, 2, 0, 0, 0, 0, 0, 0];
		// shuffle: id 2, no name, flags 0, 1 client value (element size), pad
		body.extend_from_slice(&2u16.to_le_bytes());
		body.extend_from_slice(&0u16.to_le_bytes());
		body.extend_from_slice(&0u16.to_le_bytes());
		body.extend_from_slice(&1u16.to_le_bytes());
		body.extend_from_slice(&4u32.to_le_bytes());
		body.extend_from_slice(&0u32.to_le_bytes()); // odd-count padding
		// deflate: id 1, 1 client value (level), pad
		body.extend_from_slice(&1u16.to_le_bytes());
		body.extend_from_slice(&0u16.to_le_bytes());
		body.extend_from_slice(&0u16.to_le_bytes());
		body.extend_from_slice(&1u16.to_le_bytes());
		body.extend_from_slice(&6u32.to_le_bytes());
		body.extend_from_slice(&0u32.to_le_bytes());

		let filters = parse_filter_pipeline(&body)?;
		assert_eq!(filters.len(), 2);
		assert_eq!(filters[0].id, FilterId::Shuffle);
		assert_eq!(filters[0].client_data, vec![4]);
		assert_eq!(filters[1].id, FilterId::Deflate);
		assert_eq!(filters[1].client_data, vec![6]);
		Ok(())
	}

	#[test]
	fn filter_pipeline_v2() -> Result<()> {
		let mut body = vec![2u8, 1];
		body.extend_from_slice(&1u16.to_le_bytes());
		body.extend_from_slice(&0u16.to_le_bytes());
		body.extend_from_slice(&1u16.to_le_bytes());
		body.extend_from_slice(&9u32.to_le_bytes());
		let filters = parse_filter_pipeline(&body)?;
		assert_eq!(filters.len(), 1);
		assert_eq!(filters[0].id, FilterId::Deflate);
		assert_eq!(filters[0].client_data, vec![9]);
		Ok(())
	}

	#[test]
	fn link_message_hard() -> Result<()> {
		let mut body = vec![1u8, 0x00, 4];
		body.extend_from_slice(b"HHHH");
		body.extend_from_slice(&7777u64.to_le_bytes());
		let link = parse_link(&body, 8)?.unwrap();
		assert_eq!(link.name, "HHHH");
		assert_eq!(link.address, 7777);
		Ok(())
	}

	#[test]
	fn attribute_v3_scalar_int() -> Result<()> {
		let name = b"epsg_code\0";
		let datatype = [0x10u8, 0x08, 0x00, 0x00, 4, 0, 0, 0, 0, 0, 32, 0];
		let dataspace = [2u8, 0, 0, 0];
		let mut body = vec![3u8, 0];
		body.extend_from_slice(&(name.len() as u16).to_le_bytes());
		body.extend_from_slice(&(datatype.len() as u16).to_le_bytes());
		body.extend_from_slice(&(dataspace.len() as u16).to_le_bytes());
		body.push(0); // charset
		body.extend_from_slice(name);
		body.extend_from_slice(&datatype);
		body.extend_from_slice(&dataspace);
		body.extend_from_slice(&32618i32.to_le_bytes());

		let attr = parse_attribute(&body, 8)?.unwrap();
		assert_eq!(attr.name, "epsg_code");
		assert_eq!(attr.value, AttrValue::Int(32618));
		Ok(())
	}

	#[test]
	fn attribute_string_value() -> Result<()> {
		let name = b"spatial_ref\0";
		let text = b"PROJCS[\"dummy\"]\0";
		let mut datatype = vec![0x13u8, 0x00, 0x00, 0x00];
		datatype.extend_from_slice(&(text.len() as u32).to_le_bytes());
		let dataspace = [2u8, 0, 0, 0];
		let mut body = vec![3u8, 0];
		body.extend_from_slice(&(name.len() as u16).to_le_bytes());
		body.extend_from_slice(&(datatype.len() as u16).to_le_bytes());
		body.extend_from_slice(&(dataspace.len() as u16).to_le_bytes());
		body.push(0);
		body.extend_from_slice(name);
		body.extend_from_slice(&datatype);
		body.extend_from_slice(&dataspace);
		body.extend_from_slice(text);

		let attr = parse_attribute(&body, 8)?.unwrap();
		assert_eq!(attr.name, "spatial_ref");
		assert_eq!(attr.value, AttrValue::Text("PROJCS[\"dummy\"]".to_string()));
		Ok(())
	}
}
