//! Object header parsing for versions 1 and 2 (`OHDR`), including
//! continuation blocks, plus assembly of the messages into an `ObjectInfo`
//! that the catalog passes can interpret as a dataset or a group.

use super::{
	Continuation, Dataspace, Datatype, HardLink, LinkInfo, MSG_ATTRIBUTE, MSG_CONTINUATION, MSG_DATASPACE, MSG_DATATYPE,
	MSG_FILTER_PIPELINE, MSG_LAYOUT, MSG_LINK, MSG_LINK_INFO, MSG_SYMBOL_TABLE, RawLayout, SymbolTable, Superblock,
	parse_attribute, parse_continuation, parse_filter_pipeline, parse_link, parse_link_info, parse_symbol_table,
};
use crate::catalog::{AttrValue, FilterSpec};
use anyhow::{Result, bail, ensure};
use sarstream_core::io::ValueReaderSlice;
use std::collections::BTreeMap;

/// Signature of a version-2 object header.
pub const OHDR_SIGNATURE: &[u8; 4] = b"OHDR";
/// Signature of a version-2 continuation block.
pub const OCHK_SIGNATURE: &[u8; 4] = b"OCHK";

/// One raw header message: type and body bytes.
#[derive(Clone, Copy, Debug)]
pub struct RawMessage<'a> {
	pub msg_type: u16,
	pub body: &'a [u8],
}

/// Walks all messages of the object header at `address`, following
/// continuation blocks that lie within the prefix.
///
/// The returned list preserves message order across continuations.
pub fn read_object_messages<'a>(prefix: &'a [u8], address: u64, sb: &Superblock) -> Result<Vec<RawMessage<'a>>> {
	let start = address as usize;
	ensure!(start < prefix.len(), "object header at {address} outside prefix");

	let mut messages = Vec::new();
	let mut continuations = Vec::new();

	// A continuation block outside the prefix loses its own messages only;
	// everything already collected stays usable.
	if prefix[start..].starts_with(OHDR_SIGNATURE) {
		let flags = read_v2_block(prefix, start, sb, &mut messages, &mut continuations)?;
		while let Some(cont) = continuations.pop() {
			if let Err(err) = read_v2_continuation(prefix, &cont, flags, sb, &mut messages, &mut continuations) {
				log::debug!("continuation block of header at {address}: {err}");
			}
		}
	} else {
		read_v1_header(prefix, start, sb, &mut messages, &mut continuations)?;
		while let Some(cont) = continuations.pop() {
			if let Err(err) =
				read_v1_messages_region(prefix, cont.offset as usize, cont.length as usize, sb, &mut messages, &mut continuations)
			{
				log::debug!("continuation block of header at {address}: {err}");
			}
		}
	}

	Ok(messages)
}

fn read_v1_header<'a>(
	prefix: &'a [u8],
	start: usize,
	sb: &Superblock,
	messages: &mut Vec<RawMessage<'a>>,
	continuations: &mut Vec<Continuation>,
) -> Result<()> {
	let mut r = ValueReaderSlice::new_le(&prefix[start..]);
	let version = r.read_u8()?;
	ensure!(version == 1, "not a v1 object header");
	r.skip(1)?; // reserved
	let _message_count = r.read_u16()?;
	r.skip(4)?; // object reference count
	let header_size = r.read_u32()? as usize;
	// Messages start 8-aligned relative to the header start.
	read_v1_messages_region(prefix, start + 16, header_size, sb, messages, continuations)
}

fn read_v1_messages_region<'a>(
	prefix: &'a [u8],
	start: usize,
	length: usize,
	sb: &Superblock,
	messages: &mut Vec<RawMessage<'a>>,
	continuations: &mut Vec<Continuation>,
) -> Result<()> {
	ensure!(start + length <= prefix.len(), "v1 message region outside prefix");
	let region = &prefix[start..start + length];
	let mut pos = 0usize;
	while pos + 8 <= region.len() {
		let msg_type = u16::from_le_bytes([region[pos], region[pos + 1]]);
		let size = u16::from_le_bytes([region[pos + 2], region[pos + 3]]) as usize;
		// flags byte and 3 reserved bytes follow
		pos += 8;
		if pos + size > region.len() {
			break;
		}
		let body = &region[pos..pos + size];
		pos += size;
		collect_message(msg_type, body, sb, messages, continuations);
	}
	Ok(())
}

fn read_v2_block<'a>(
	prefix: &'a [u8],
	start: usize,
	sb: &Superblock,
	messages: &mut Vec<RawMessage<'a>>,
	continuations: &mut Vec<Continuation>,
) -> Result<u8> {
	let mut r = ValueReaderSlice::new_le(&prefix[start..]);
	r.skip(4)?; // signature, verified by the caller
	let version = r.read_u8()?;
	ensure!(version == 2, "unsupported v2 object header version {version}");
	let flags = r.read_u8()?;
	if flags & 0x20 != 0 {
		r.skip(16)?; // access/modification/change/birth times
	}
	if flags & 0x10 != 0 {
		r.skip(4)?; // max compact / min dense attribute counts
	}
	let size_width = 1usize << (flags & 0x03);
	let block_size = r.read_uint(size_width)? as usize;

	let offset = start + r.position() as usize;
	read_v2_messages_region(prefix, offset, block_size, flags, sb, messages, continuations)?;
	Ok(flags)
}

fn read_v2_continuation<'a>(
	prefix: &'a [u8],
	cont: &Continuation,
	header_flags: u8,
	sb: &Superblock,
	messages: &mut Vec<RawMessage<'a>>,
	continuations: &mut Vec<Continuation>,
) -> Result<()> {
	let start = cont.offset as usize;
	let length = cont.length as usize;
	if start + length > prefix.len() {
		bail!("continuation block at {start} outside prefix");
	}
	ensure!(prefix[start..].starts_with(OCHK_SIGNATURE), "continuation block without OCHK");
	// Signature in front, checksum behind.
	read_v2_messages_region(prefix, start + 4, length.saturating_sub(8), header_flags, sb, messages, continuations)
}

fn read_v2_messages_region<'a>(
	prefix: &'a [u8],
	start: usize,
	length: usize,
	header_flags: u8,
	sb: &Superblock,
	messages: &mut Vec<RawMessage<'a>>,
	continuations: &mut Vec<Continuation>,
) -> Result<()> {
	ensure!(start + length <= prefix.len(), "v2 message region outside prefix");
	let region = &prefix[start..start + length];
	let creation_order = header_flags & 0x04 != 0;
	let mut pos = 0usize;
	// A trailing gap smaller than one message header terminates the region.
	while pos + 4 <= region.len() {
		let msg_type = u16::from(region[pos]);
		let size = u16::from_le_bytes([region[pos + 1], region[pos + 2]]) as usize;
		pos += 4;
		if creation_order {
			pos += 2;
		}
		if pos + size > region.len() {
			break;
		}
		let body = &region[pos..pos + size];
		pos += size;
		collect_message(msg_type, body, sb, messages, continuations);
	}
	Ok(())
}

fn collect_message<'a>(
	msg_type: u16,
	body: &'a [u8],
	sb: &Superblock,
	messages: &mut Vec<RawMessage<'a>>,
	continuations: &mut Vec<Continuation>,
) {
	if msg_type == MSG_CONTINUATION {
		match parse_continuation(body, sb.offset_size, sb.length_size) {
			Ok(cont) => continuations.push(cont),
			Err(err) => log::debug!("skipping malformed continuation message: {err}"),
		}
		return;
	}
	messages.push(RawMessage { msg_type, body });
}

/// The interpreted content of one object header.
#[derive(Clone, Debug, Default)]
pub struct ObjectInfo {
	pub dataspace: Option<Dataspace>,
	pub datatype: Option<Datatype>,
	pub layout: Option<RawLayout>,
	pub filters: Vec<FilterSpec>,
	pub attributes: BTreeMap<String, AttrValue>,
	pub links: Vec<HardLink>,
	pub link_info: Option<LinkInfo>,
	pub symbol_table: Option<SymbolTable>,
}

impl ObjectInfo {
	/// True when the header describes a dataset (has space, type and layout).
	pub fn is_dataset(&self) -> bool {
		self.dataspace.is_some() && self.datatype.is_some() && self.layout.is_some()
	}

	/// True when the header describes a group.
	pub fn is_group(&self) -> bool {
		!self.is_dataset() && (!self.links.is_empty() || self.link_info.is_some() || self.symbol_table.is_some())
	}

	/// Interprets raw messages; malformed messages are skipped, never fatal.
	pub fn from_messages(messages: &[RawMessage<'_>], sb: &Superblock) -> ObjectInfo {
		let mut info = ObjectInfo::default();
		for message in messages {
			let result: Result<()> = (|| {
				match message.msg_type {
					MSG_DATASPACE => info.dataspace = Some(Dataspace::parse(message.body, sb.length_size)?),
					MSG_DATATYPE => info.datatype = Some(Datatype::parse(message.body)?),
					MSG_LAYOUT => info.layout = Some(RawLayout::parse(message.body, sb.offset_size, sb.length_size)?),
					MSG_FILTER_PIPELINE => info.filters = parse_filter_pipeline(message.body)?,
					MSG_ATTRIBUTE => {
						if let Some(attr) = parse_attribute(message.body, sb.length_size)? {
							info.attributes.insert(attr.name, attr.value);
						}
					}
					MSG_LINK => {
						if let Some(link) = parse_link(message.body, sb.offset_size)? {
							info.links.push(link);
						}
					}
					MSG_LINK_INFO => info.link_info = Some(parse_link_info(message.body, sb.offset_size)?),
					MSG_SYMBOL_TABLE => info.symbol_table = Some(parse_symbol_table(message.body, sb.offset_size)?),
					_ => {}
				}
				Ok(())
			})();
			if let Err(err) = result {
				log::debug!("skipping malformed message type {:#06x}: {err}", message.msg_type);
			}
		}
		info
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_superblock() -> Superblock {
		Superblock {
			version: 2,
			offset_size: 8,
			length_size: 8,
			base_address: 0,
			end_of_file: 1 << 20,
			root_address: 48,
		}
	}

	/// Builds a minimal v2 object header with the given (type, body) messages.
	fn v2_header(messages: &[(u16, Vec<u8>)]) -> Vec<u8> {
		let mut body = Vec::new();
		for (msg_type, msg_body) in messages {
			body.push(*msg_type as u8);
			body.extend_from_slice(&(msg_body.len() as u16).to_le_bytes());
			body.push(0); // message flags
			body.extend_from_slice(msg_body);
		}
		let mut header = Vec::new();
		header.extend_from_slice(OHDR_SIGNATURE);
		header.push(2);
		header.push(0x02); // chunk0 size stored as u32
		header.extend_from_slice(&(body.len() as u32).to_le_bytes());
		header.extend_from_slice(&body);
		header.extend_from_slice(&[0u8; 4]); // checksum (not verified)
		header
	}

	#[test]
	fn walks_v2_messages() -> Result<()> {
		let mut dataspace = vec![2u8, 1, 0, 1];
		dataspace.extend_from_slice(&100u64.to_le_bytes());
		let header = v2_header(&[(MSG_DATASPACE, dataspace)]);

		let messages = read_object_messages(&header, 0, &test_superblock())?;
		assert_eq!(messages.len(), 1);
		let info = ObjectInfo::from_messages(&messages, &test_superblock());
		assert_eq!(info.dataspace.unwrap().dims, vec![100]);
		Ok(())
	}

	#[test]
	fn walks_v1_messages() -> Result<()> {
		let mut dataspace_body = vec![2u8, 1, 0, 1];
		dataspace_body.extend_from_slice(&7u64.to_le_bytes());
		while dataspace_body.len() % 8 != 0 {
			dataspace_body.push(0);
		}

		let mut header = vec![1u8, 0];
		header.extend_from_slice(&1u16.to_le_bytes()); // message count
		header.extend_from_slice(&1u32.to_le_bytes()); // reference count
		header.extend_from_slice(&((dataspace_body.len() + 8) as u32).to_le_bytes());
		header.extend_from_slice(&[0u8; 4]); // alignment padding
		header.extend_from_slice(&MSG_DATASPACE.to_le_bytes());
		header.extend_from_slice(&(dataspace_body.len() as u16).to_le_bytes());
		header.extend_from_slice(&[0u8; 4]); // flags + reserved
		header.extend_from_slice(&dataspace_body);

		let messages = read_object_messages(&header, 0, &test_superblock())?;
		let info = ObjectInfo::from_messages(&messages, &test_superblock());
		assert_eq!(info.dataspace.unwrap().dims, vec![7]);
		Ok(())
	}

	#[test]
	fn malformed_message_does_not_poison_others() -> Result<()> {
		let mut dataspace = vec![2u8, 1, 0, 1];
		dataspace.extend_from_slice(&5u64.to_le_bytes());
		// A truncated datatype message followed by a valid dataspace.
		let header = v2_header(&[(MSG_DATATYPE, vec![0x11, 0x00]), (MSG_DATASPACE, dataspace)]);

		let messages = read_object_messages(&header, 0, &test_superblock())?;
		let info = ObjectInfo::from_messages(&messages, &test_superblock());
		assert!(info.datatype.is_none());
		assert_eq!(info.dataspace.unwrap().dims, vec![5]);
		Ok(())
	}

	#[test]
	fn header_outside_prefix_fails() {
		assert!(read_object_messages(&[0u8; 16], 64, &test_superblock()).is_err());
	}

	#[test]
	fn group_with_links_is_group() -> Result<()> {
		let mut link = vec![1u8, 0x00, 3];
		link.extend_from_slice(b"abc");
		link.extend_from_slice(&1234u64.to_le_bytes());
		let header = v2_header(&[(MSG_LINK, link)]);

		let messages = read_object_messages(&header, 0, &test_superblock())?;
		let info = ObjectInfo::from_messages(&messages, &test_superblock());
		assert!(info.is_group());
		assert!(!info.is_dataset());
		assert_eq!(info.links[0].name, "abc");
		Ok(())
	}
}
