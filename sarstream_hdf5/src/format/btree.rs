//! Version-1 B-tree parsing: the chunk index trees of chunked datasets
//! (node type 1) and the symbol-table trees of old-style groups (node type 0)
//! together with their SNOD nodes and local heaps.
//!
//! Every node is decoded completely before any child is visited, so recursion
//! never corrupts a partially-read node.

use super::Superblock;
use crate::catalog::{ChunkKey, ChunkLocation};
use anyhow::{Result, bail, ensure};
use sarstream_core::io::ValueReaderSlice;
use std::collections::HashMap;

pub const BTREE_SIGNATURE: &[u8; 4] = b"TREE";
pub const SNOD_SIGNATURE: &[u8; 4] = b"SNOD";
pub const HEAP_SIGNATURE: &[u8; 4] = b"HEAP";

/// A fully decoded v1 B-tree node of a chunk index.
#[derive(Clone, Debug)]
pub struct ChunkBtreeNode {
	pub level: u8,
	/// Leaf entries, present when `level == 0`.
	pub entries: Vec<(ChunkKey, ChunkLocation)>,
	/// Child node addresses, present when `level > 0`.
	pub children: Vec<u64>,
}

/// Decodes one chunk B-tree node from `bytes`.
///
/// `rank` is the dataset rank; keys carry `rank + 1` offsets whose trailing
/// element-dimension entry is dropped from the chunk key.
pub fn parse_chunk_btree_node(bytes: &[u8], rank: usize, offset_size: u8) -> Result<ChunkBtreeNode> {
	ensure!(bytes.starts_with(BTREE_SIGNATURE), "not a v1 B-tree node");
	let mut r = ValueReaderSlice::new_le(bytes);
	r.skip(4)?;
	let node_type = r.read_u8()?;
	ensure!(node_type == 1, "B-tree node type {node_type} is not a chunk index");
	let level = r.read_u8()?;
	let entries_used = r.read_u16()? as usize;
	ensure!(entries_used <= 65535, "implausible entry count");
	r.skip(2 * offset_size as u64)?; // left and right sibling addresses

	let mut entries = Vec::new();
	let mut children = Vec::new();

	let mut read_key = |r: &mut ValueReaderSlice<'_, byteorder::LittleEndian>| -> Result<(u32, u32, ChunkKey)> {
		let chunk_size = r.read_u32()?;
		let filter_mask = r.read_u32()?;
		let mut offsets = Vec::with_capacity(rank + 1);
		for _ in 0..=rank {
			offsets.push(r.read_u64()?);
		}
		// The final offset is along the synthetic element-size dimension.
		offsets.truncate(rank);
		Ok((chunk_size, filter_mask, offsets))
	};

	for _ in 0..entries_used {
		let (chunk_size, filter_mask, key) = read_key(&mut r)?;
		let child = r.read_uint(offset_size as usize)?;
		if level == 0 {
			entries.push((
				key,
				ChunkLocation {
					offset: child,
					size: u64::from(chunk_size),
					filter_mask,
				},
			));
		} else {
			children.push(child);
		}
	}
	// The final key after the last child carries no chunk of its own.

	Ok(ChunkBtreeNode {
		level,
		entries,
		children,
	})
}

/// Walks a chunk B-tree that lies entirely within the prefix and returns the
/// chunk index. Nodes outside the prefix fail the walk; the caller then falls
/// back to on-demand fetching.
pub fn parse_chunk_btree(
	prefix: &[u8],
	address: u64,
	rank: usize,
	sb: &Superblock,
) -> Result<HashMap<ChunkKey, ChunkLocation>> {
	let mut index = HashMap::new();
	let mut pending = vec![address];
	while let Some(node_address) = pending.pop() {
		let start = node_address as usize;
		if start >= prefix.len() {
			bail!("B-tree node at {node_address} outside prefix");
		}
		let node = parse_chunk_btree_node(&prefix[start..], rank, sb.offset_size)?;
		index.extend(node.entries);
		pending.extend(node.children);
	}
	Ok(index)
}

/// A named child of an old-style group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupEntry {
	pub name: String,
	pub address: u64,
}

/// Resolves the children of an old-style group from its symbol-table B-tree
/// (node type 0) and local heap.
pub fn parse_group_symbol_table(
	prefix: &[u8],
	btree_address: u64,
	heap_address: u64,
	sb: &Superblock,
) -> Result<Vec<GroupEntry>> {
	let heap = LocalHeap::parse(prefix, heap_address, sb)?;
	let mut entries = Vec::new();
	let mut pending = vec![btree_address];

	while let Some(node_address) = pending.pop() {
		let start = node_address as usize;
		ensure!(start < prefix.len(), "group B-tree node outside prefix");
		let bytes = &prefix[start..];

		if bytes.starts_with(SNOD_SIGNATURE) {
			entries.extend(parse_snod(bytes, &heap, prefix, sb)?);
			continue;
		}

		ensure!(bytes.starts_with(BTREE_SIGNATURE), "not a group B-tree node");
		let mut r = ValueReaderSlice::new_le(bytes);
		r.skip(4)?;
		let node_type = r.read_u8()?;
		ensure!(node_type == 0, "B-tree node type {node_type} is not a group index");
		let _level = r.read_u8()?;
		let entries_used = r.read_u16()? as usize;
		r.skip(2 * offset(sb))?; // siblings
		// key_0, child_0, key_1, ..., child_{n-1}, key_n
		r.skip(length(sb))?;
		for _ in 0..entries_used {
			pending.push(r.read_uint(sb.offset_size as usize)?);
			r.skip(length(sb))?;
		}
	}

	Ok(entries)
}

fn parse_snod(bytes: &[u8], heap: &LocalHeap, prefix: &[u8], sb: &Superblock) -> Result<Vec<GroupEntry>> {
	let mut r = ValueReaderSlice::new_le(bytes);
	r.skip(4)?;
	let version = r.read_u8()?;
	ensure!(version == 1, "unsupported SNOD version {version}");
	r.skip(1)?;
	let count = r.read_u16()? as usize;

	let mut entries = Vec::with_capacity(count);
	for _ in 0..count {
		let name_offset = r.read_uint(sb.offset_size as usize)?;
		let address = r.read_uint(sb.offset_size as usize)?;
		r.skip(4 + 4 + 16)?; // cache type, reserved, scratch pad
		if let Some(name) = heap.string_at(prefix, name_offset) {
			entries.push(GroupEntry { name, address });
		}
	}
	Ok(entries)
}

/// An old-style local heap; names of symbol-table entries live here.
struct LocalHeap {
	data_address: u64,
	data_size: u64,
}

impl LocalHeap {
	fn parse(prefix: &[u8], address: u64, sb: &Superblock) -> Result<LocalHeap> {
		let start = address as usize;
		ensure!(start < prefix.len(), "local heap outside prefix");
		let bytes = &prefix[start..];
		ensure!(bytes.starts_with(HEAP_SIGNATURE), "not a local heap");
		let mut r = ValueReaderSlice::new_le(bytes);
		r.skip(4)?;
		let version = r.read_u8()?;
		ensure!(version == 0, "unsupported local heap version {version}");
		r.skip(3)?;
		let data_size = r.read_uint(sb.length_size as usize)?;
		r.skip(length(sb))?; // free-list head offset
		let data_address = r.read_uint(sb.offset_size as usize)?;
		Ok(LocalHeap { data_address, data_size })
	}

	fn string_at(&self, prefix: &[u8], offset: u64) -> Option<String> {
		if offset >= self.data_size {
			return None;
		}
		let start = (self.data_address + offset) as usize;
		let bytes = prefix.get(start..)?;
		let end = bytes.iter().position(|&b| b == 0)?;
		Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
	}
}

fn offset(sb: &Superblock) -> u64 {
	u64::from(sb.offset_size)
}

fn length(sb: &Superblock) -> u64 {
	u64::from(sb.length_size)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn leaf_node(rank: usize, entries: &[(Vec<u64>, ChunkLocation)]) -> Vec<u8> {
		let mut buf = Vec::new();
		buf.extend_from_slice(BTREE_SIGNATURE);
		buf.push(1); // node type: chunk
		buf.push(0); // level
		buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
		buf.extend_from_slice(&u64::MAX.to_le_bytes()); // left sibling
		buf.extend_from_slice(&u64::MAX.to_le_bytes()); // right sibling
		for (key, location) in entries {
			buf.extend_from_slice(&(location.size as u32).to_le_bytes());
			buf.extend_from_slice(&location.filter_mask.to_le_bytes());
			for value in key {
				buf.extend_from_slice(&value.to_le_bytes());
			}
			buf.extend_from_slice(&0u64.to_le_bytes()); // element dimension
			buf.extend_from_slice(&location.offset.to_le_bytes());
		}
		// Final key
		buf.extend_from_slice(&0u32.to_le_bytes());
		buf.extend_from_slice(&0u32.to_le_bytes());
		for _ in 0..=rank {
			buf.extend_from_slice(&0u64.to_le_bytes());
		}
		buf
	}

	#[test]
	fn parses_leaf_entries() -> Result<()> {
		let entries = vec![
			(
				vec![0, 0],
				ChunkLocation {
					offset: 10_000,
					size: 4_000,
					filter_mask: 0,
				},
			),
			(
				vec![0, 512],
				ChunkLocation {
					offset: 14_000,
					size: 3_500,
					filter_mask: 1,
				},
			),
		];
		let bytes = leaf_node(2, &entries);
		let node = parse_chunk_btree_node(&bytes, 2, 8)?;
		assert_eq!(node.level, 0);
		assert_eq!(node.children.len(), 0);
		assert_eq!(node.entries.len(), 2);
		assert_eq!(node.entries[0].0, vec![0, 0]);
		assert_eq!(node.entries[1].0, vec![0, 512]);
		assert_eq!(node.entries[1].1.filter_mask, 1);
		Ok(())
	}

	#[test]
	fn whole_tree_from_prefix() -> Result<()> {
		let entries = vec![(
			vec![512, 0],
			ChunkLocation {
				offset: 777,
				size: 100,
				filter_mask: 0,
			},
		)];
		let mut prefix = vec![0u8; 64];
		prefix.extend_from_slice(&leaf_node(2, &entries));

		let sb = Superblock {
			version: 2,
			offset_size: 8,
			length_size: 8,
			base_address: 0,
			end_of_file: 1 << 20,
			root_address: 0,
		};
		let index = parse_chunk_btree(&prefix, 64, 2, &sb)?;
		assert_eq!(index.len(), 1);
		assert_eq!(index[&vec![512, 0]].offset, 777);
		Ok(())
	}

	#[test]
	fn node_outside_prefix_fails() {
		let sb = Superblock {
			version: 2,
			offset_size: 8,
			length_size: 8,
			base_address: 0,
			end_of_file: 1 << 20,
			root_address: 0,
		};
		assert!(parse_chunk_btree(&[0u8; 32], 1024, 2, &sb).is_err());
	}

	#[test]
	fn rejects_wrong_node_type() {
		let mut bytes = leaf_node(2, &[]);
		bytes[4] = 0; // group node type
		assert!(parse_chunk_btree_node(&bytes, 2, 8).is_err());
	}
}
