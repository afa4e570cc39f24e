//! Catalog building: superblock, root traversal and the additional discovery
//! passes that cope with files whose group structure cannot be fully resolved
//! from a metadata prefix.
//!
//! Every pass is independent and idempotent; records found twice are merged by
//! object-header address, and a later pass never downgrades an earlier,
//! better-qualified record. A malformed artifact is logged and skipped, never
//! fatal — only an invalid superblock fails the open.

use crate::catalog::{Catalog, DataLayout, DatasetId, DatasetRecord, ElementType};
use crate::format::{
	Dataspace, Datatype, FRHP_SIGNATURE, OHDR_SIGNATURE, ObjectInfo, Superblock, is_undefined, normalize_chunked_layout,
	parse_chunk_btree, parse_filter_pipeline, parse_group_symbol_table, read_object_messages, scan_fractal_heap_links,
};
use crate::{Error, Result};
use byteorder::ByteOrder;
use std::collections::HashSet;

/// Options controlling the metadata parse.
#[derive(Clone, Copy, Debug)]
pub struct MetadataOptions {
	/// Bytes fetched from the front of the file before parsing.
	pub prefetch_size: u64,
}

impl MetadataOptions {
	pub const DEFAULT_PREFETCH: u64 = 8 * 1024 * 1024;
	pub const MAX_PREFETCH: u64 = 32 * 1024 * 1024;

	/// Returns options with the given prefetch size, clamped to the
	/// supported window.
	pub fn with_prefetch_size(prefetch_size: u64) -> MetadataOptions {
		MetadataOptions {
			prefetch_size: prefetch_size.clamp(64 * 1024, Self::MAX_PREFETCH),
		}
	}
}

impl Default for MetadataOptions {
	fn default() -> Self {
		MetadataOptions {
			prefetch_size: Self::DEFAULT_PREFETCH,
		}
	}
}

/// Parses the catalog from the prefetched prefix.
pub fn parse_metadata(prefix: &[u8], file_size: u64) -> Result<(Superblock, Catalog)> {
	let sb = Superblock::parse(prefix)?;
	if sb.version > 3 {
		return Err(Error::Format(format!("unsupported superblock version {}", sb.version)));
	}

	let mut catalog = Catalog::new();
	let mut visited = HashSet::new();

	traverse_from_root(prefix, &sb, &mut catalog, &mut visited);
	scan_object_headers(prefix, &sb, &mut catalog, &mut visited);
	scan_fractal_heaps(prefix, &sb, &mut catalog, &mut visited);
	scan_layout_patterns(prefix, file_size, &sb, &mut catalog);
	parse_chunk_indexes(prefix, &sb, &mut catalog);

	log::debug!(
		"catalog built: {} datasets from {} prefix bytes",
		catalog.len(),
		prefix.len()
	);
	Ok((sb, catalog))
}

/// Pass 1: walk the group hierarchy from the root object header, following
/// compact links, old-style symbol tables and dense fractal-heap links.
fn traverse_from_root(prefix: &[u8], sb: &Superblock, catalog: &mut Catalog, visited: &mut HashSet<u64>) {
	let mut pending: Vec<(u64, String)> = vec![(sb.root_address, String::new())];

	while let Some((address, path)) = pending.pop() {
		if is_undefined(address, sb.offset_size) || !visited.insert(address) {
			continue;
		}
		let info = match parse_object(prefix, address, sb) {
			Some(info) => info,
			None => continue,
		};

		if info.is_dataset() {
			if let Some(record) = assemble_dataset(&info, address, Some(path), sb) {
				catalog.insert(record);
			}
			continue;
		}

		// Group: record attributes, then queue every resolvable child.
		catalog.insert_group(if path.is_empty() { "/".to_string() } else { path.clone() }, info.attributes.clone());

		for link in &info.links {
			pending.push((link.address, format!("{path}/{}", link.name)));
		}
		if let Some(table) = info.symbol_table {
			match parse_group_symbol_table(prefix, table.btree_address, table.heap_address, sb) {
				Ok(entries) => {
					for entry in entries {
						pending.push((entry.address, format!("{path}/{}", entry.name)));
					}
				}
				Err(err) => log::debug!("symbol table of '{path}': {err}"),
			}
		}
		if let Some(link_info) = info.link_info {
			if !is_undefined(link_info.fractal_heap_address, sb.offset_size) {
				match scan_fractal_heap_links(prefix, link_info.fractal_heap_address, sb) {
					Ok(links) => {
						for link in links {
							pending.push((link.address, format!("{path}/{}", link.name)));
						}
					}
					Err(err) => log::debug!("dense links of '{path}': {err}"),
				}
			}
		}
	}
}

/// Pass 2: scan the prefix for `OHDR` signatures and parse any valid object
/// header found, catching objects the traversal could not reach.
fn scan_object_headers(prefix: &[u8], sb: &Superblock, catalog: &mut Catalog, visited: &mut HashSet<u64>) {
	for offset in find_signatures(prefix, OHDR_SIGNATURE) {
		let address = offset as u64;
		if visited.contains(&address) {
			continue;
		}
		let info = match parse_object(prefix, address, sb) {
			Some(info) => info,
			None => continue,
		};
		visited.insert(address);
		if info.is_dataset() {
			if let Some(record) = assemble_dataset(&info, address, None, sb) {
				catalog.insert(record);
			}
		}
	}
}

/// Pass 3: scan for fractal-heap headers and recover link-shaped entries,
/// naming datasets the other passes found anonymously.
fn scan_fractal_heaps(prefix: &[u8], sb: &Superblock, catalog: &mut Catalog, visited: &mut HashSet<u64>) {
	for offset in find_signatures(prefix, FRHP_SIGNATURE) {
		let links = match scan_fractal_heap_links(prefix, offset as u64, sb) {
			Ok(links) => links,
			Err(err) => {
				log::debug!("fractal heap at {offset}: {err}");
				continue;
			}
		};
		for link in links {
			if let Some(id) = catalog.find_by_address(link.address) {
				// Heap links carry no parent context; the bare name still
				// serves the path-tail matching tiers downstream.
				catalog.set_path(id, link.name);
				continue;
			}
			if visited.insert(link.address) {
				if let Some(info) = parse_object(prefix, link.address, sb) {
					if info.is_dataset() {
						if let Some(record) = assemble_dataset(&info, link.address, Some(link.name), sb) {
							catalog.insert(record);
						}
					}
				}
			}
		}
	}
}

/// Pass 4: scan for chunked data-layout message byte patterns and synthesize
/// a dataset record when a plausible dataspace, datatype and filter pipeline
/// are found nearby and agree with it.
fn scan_layout_patterns(prefix: &[u8], file_size: u64, sb: &Superblock, catalog: &mut Catalog) {
	const WINDOW: usize = 500;

	let mut known_indexes: HashSet<u64> = catalog
		.iter()
		.filter_map(|r| match &r.layout {
			DataLayout::Chunked { index_address, .. } => Some(*index_address),
			_ => None,
		})
		.collect();

	for pos in 0..prefix.len().saturating_sub(16) {
		let candidate = match plausible_chunked_layout(&prefix[pos..], file_size, sb) {
			Some(candidate) => candidate,
			None => continue,
		};
		// Two records pointing at one chunk index are the same dataset.
		if !known_indexes.insert(candidate.index_address) {
			continue;
		}

		let window_start = pos.saturating_sub(WINDOW);
		let window_end = (pos + WINDOW).min(prefix.len());
		let window = &prefix[window_start..window_end];
		let rank = candidate.raw_dims.len() - 1;

		let Some(dataspace) = find_plausible_dataspace(window, rank, sb.length_size) else {
			continue;
		};
		let Some(datatype) = find_plausible_datatype(window, candidate.element_size()) else {
			continue;
		};
		let Some(filters) = find_plausible_filter_pipeline(window) else {
			continue;
		};

		let Some(element_type) = datatype.element_type() else {
			continue;
		};
		let (layout, element_type) =
			normalize_chunked_layout(&candidate.raw_dims, candidate.index_address, 3, rank, element_type);

		log::debug!(
			"synthesized dataset from layout pattern at {pos}: shape {:?}, index at {}",
			dataspace.dims,
			candidate.index_address
		);
		catalog.insert(DatasetRecord {
			id: DatasetId(0),
			path: None,
			// The pattern position stands in for the unknown header address.
			header_address: pos as u64,
			shape: dataspace.dims,
			element_type,
			layout,
			filters,
			attributes: std::collections::BTreeMap::new(),
			chunk_index: None,
		});
	}
}

/// Pass 5: parse the v1 chunk B-tree of every chunked dataset whose index
/// root lies within the prefix.
fn parse_chunk_indexes(prefix: &[u8], sb: &Superblock, catalog: &mut Catalog) {
	let pending: Vec<(DatasetId, u64, usize)> = catalog
		.iter()
		.filter(|r| r.chunk_index.is_none())
		.filter_map(|r| match &r.layout {
			DataLayout::Chunked {
				index_address,
				index_version: 3,
				..
			} if (*index_address as usize) < prefix.len() => Some((r.id, *index_address, r.shape.len())),
			_ => None,
		})
		.collect();

	for (id, index_address, rank) in pending {
		match parse_chunk_btree(prefix, index_address, rank, sb) {
			Ok(index) => catalog.set_chunk_index(id, index),
			Err(err) => log::debug!("chunk B-tree of dataset {id:?} at {index_address}: {err}"),
		}
	}
}

fn parse_object(prefix: &[u8], address: u64, sb: &Superblock) -> Option<ObjectInfo> {
	match read_object_messages(prefix, address, sb) {
		Ok(messages) => Some(ObjectInfo::from_messages(&messages, sb)),
		Err(err) => {
			log::debug!("object header at {address}: {err}");
			None
		}
	}
}

fn assemble_dataset(info: &ObjectInfo, address: u64, path: Option<String>, _sb: &Superblock) -> Option<DatasetRecord> {
	let dataspace = info.dataspace.as_ref()?;
	let datatype = info.datatype.as_ref()?;
	let raw_layout = info.layout.as_ref()?;

	let Some(element_type) = datatype.element_type() else {
		log::debug!("dataset at {address} has unsupported datatype {datatype:?}");
		return None;
	};

	let (layout, element_type) = match raw_layout {
		crate::format::RawLayout::Compact { data } => (DataLayout::Compact { data: data.clone() }, element_type),
		crate::format::RawLayout::Contiguous { address, size } => (
			DataLayout::Contiguous {
				address: *address,
				size: *size,
			},
			element_type,
		),
		crate::format::RawLayout::Chunked {
			raw_dims,
			index_address,
			version,
		} => normalize_chunked_layout(raw_dims, *index_address, *version, dataspace.dims.len(), element_type),
	};

	Some(DatasetRecord {
		id: DatasetId(0),
		path,
		header_address: address,
		shape: dataspace.dims.clone(),
		element_type,
		layout,
		filters: info.filters.clone(),
		attributes: info.attributes.clone(),
		chunk_index: None,
	})
}

/// A chunked layout-message candidate found by the byte-pattern scan.
struct LayoutCandidate {
	raw_dims: Vec<u64>,
	index_address: u64,
}

impl LayoutCandidate {
	fn element_size(&self) -> u64 {
		*self.raw_dims.last().unwrap()
	}
}

fn plausible_chunked_layout(bytes: &[u8], file_size: u64, sb: &Superblock) -> Option<LayoutCandidate> {
	// Version 3, class chunked, plausible rank.
	if bytes.len() < 3 || bytes[0] != 3 || bytes[1] != 2 {
		return None;
	}
	let dimensionality = bytes[2] as usize;
	if !(2..=4).contains(&dimensionality) {
		return None;
	}
	let o = sb.offset_size as usize;
	if bytes.len() < 3 + o + dimensionality * 4 {
		return None;
	}
	let index_address = byteorder::LittleEndian::read_uint(&bytes[3..3 + o], o);
	if index_address == 0 || index_address >= file_size {
		return None;
	}
	let mut raw_dims = Vec::with_capacity(dimensionality);
	for i in 0..dimensionality {
		let start = 3 + o + i * 4;
		raw_dims.push(u64::from(byteorder::LittleEndian::read_u32(
			&bytes[start..start + 4],
		)));
	}
	// Chunk extents must be plausible; the trailing dim is the element size.
	if raw_dims[..dimensionality - 1]
		.iter()
		.any(|&d| d == 0 || d > 1 << 20)
	{
		return None;
	}
	if !matches!(raw_dims[dimensionality - 1], 1 | 2 | 4 | 8) {
		return None;
	}
	Some(LayoutCandidate { raw_dims, index_address })
}

fn find_plausible_dataspace(window: &[u8], rank: usize, length_size: u8) -> Option<Dataspace> {
	for pos in 0..window.len() {
		let bytes = &window[pos..];
		if bytes.len() < 4 || !matches!(bytes[0], 1 | 2) || bytes[1] as usize != rank {
			continue;
		}
		if let Ok(dataspace) = Dataspace::parse(bytes, length_size) {
			if dataspace.dims.len() == rank && dataspace.dims.iter().all(|&d| d > 0 && d < 1 << 32) {
				return Some(dataspace);
			}
		}
	}
	None
}

fn find_plausible_datatype(window: &[u8], element_size: u64) -> Option<Datatype> {
	for pos in 0..window.len() {
		let bytes = &window[pos..];
		if bytes.len() < 8 {
			continue;
		}
		let class = bytes[0] & 0x0F;
		let version = bytes[0] >> 4;
		if !(1..=3).contains(&version) || !matches!(class, 0 | 1 | 6) {
			continue;
		}
		if let Ok(datatype) = Datatype::parse(bytes) {
			if u64::from(datatype.size) == element_size && datatype.element_type().is_some() {
				return Some(datatype);
			}
		}
	}
	None
}

fn find_plausible_filter_pipeline(window: &[u8]) -> Option<Vec<crate::catalog::FilterSpec>> {
	for pos in 0..window.len() {
		let bytes = &window[pos..];
		if bytes.len() < 8 || !matches!(bytes[0], 1 | 2) {
			continue;
		}
		let nfilters = bytes[1];
		if nfilters == 0 || nfilters > 4 {
			continue;
		}
		if let Ok(filters) = parse_filter_pipeline(bytes) {
			if !filters.is_empty()
				&& filters
					.iter()
					.all(|f| !matches!(f.id, crate::catalog::FilterId::Unknown(_)))
			{
				return Some(filters);
			}
		}
	}
	None
}

/// Returns every offset at which `needle` occurs in `haystack`.
fn find_signatures(haystack: &[u8], needle: &[u8; 4]) -> Vec<usize> {
	if haystack.len() < 4 {
		return Vec::new();
	}
	let mut positions = Vec::new();
	let first = needle[0];
	let mut pos = 0;
	while pos + 4 <= haystack.len() {
		if haystack[pos] == first && &haystack[pos..pos + 4] == needle {
			positions.push(pos);
			pos += 4;
		} else {
			pos += 1;
		}
	}
	positions
}
