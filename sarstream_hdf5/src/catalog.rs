//! The in-memory dataset catalog built by the metadata parser.
//!
//! Dataset identifiers are opaque catalog-local handles; hierarchical path
//! strings are a convenience layer kept alongside them, since not every
//! discovery pass can recover a path.

use std::collections::{BTreeMap, HashMap};

/// Opaque catalog-local dataset identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct DatasetId(pub u32);

/// Element type of a dataset, reduced to the set the GCOV raster path needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElementType {
	F16,
	F32,
	F64,
	I16,
	U16,
	I32,
	U32,
	U8,
	/// Fixed-length string of the given byte size.
	String(usize),
	/// Interleaved re/im pair of 32-bit floats.
	ComplexF32,
}

impl ElementType {
	/// Returns the storage size of one element in bytes.
	pub fn byte_size(&self) -> usize {
		match self {
			ElementType::U8 => 1,
			ElementType::F16 | ElementType::I16 | ElementType::U16 => 2,
			ElementType::F32 | ElementType::I32 | ElementType::U32 => 4,
			ElementType::F64 | ElementType::ComplexF32 => 8,
			ElementType::String(size) => *size,
		}
	}
}

/// Storage layout of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub enum DataLayout {
	Contiguous {
		address: u64,
		size: u64,
	},
	Chunked {
		/// Chunk shape in elements, trailing element-size dimension stripped.
		chunk_dims: Vec<u64>,
		/// Address of the chunk index (v1 B-tree root).
		index_address: u64,
		/// Layout message version the index came from (3 or 4).
		index_version: u8,
	},
	Compact {
		data: Vec<u8>,
	},
}

/// One entry of a dataset's filter pipeline, in application order.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSpec {
	pub id: FilterId,
	pub flags: u16,
	pub client_data: Vec<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterId {
	Deflate,
	Shuffle,
	Fletcher32,
	Unknown(u16),
}

impl FilterId {
	pub fn from_raw(id: u16) -> FilterId {
		match id {
			1 => FilterId::Deflate,
			2 => FilterId::Shuffle,
			3 => FilterId::Fletcher32,
			other => FilterId::Unknown(other),
		}
	}
}

/// Location of one stored chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkLocation {
	pub offset: u64,
	pub size: u64,
	pub filter_mask: u32,
}

/// Chunk-origin key: per-dimension starting element offsets, excluding the
/// trailing element-size dimension the file format carries.
pub type ChunkKey = Vec<u64>;

/// A small attribute or scalar-dataset value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
	Int(i64),
	Float(f64),
	Text(String),
	IntArray(Vec<i64>),
	FloatArray(Vec<f64>),
	TextArray(Vec<String>),
}

impl AttrValue {
	/// Returns the value as an integer when it is one.
	pub fn as_int(&self) -> Option<i64> {
		match self {
			AttrValue::Int(v) => Some(*v),
			AttrValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
			_ => None,
		}
	}

	/// Returns the value as text when it is one.
	pub fn as_text(&self) -> Option<&str> {
		match self {
			AttrValue::Text(v) => Some(v),
			_ => None,
		}
	}
}

/// The parsed description of one dataset.
#[derive(Clone, Debug)]
pub struct DatasetRecord {
	pub id: DatasetId,
	/// Hierarchical path, when a discovery pass could recover it.
	pub path: Option<String>,
	/// File address of the object header, used to deduplicate passes.
	pub header_address: u64,
	pub shape: Vec<u64>,
	pub element_type: ElementType,
	pub layout: DataLayout,
	pub filters: Vec<FilterSpec>,
	pub attributes: BTreeMap<String, AttrValue>,
	/// Chunk index; `None` until the B-tree has been parsed.
	pub chunk_index: Option<HashMap<ChunkKey, ChunkLocation>>,
}

impl DatasetRecord {
	/// Returns the chunk shape for chunked layouts.
	pub fn chunk_dims(&self) -> Option<&[u64]> {
		match &self.layout {
			DataLayout::Chunked { chunk_dims, .. } => Some(chunk_dims),
			_ => None,
		}
	}

	/// Returns the element count of one full chunk.
	pub fn chunk_element_count(&self) -> Option<u64> {
		self.chunk_dims().map(|dims| dims.iter().product())
	}

	/// Number of chunks needed to cover the logical shape.
	pub fn chunk_count(&self) -> u64 {
		match self.chunk_dims() {
			Some(dims) => self
				.shape
				.iter()
				.zip(dims.iter())
				.map(|(extent, chunk)| extent.div_ceil(*chunk))
				.product(),
			None => 0,
		}
	}

	/// True when the record has a better claim than `other` for the same
	/// object header: a parsed chunk index, or a recovered path.
	pub fn better_qualified_than(&self, other: &DatasetRecord) -> bool {
		let index = (self.chunk_index.is_some(), other.chunk_index.is_some());
		if index.0 != index.1 {
			return index.0;
		}
		self.path.is_some() && other.path.is_none()
	}
}

/// Summary row returned by `list_datasets`.
#[derive(Clone, Debug)]
pub struct DatasetSummary {
	pub id: DatasetId,
	pub path: Option<String>,
	pub shape: Vec<u64>,
	pub element_type: ElementType,
	pub chunked: bool,
	pub chunk_dims: Option<Vec<u64>>,
	pub chunk_count: u64,
}

/// The dataset catalog: immutable after parsing, shared by reference.
#[derive(Debug, Default)]
pub struct Catalog {
	records: Vec<DatasetRecord>,
	by_address: HashMap<u64, DatasetId>,
	by_path: HashMap<String, DatasetId>,
	/// Attributes of group objects, keyed by group path; used as a fallback
	/// source for identification metadata.
	group_attributes: HashMap<String, BTreeMap<String, AttrValue>>,
}

impl Catalog {
	pub fn new() -> Catalog {
		Catalog::default()
	}

	/// Inserts a record, or merges it with an existing record discovered at
	/// the same header address. A later pass never overwrites an earlier,
	/// better-qualified record, but may contribute a missing path or index.
	pub fn insert(&mut self, mut record: DatasetRecord) -> DatasetId {
		if let Some(&id) = self.by_address.get(&record.header_address) {
			let index = id.0 as usize;
			if self.records[index].better_qualified_than(&record) {
				// Still take a path the better record lacks.
				if self.records[index].path.is_none() {
					if let Some(path) = record.path.take() {
						self.by_path.insert(path.clone(), id);
						self.records[index].path = Some(path);
					}
				}
				return id;
			}
			record.id = id;
			if record.path.is_none() {
				record.path = self.records[index].path.clone();
			}
			if record.chunk_index.is_none() {
				record.chunk_index = self.records[index].chunk_index.take();
			}
			if let Some(path) = &record.path {
				self.by_path.insert(path.clone(), id);
			}
			self.records[index] = record;
			return id;
		}

		let id = DatasetId(self.records.len() as u32);
		record.id = id;
		self.by_address.insert(record.header_address, id);
		if let Some(path) = &record.path {
			self.by_path.insert(path.clone(), id);
		}
		self.records.push(record);
		id
	}

	/// Attaches a path discovered after the record itself (e.g. by the
	/// fractal-heap link pass).
	pub fn set_path(&mut self, id: DatasetId, path: String) {
		if let Some(record) = self.records.get_mut(id.0 as usize) {
			if record.path.is_none() {
				self.by_path.insert(path.clone(), id);
				record.path = Some(path);
			}
		}
	}

	/// Stores a parsed chunk index for a record.
	pub fn set_chunk_index(&mut self, id: DatasetId, index: HashMap<ChunkKey, ChunkLocation>) {
		if let Some(record) = self.records.get_mut(id.0 as usize) {
			record.chunk_index = Some(index);
		}
	}

	/// Records the attributes of a group object.
	pub fn insert_group(&mut self, path: String, attributes: BTreeMap<String, AttrValue>) {
		self.group_attributes.insert(path, attributes);
	}

	pub fn get(&self, id: DatasetId) -> Option<&DatasetRecord> {
		self.records.get(id.0 as usize)
	}

	pub fn find_by_path(&self, path: &str) -> Option<DatasetId> {
		self.by_path.get(path).copied()
	}

	pub fn find_by_address(&self, address: u64) -> Option<DatasetId> {
		self.by_address.get(&address).copied()
	}

	pub fn group_attributes(&self, path: &str) -> Option<&BTreeMap<String, AttrValue>> {
		self.group_attributes.get(path)
	}

	pub fn iter(&self) -> impl Iterator<Item = &DatasetRecord> {
		self.records.iter()
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Builds the summary listing exposed to consumers.
	pub fn summaries(&self) -> Vec<DatasetSummary> {
		self
			.records
			.iter()
			.map(|r| DatasetSummary {
				id: r.id,
				path: r.path.clone(),
				shape: r.shape.clone(),
				element_type: r.element_type,
				chunked: matches!(r.layout, DataLayout::Chunked { .. }),
				chunk_dims: r.chunk_dims().map(<[u64]>::to_vec),
				chunk_count: r.chunk_count(),
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(address: u64, path: Option<&str>, with_index: bool) -> DatasetRecord {
		DatasetRecord {
			id: DatasetId(0),
			path: path.map(str::to_owned),
			header_address: address,
			shape: vec![1024, 2048],
			element_type: ElementType::F32,
			layout: DataLayout::Chunked {
				chunk_dims: vec![512, 512],
				index_address: 9000,
				index_version: 3,
			},
			filters: vec![],
			attributes: BTreeMap::new(),
			chunk_index: with_index.then(HashMap::new),
		}
	}

	#[test]
	fn insert_assigns_sequential_ids() {
		let mut catalog = Catalog::new();
		let a = catalog.insert(record(100, Some("/a"), false));
		let b = catalog.insert(record(200, Some("/b"), false));
		assert_eq!(a, DatasetId(0));
		assert_eq!(b, DatasetId(1));
		assert_eq!(catalog.find_by_path("/b"), Some(b));
	}

	#[test]
	fn later_pass_does_not_overwrite_better_record() {
		let mut catalog = Catalog::new();
		let id = catalog.insert(record(100, Some("/a"), true));
		// Same header address, no index: must not clobber the parsed B-tree.
		let again = catalog.insert(record(100, None, false));
		assert_eq!(id, again);
		assert!(catalog.get(id).unwrap().chunk_index.is_some());
		assert_eq!(catalog.get(id).unwrap().path.as_deref(), Some("/a"));
	}

	#[test]
	fn later_pass_contributes_missing_path() {
		let mut catalog = Catalog::new();
		let id = catalog.insert(record(100, None, true));
		catalog.insert(record(100, Some("/late"), false));
		assert_eq!(catalog.get(id).unwrap().path.as_deref(), Some("/late"));
		assert_eq!(catalog.find_by_path("/late"), Some(id));
	}

	#[test]
	fn better_record_replaces_weaker_one() {
		let mut catalog = Catalog::new();
		let id = catalog.insert(record(100, None, false));
		catalog.insert(record(100, Some("/a"), true));
		let merged = catalog.get(id).unwrap();
		assert!(merged.chunk_index.is_some());
		assert_eq!(merged.path.as_deref(), Some("/a"));
	}

	#[test]
	fn chunk_count_rounds_up() {
		let r = record(1, None, false);
		// 1024/512 * 2048/512 = 2 * 4
		assert_eq!(r.chunk_count(), 8);
		assert_eq!(r.chunk_element_count(), Some(512 * 512));
	}

	#[test]
	fn element_byte_sizes() {
		assert_eq!(ElementType::F16.byte_size(), 2);
		assert_eq!(ElementType::F64.byte_size(), 8);
		assert_eq!(ElementType::ComplexF32.byte_size(), 8);
		assert_eq!(ElementType::String(12).byte_size(), 12);
	}
}
