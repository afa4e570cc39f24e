//! Synthesizes small HDF5 files in memory for tests: version-2 superblock,
//! compact-link groups, chunked datasets with shuffle/deflate/fletcher32
//! pipelines and v1 chunk B-trees.
//!
//! Images follow the paged-aggregation premise the parser targets: all object
//! headers, groups and (by default) chunk B-trees live in a metadata section
//! at the front of the file, with chunk and array data in a separate data
//! section behind it. This is test tooling, not a public write API.

use crate::filters::{deflate, fletcher32, shuffle};
use sarstream_core::Blob;

const SUPERBLOCK_SIZE: usize = 48;

/// Filter pipeline applied to synthesized chunks, in application order
/// shuffle → deflate → fletcher32.
#[derive(Clone, Copy, Debug, Default)]
pub struct TestFilters {
	pub shuffle: bool,
	pub deflate_level: Option<u32>,
	pub fletcher32: bool,
}

impl TestFilters {
	pub fn shuffled_deflate() -> TestFilters {
		TestFilters {
			shuffle: true,
			deflate_level: Some(6),
			fletcher32: false,
		}
	}

	pub fn deflate_only() -> TestFilters {
		TestFilters {
			shuffle: false,
			deflate_level: Some(6),
			fletcher32: false,
		}
	}

	fn is_empty(&self) -> bool {
		!self.shuffle && self.deflate_level.is_none() && !self.fletcher32
	}
}

/// An attribute value to attach to a synthesized object.
#[derive(Clone, Debug)]
pub enum TestAttr {
	Int(i32),
	Float(f64),
	Text(String),
}

/// Incrementally builds an HDF5 file image with a front metadata section.
pub struct TestFileBuilder {
	meta: Vec<u8>,
	data: Vec<u8>,
	data_base: u64,
	/// When set, chunk B-trees land in the data section, beyond any small
	/// metadata prefetch; exercises the on-demand index fetch.
	pub btrees_in_data_section: bool,
}

impl TestFileBuilder {
	pub fn new() -> TestFileBuilder {
		Self::with_data_base(512 * 1024)
	}

	/// `data_base` is the file offset where the data section starts; the
	/// metadata section must fit below it.
	pub fn with_data_base(data_base: u64) -> TestFileBuilder {
		TestFileBuilder {
			meta: vec![0u8; SUPERBLOCK_SIZE],
			data: Vec::new(),
			data_base,
			btrees_in_data_section: false,
		}
	}

	fn append_meta(&mut self, bytes: &[u8]) -> u64 {
		let address = self.meta.len() as u64;
		self.meta.extend_from_slice(bytes);
		address
	}

	fn append_data(&mut self, bytes: &[u8]) -> u64 {
		let address = self.data_base + self.data.len() as u64;
		self.data.extend_from_slice(bytes);
		address
	}

	fn append_btree(&mut self, bytes: &[u8]) -> u64 {
		if self.btrees_in_data_section {
			self.append_data(bytes)
		} else {
			self.append_meta(bytes)
		}
	}

	/// Adds a chunked 2-D f32 dataset. `value` maps `(row, col)` to the
	/// stored sample; chunk origins listed in `sparse` are left out of the
	/// B-tree. Returns the dataset object header address.
	pub fn add_chunked_f32(
		&mut self,
		shape: (u64, u64),
		chunk: (u64, u64),
		filters: TestFilters,
		sparse: &[(u64, u64)],
		value: impl Fn(u64, u64) -> f32,
	) -> u64 {
		let encode = |row0: u64, col0: u64| -> Vec<u8> {
			let mut raw = Vec::with_capacity((chunk.0 * chunk.1 * 4) as usize);
			for r in row0..row0 + chunk.0 {
				for c in col0..col0 + chunk.1 {
					let sample = if r < shape.0 && c < shape.1 { value(r, c) } else { 0.0 };
					raw.extend_from_slice(&sample.to_le_bytes());
				}
			}
			raw
		};
		self.add_chunked_dataset(shape, chunk, 4, datatype_f32(), filters, sparse, encode)
	}

	/// Adds a chunked 2-D u8 dataset (mask convention).
	pub fn add_chunked_u8(
		&mut self,
		shape: (u64, u64),
		chunk: (u64, u64),
		filters: TestFilters,
		value: impl Fn(u64, u64) -> u8,
	) -> u64 {
		let encode = |row0: u64, col0: u64| -> Vec<u8> {
			let mut raw = Vec::with_capacity((chunk.0 * chunk.1) as usize);
			for r in row0..row0 + chunk.0 {
				for c in col0..col0 + chunk.1 {
					raw.push(if r < shape.0 && c < shape.1 { value(r, c) } else { 0 });
				}
			}
			raw
		};
		self.add_chunked_dataset(shape, chunk, 1, datatype_fixed(1, false), filters, &[], encode)
	}

	/// Adds a chunked 1-D f64 dataset (chunked coordinate-array convention).
	pub fn add_chunked_f64_1d(&mut self, values: &[f64], chunk_length: u64, filters: TestFilters) -> u64 {
		let length = values.len() as u64;

		let mut chunks = Vec::new();
		let mut origin = 0u64;
		while origin < length {
			let mut raw = Vec::with_capacity((chunk_length * 8) as usize);
			for i in origin..origin + chunk_length {
				let sample = values.get(i as usize).copied().unwrap_or(0.0);
				raw.extend_from_slice(&sample.to_le_bytes());
			}
			let encoded = apply_test_filters(&raw, 8, filters);
			let offset = self.append_data(&encoded);
			chunks.push((vec![origin], offset, encoded.len() as u64));
			origin += chunk_length;
		}
		let btree_address = self.write_btree_leaf(1, &chunks);
		let messages = dataset_messages(
			&[length],
			datatype_f64(),
			&layout_chunked(btree_address, &[chunk_length], 8),
			filters,
			8,
			&[],
		);
		let header = object_header(&messages);
		self.append_meta(&header)
	}

	fn add_chunked_dataset(
		&mut self,
		shape: (u64, u64),
		chunk: (u64, u64),
		element_size: u32,
		datatype: Vec<u8>,
		filters: TestFilters,
		sparse: &[(u64, u64)],
		encode: impl Fn(u64, u64) -> Vec<u8>,
	) -> u64 {
		let mut chunks = Vec::new();
		let mut row0 = 0u64;
		while row0 < shape.0 {
			let mut col0 = 0u64;
			while col0 < shape.1 {
				if !sparse.contains(&(row0, col0)) {
					let encoded = apply_test_filters(&encode(row0, col0), element_size as usize, filters);
					let offset = self.append_data(&encoded);
					chunks.push((vec![row0, col0], offset, encoded.len() as u64));
				}
				col0 += chunk.1;
			}
			row0 += chunk.0;
		}

		let btree_address = self.write_btree(2, &chunks);
		let messages = dataset_messages(
			&[shape.0, shape.1],
			datatype,
			&layout_chunked(btree_address, &[chunk.0, chunk.1], element_size),
			filters,
			element_size,
			&[],
		);
		let header = object_header(&messages);
		self.append_meta(&header)
	}

	/// Adds a contiguous 1-D f64 dataset.
	pub fn add_contiguous_f64(&mut self, values: &[f64]) -> u64 {
		let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
		let address = self.append_data(&data);
		let messages = vec![
			(0x0001, dataspace(&[values.len() as u64])),
			(0x0003, datatype_f64()),
			(0x0008, layout_contiguous(address, data.len() as u64)),
		];
		let header = object_header(&messages);
		self.append_meta(&header)
	}

	/// Adds a scalar dataset holding one i32 (projection convention),
	/// with optional attributes.
	pub fn add_scalar_i32(&mut self, value: i32, attrs: &[(&str, TestAttr)]) -> u64 {
		let address = self.append_data(&value.to_le_bytes());
		let mut messages = vec![
			(0x0001, dataspace(&[])),
			(0x0003, datatype_fixed(4, true)),
			(0x0008, layout_contiguous(address, 4)),
		];
		for (name, attr) in attrs {
			messages.push((0x000C, attribute_message(name, attr)));
		}
		let header = object_header(&messages);
		self.append_meta(&header)
	}

	/// Adds a scalar dataset holding one f64.
	pub fn add_scalar_f64(&mut self, value: f64) -> u64 {
		let address = self.append_data(&value.to_le_bytes());
		let messages = vec![
			(0x0001, dataspace(&[])),
			(0x0003, datatype_f64()),
			(0x0008, layout_contiguous(address, 8)),
		];
		let header = object_header(&messages);
		self.append_meta(&header)
	}

	/// Adds a scalar fixed-length string dataset.
	pub fn add_scalar_string(&mut self, text: &str) -> u64 {
		let mut data = text.as_bytes().to_vec();
		data.push(0);
		let address = self.append_data(&data);
		let messages = vec![
			(0x0001, dataspace(&[])),
			(0x0003, datatype_string(data.len() as u32)),
			(0x0008, layout_contiguous(address, data.len() as u64)),
		];
		let header = object_header(&messages);
		self.append_meta(&header)
	}

	/// Adds a 1-D array of fixed-length strings (covariance-term lists).
	pub fn add_string_array(&mut self, texts: &[&str]) -> u64 {
		let width = texts.iter().map(|t| t.len() + 1).max().unwrap_or(1).next_multiple_of(4);
		let mut data = Vec::with_capacity(texts.len() * width);
		for text in texts {
			let mut field = text.as_bytes().to_vec();
			field.resize(width, 0);
			data.extend_from_slice(&field);
		}
		let address = self.append_data(&data);
		let messages = vec![
			(0x0001, dataspace(&[texts.len() as u64])),
			(0x0003, datatype_string(width as u32)),
			(0x0008, layout_contiguous(address, data.len() as u64)),
		];
		let header = object_header(&messages);
		self.append_meta(&header)
	}

	/// Adds a group whose children are the given `(name, address)` links,
	/// with optional attributes. Returns the group header address.
	pub fn add_group(&mut self, links: &[(&str, u64)], attrs: &[(&str, TestAttr)]) -> u64 {
		let mut messages: Vec<(u16, Vec<u8>)> = Vec::new();
		for (name, address) in links {
			messages.push((0x0006, link_message(name, *address)));
		}
		for (name, value) in attrs {
			messages.push((0x000C, attribute_message(name, value)));
		}
		let header = object_header(&messages);
		self.append_meta(&header)
	}

	/// Writes the chunk index, splitting into two leaves under an internal
	/// node when there are enough chunks to make the recursion meaningful.
	fn write_btree(&mut self, rank: usize, chunks: &[(Vec<u64>, u64, u64)]) -> u64 {
		if chunks.len() >= 8 {
			let middle = chunks.len() / 2;
			let left = self.write_btree_leaf(rank, &chunks[..middle]);
			let right = self.write_btree_leaf(rank, &chunks[middle..]);
			self.write_btree_internal(rank, &[(chunks[0].0.clone(), left), (chunks[middle].0.clone(), right)])
		} else {
			self.write_btree_leaf(rank, chunks)
		}
	}

	fn write_btree_leaf(&mut self, rank: usize, chunks: &[(Vec<u64>, u64, u64)]) -> u64 {
		let mut node = Vec::new();
		node.extend_from_slice(b"TREE");
		node.push(1); // node type: chunked raw data
		node.push(0); // leaf level
		node.extend_from_slice(&(chunks.len() as u16).to_le_bytes());
		node.extend_from_slice(&u64::MAX.to_le_bytes());
		node.extend_from_slice(&u64::MAX.to_le_bytes());
		for (key, offset, size) in chunks {
			node.extend_from_slice(&(*size as u32).to_le_bytes());
			node.extend_from_slice(&0u32.to_le_bytes()); // filter mask
			for value in key {
				node.extend_from_slice(&value.to_le_bytes());
			}
			node.extend_from_slice(&0u64.to_le_bytes()); // element dimension
			node.extend_from_slice(&offset.to_le_bytes());
		}
		// Closing key
		node.extend_from_slice(&0u32.to_le_bytes());
		node.extend_from_slice(&0u32.to_le_bytes());
		for _ in 0..=rank {
			node.extend_from_slice(&0u64.to_le_bytes());
		}
		self.append_btree(&node)
	}

	fn write_btree_internal(&mut self, rank: usize, children: &[(Vec<u64>, u64)]) -> u64 {
		let mut node = Vec::new();
		node.extend_from_slice(b"TREE");
		node.push(1);
		node.push(1); // one level above the leaves
		node.extend_from_slice(&(children.len() as u16).to_le_bytes());
		node.extend_from_slice(&u64::MAX.to_le_bytes());
		node.extend_from_slice(&u64::MAX.to_le_bytes());
		for (key, address) in children {
			node.extend_from_slice(&0u32.to_le_bytes());
			node.extend_from_slice(&0u32.to_le_bytes());
			for value in key {
				node.extend_from_slice(&value.to_le_bytes());
			}
			node.extend_from_slice(&0u64.to_le_bytes());
			node.extend_from_slice(&address.to_le_bytes());
		}
		node.extend_from_slice(&0u32.to_le_bytes());
		node.extend_from_slice(&0u32.to_le_bytes());
		for _ in 0..=rank {
			node.extend_from_slice(&0u64.to_le_bytes());
		}
		self.append_btree(&node)
	}

	/// Finalizes the image: pads the metadata section to the data base and
	/// writes the superblock pointing at `root_address`.
	///
	/// # Panics
	/// Panics when the metadata section overflows the data base.
	pub fn finish(mut self, root_address: u64) -> Blob {
		assert!(
			self.meta.len() as u64 <= self.data_base,
			"metadata section of {} bytes overflows data base {}",
			self.meta.len(),
			self.data_base
		);
		self.meta.resize(self.data_base as usize, 0);
		let end_of_file = self.data_base + self.data.len() as u64;

		let mut sb = Vec::with_capacity(SUPERBLOCK_SIZE);
		sb.extend_from_slice(b"\x89HDF\r\n\x1a\n");
		sb.push(2); // superblock version
		sb.push(8); // offset size
		sb.push(8); // length size
		sb.push(0); // file consistency flags
		sb.extend_from_slice(&0u64.to_le_bytes()); // base address
		sb.extend_from_slice(&u64::MAX.to_le_bytes()); // superblock extension
		sb.extend_from_slice(&end_of_file.to_le_bytes());
		sb.extend_from_slice(&root_address.to_le_bytes());
		sb.extend_from_slice(&[0u8; 4]); // checksum, not verified by the parser
		self.meta[..SUPERBLOCK_SIZE].copy_from_slice(&sb);

		let mut file = self.meta;
		file.extend_from_slice(&self.data);
		Blob::from(file)
	}
}

impl Default for TestFileBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn apply_test_filters(raw: &[u8], element_size: usize, filters: TestFilters) -> Vec<u8> {
	let mut data = raw.to_vec();
	if filters.shuffle {
		data = shuffle(&data, element_size);
	}
	if let Some(level) = filters.deflate_level {
		data = deflate(&data, level);
	}
	if filters.fletcher32 {
		let checksum = fletcher32(&data);
		data.extend_from_slice(&checksum.to_le_bytes());
	}
	data
}

fn dataset_messages(
	shape: &[u64],
	datatype: Vec<u8>,
	layout: &[u8],
	filters: TestFilters,
	element_size: u32,
	attrs: &[(&str, TestAttr)],
) -> Vec<(u16, Vec<u8>)> {
	let mut messages = vec![
		(0x0001, dataspace(shape)),
		(0x0003, datatype),
		(0x0008, layout.to_vec()),
	];
	if !filters.is_empty() {
		messages.push((0x000B, filter_pipeline_v1(filters, element_size)));
	}
	for (name, value) in attrs {
		messages.push((0x000C, attribute_message(name, value)));
	}
	messages
}

/// Serializes a v2 object header around the given `(type, body)` messages.
fn object_header(messages: &[(u16, Vec<u8>)]) -> Vec<u8> {
	let mut body = Vec::new();
	for (msg_type, msg_body) in messages {
		body.push(*msg_type as u8);
		body.extend_from_slice(&(msg_body.len() as u16).to_le_bytes());
		body.push(0); // message flags
		body.extend_from_slice(msg_body);
	}
	let mut header = Vec::new();
	header.extend_from_slice(b"OHDR");
	header.push(2);
	header.push(0x02); // chunk-0 size stored as u32
	header.extend_from_slice(&(body.len() as u32).to_le_bytes());
	header.extend_from_slice(&body);
	header.extend_from_slice(&[0u8; 4]); // checksum, not verified
	header
}

fn dataspace(dims: &[u64]) -> Vec<u8> {
	let mut body = vec![2u8, dims.len() as u8, 0, if dims.is_empty() { 0 } else { 1 }];
	for dim in dims {
		body.extend_from_slice(&dim.to_le_bytes());
	}
	body
}

fn datatype_f32() -> Vec<u8> {
	let mut body = vec![0x11, 0x20, 0x1F, 0x00];
	body.extend_from_slice(&4u32.to_le_bytes());
	body.extend_from_slice(&0u16.to_le_bytes()); // bit offset
	body.extend_from_slice(&32u16.to_le_bytes()); // precision
	body.extend_from_slice(&[23, 8, 0, 23]); // exponent/mantissa layout
	body.extend_from_slice(&127u32.to_le_bytes()); // exponent bias
	body
}

fn datatype_f64() -> Vec<u8> {
	let mut body = vec![0x11, 0x20, 0x3F, 0x00];
	body.extend_from_slice(&8u32.to_le_bytes());
	body.extend_from_slice(&0u16.to_le_bytes());
	body.extend_from_slice(&64u16.to_le_bytes());
	body.extend_from_slice(&[52, 11, 0, 52]);
	body.extend_from_slice(&1023u32.to_le_bytes());
	body
}

fn datatype_fixed(size: u32, signed: bool) -> Vec<u8> {
	let mut body = vec![0x10, if signed { 0x08 } else { 0x00 }, 0x00, 0x00];
	body.extend_from_slice(&size.to_le_bytes());
	body.extend_from_slice(&0u16.to_le_bytes());
	body.extend_from_slice(&((size * 8) as u16).to_le_bytes());
	body
}

fn datatype_string(size: u32) -> Vec<u8> {
	let mut body = vec![0x13, 0x00, 0x00, 0x00];
	body.extend_from_slice(&size.to_le_bytes());
	body
}

fn layout_contiguous(address: u64, size: u64) -> Vec<u8> {
	let mut body = vec![3u8, 1];
	body.extend_from_slice(&address.to_le_bytes());
	body.extend_from_slice(&size.to_le_bytes());
	body
}

fn layout_chunked(btree_address: u64, chunk_dims: &[u64], element_size: u32) -> Vec<u8> {
	let mut body = vec![3u8, 2, (chunk_dims.len() + 1) as u8];
	body.extend_from_slice(&btree_address.to_le_bytes());
	for dim in chunk_dims {
		body.extend_from_slice(&(*dim as u32).to_le_bytes());
	}
	body.extend_from_slice(&element_size.to_le_bytes());
	body
}

fn filter_pipeline_v1(filters: TestFilters, element_size: u32) -> Vec<u8> {
	let mut entries: Vec<(u16, Vec<u32>)> = Vec::new();
	if filters.shuffle {
		entries.push((2, vec![element_size]));
	}
	if let Some(level) = filters.deflate_level {
		entries.push((1, vec![level]));
	}
	if filters.fletcher32 {
		entries.push((3, vec![]));
	}

	let mut body = vec![1u8, entries.len() as u8, 0, 0, 0, 0, 0, 0];
	for (id, client_data) in entries {
		body.extend_from_slice(&id.to_le_bytes());
		body.extend_from_slice(&0u16.to_le_bytes()); // no name
		body.extend_from_slice(&0u16.to_le_bytes()); // flags
		body.extend_from_slice(&(client_data.len() as u16).to_le_bytes());
		for value in &client_data {
			body.extend_from_slice(&value.to_le_bytes());
		}
		if client_data.len() % 2 == 1 {
			body.extend_from_slice(&0u32.to_le_bytes());
		}
	}
	body
}

fn link_message(name: &str, address: u64) -> Vec<u8> {
	let mut body = vec![1u8, 0x00, name.len() as u8];
	body.extend_from_slice(name.as_bytes());
	body.extend_from_slice(&address.to_le_bytes());
	body
}

fn attribute_message(name: &str, value: &TestAttr) -> Vec<u8> {
	let mut name_bytes = name.as_bytes().to_vec();
	name_bytes.push(0);

	let (datatype, data): (Vec<u8>, Vec<u8>) = match value {
		TestAttr::Int(v) => (datatype_fixed(4, true), v.to_le_bytes().to_vec()),
		TestAttr::Float(v) => (datatype_f64(), v.to_le_bytes().to_vec()),
		TestAttr::Text(v) => {
			let mut bytes = v.as_bytes().to_vec();
			bytes.push(0);
			(datatype_string(bytes.len() as u32), bytes)
		}
	};
	let space = dataspace(&[]);

	let mut body = vec![3u8, 0];
	body.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
	body.extend_from_slice(&(datatype.len() as u16).to_le_bytes());
	body.extend_from_slice(&(space.len() as u16).to_le_bytes());
	body.push(0); // charset
	body.extend_from_slice(&name_bytes);
	body.extend_from_slice(&datatype);
	body.extend_from_slice(&space);
	body.extend_from_slice(&data);
	body
}

/// How the sample GCOV file exposes its projection, for the fallback tests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProjectionStyle {
	/// A scalar `projection` dataset holding the EPSG code.
	Dataset,
	/// An `epsg_code` attribute on the projection dataset.
	Attribute,
	/// A WKT `spatial_ref` attribute.
	Wkt,
	/// A `utm_zone_number` attribute, hemisphere inferred from the bounds.
	UtmZone,
	/// Nothing; resolution falls back to EPSG:4326.
	None,
}

/// Options for the NISAR-GCOV-shaped sample file.
#[derive(Clone, Debug)]
pub struct GcovFileOptions {
	pub shape: (u64, u64),
	pub chunk: (u64, u64),
	pub terms: Vec<&'static str>,
	pub include_mask: bool,
	pub include_coordinates: bool,
	pub include_spacing_datasets: bool,
	pub projection: ProjectionStyle,
	pub epsg: i32,
	/// World coordinate of the top-left pixel center.
	pub origin: (f64, f64),
	/// Pixel spacing in world units; y decreases with increasing row.
	pub spacing: (f64, f64),
	/// Chunk origins left sparse in every term dataset.
	pub sparse: Vec<(u64, u64)>,
	/// Put chunk B-trees in the data section, beyond a small prefetch.
	pub btrees_beyond_prefix: bool,
}

impl Default for GcovFileOptions {
	fn default() -> Self {
		GcovFileOptions {
			shape: (512, 512),
			chunk: (128, 128),
			terms: vec!["HHHH", "HVHV", "VHVH", "VVVV"],
			include_mask: true,
			include_coordinates: true,
			include_spacing_datasets: true,
			projection: ProjectionStyle::Dataset,
			epsg: 32611,
			origin: (500_000.0, 4_100_000.0),
			spacing: (20.0, 20.0),
			sparse: vec![],
			btrees_beyond_prefix: false,
		}
	}
}

/// Deterministic speckle-like power sample for `(term, row, col)`.
///
/// Multiplies a smooth scene brightness with exponential speckle so that
/// multi-look averaging measurably reduces variance. Co-pol (term 0) is
/// several dB brighter than the other terms.
pub fn speckle_power(term_index: u64, row: u64, col: u64) -> f32 {
	let mut state = row
		.wrapping_mul(6_364_136_223_846_793_005)
		.wrapping_add(col.wrapping_mul(1_442_695_040_888_963_407))
		.wrapping_add(term_index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
	state ^= state >> 33;
	state = state.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
	state ^= state >> 33;
	let uniform = (state >> 11) as f32 / (1u64 << 53) as f32;

	let scene = 0.05 + 0.03 * ((row as f32 / 37.0).sin() + (col as f32 / 53.0).cos() + 2.0);
	let speckle = -(1.0 - uniform.min(0.999_999)).ln();
	// Co-pol sits ~4 dB above the other terms, comfortably past the 3 dB
	// decision margin of the power-ranking classifier.
	let pol_gain = if term_index == 0 { 2.5 } else { 1.0 };
	scene * speckle * pol_gain
}

/// Mask convention used by the sample file: a fill border, a sliver of
/// invalid rows, valid categories 1 to 5 inside.
pub fn sample_mask_value(row: u64, col: u64) -> u8 {
	if row < 2 || col < 2 {
		255
	} else if row < 4 {
		0
	} else {
		1 + ((row + col) % 5) as u8
	}
}

/// Builds a NISAR GCOV shaped file and returns the image.
pub fn build_gcov_file(options: &GcovFileOptions) -> Blob {
	let mut b = TestFileBuilder::new();
	b.btrees_in_data_section = options.btrees_beyond_prefix;
	let (rows, cols) = options.shape;

	// Covariance term rasters.
	let mut frequency_links: Vec<(String, u64)> = Vec::new();
	for (index, term) in options.terms.iter().enumerate() {
		let address = b.add_chunked_f32(
			options.shape,
			options.chunk,
			TestFilters::shuffled_deflate(),
			&options.sparse,
			move |r, c| speckle_power(index as u64, r, c),
		);
		frequency_links.push(((*term).to_string(), address));
	}

	let term_list = b.add_string_array(&options.terms);
	frequency_links.push(("listOfCovarianceTerms".to_string(), term_list));

	if options.include_coordinates {
		let x_coords: Vec<f64> = (0..cols).map(|i| options.origin.0 + i as f64 * options.spacing.0).collect();
		let y_coords: Vec<f64> = (0..rows).map(|i| options.origin.1 - i as f64 * options.spacing.1).collect();
		let x = b.add_contiguous_f64(&x_coords);
		let y = b.add_contiguous_f64(&y_coords);
		frequency_links.push(("xCoordinates".to_string(), x));
		frequency_links.push(("yCoordinates".to_string(), y));
	}
	if options.include_spacing_datasets {
		let dx = b.add_scalar_f64(options.spacing.0);
		let dy = b.add_scalar_f64(-options.spacing.1);
		frequency_links.push(("xCoordinateSpacing".to_string(), dx));
		frequency_links.push(("yCoordinateSpacing".to_string(), dy));
	}

	let projection_attrs: Vec<(&str, TestAttr)> = match options.projection {
		ProjectionStyle::Dataset | ProjectionStyle::None => vec![],
		ProjectionStyle::Attribute => vec![("epsg_code", TestAttr::Int(options.epsg))],
		ProjectionStyle::Wkt => vec![(
			"spatial_ref",
			TestAttr::Text(format!(
				"PROJCS[\"WGS 84 / UTM\",GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\"]],AUTHORITY[\"EPSG\",\"{}\"]]",
				options.epsg
			)),
		)],
		ProjectionStyle::UtmZone => vec![("utm_zone_number", TestAttr::Int(options.epsg % 100))],
	};
	if options.projection != ProjectionStyle::None {
		let value = if options.projection == ProjectionStyle::Dataset {
			options.epsg
		} else {
			// The scalar itself is useless; resolution must use the attributes.
			0
		};
		let projection = b.add_scalar_i32(value, &projection_attrs);
		frequency_links.push(("projection".to_string(), projection));
	}

	if options.include_mask {
		let mask = b.add_chunked_u8(options.shape, options.chunk, TestFilters::deflate_only(), sample_mask_value);
		frequency_links.push(("mask".to_string(), mask));
	}

	let frequency_refs: Vec<(&str, u64)> = frequency_links.iter().map(|(n, a)| (n.as_str(), *a)).collect();
	let frequency_a = b.add_group(&frequency_refs, &[]);

	// Identification datasets.
	let frequencies = b.add_string_array(&["A"]);
	let mission = b.add_scalar_string("NISAR");
	let pass_direction = b.add_scalar_string("ASCENDING");
	let polygon = b.add_scalar_string("POLYGON ((-117.0 37.0, -116.8 37.0, -116.8 37.2, -117.0 37.2, -117.0 37.0))");
	let start_time = b.add_scalar_string("2026-01-17T06:23:11.000000");
	let end_time = b.add_scalar_string("2026-01-17T06:23:27.000000");
	let identification = b.add_group(
		&[
			("listOfFrequencies", frequencies),
			("missionId", mission),
			("orbitPassDirection", pass_direction),
			("boundingPolygon", polygon),
			("zeroDopplerStartTime", start_time),
			("zeroDopplerEndTime", end_time),
		],
		&[("productType", TestAttr::Text("GCOV".to_string()))],
	);

	let grids = b.add_group(&[("frequencyA", frequency_a)], &[]);
	let gcov = b.add_group(&[("grids", grids)], &[]);
	let lsar = b.add_group(&[("GCOV", gcov), ("identification", identification)], &[]);
	let science = b.add_group(&[("LSAR", lsar)], &[]);
	let root = b.add_group(&[("science", science)], &[]);
	b.finish(root)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::format::{HDF5_SIGNATURE, Superblock};

	#[test]
	fn builder_produces_hdf5_signature() {
		let blob = build_gcov_file(&GcovFileOptions::default());
		assert_eq!(&blob.as_slice()[..8], HDF5_SIGNATURE);
		let sb = Superblock::parse(blob.as_slice()).unwrap();
		assert_eq!(sb.version, 2);
		assert_eq!(sb.end_of_file, blob.len());
	}

	#[test]
	fn speckle_power_is_deterministic_and_positive() {
		assert_eq!(speckle_power(0, 10, 20), speckle_power(0, 10, 20));
		for r in 0..50 {
			for c in 0..50 {
				assert!(speckle_power(0, r, c) >= 0.0);
			}
		}
	}

	#[test]
	fn co_pol_is_brighter_on_average() {
		let mean = |term: u64| -> f32 {
			let mut sum = 0.0;
			for r in 0..64 {
				for c in 0..64 {
					sum += speckle_power(term, r, c);
				}
			}
			sum / 4096.0
		};
		assert!(mean(0) > mean(1) * 1.5);
	}
}
