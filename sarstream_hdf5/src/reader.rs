//! The public reader: opens a byte source, parses the metadata prefix into a
//! catalog, and serves catalog inspection, small-dataset reads, chunk reads
//! and region reads.

use crate::catalog::{AttrValue, Catalog, ChunkKey, DataLayout, DatasetId, DatasetSummary, ElementType};
use crate::chunks::{ChunkBuffer, ChunkEngine};
use crate::decode::{DataValue, decode_values};
use crate::format::Superblock;
use crate::parser::{MetadataOptions, parse_metadata};
use crate::region::{RegionData, read_region};
use crate::{Error, Result};
use sarstream_core::ByteRange;
use sarstream_core::io::{DataSource, DataSourceFile, DataSourceHttp};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Largest dataset loaded whole by `read_small_dataset`.
const SMALL_DATASET_LIMIT: u64 = 32 * 1024 * 1024;

/// A decoded small dataset.
#[derive(Clone, Debug)]
pub struct SmallDataset {
	pub value: DataValue,
	pub shape: Vec<u64>,
	pub element_type: ElementType,
}

/// First and last element of a 1-D dataset, read without loading the middle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DatasetEndpoints {
	pub first: f64,
	pub last: f64,
	pub length: u64,
}

/// A cloud-optimized HDF5 reader over a random-access byte source.
pub struct Hdf5Reader {
	source: DataSource,
	superblock: Superblock,
	catalog: Arc<RwLock<Catalog>>,
	engine: ChunkEngine,
}

impl Hdf5Reader {
	/// Opens a local file.
	pub async fn open_local(path: &Path, options: MetadataOptions) -> Result<Hdf5Reader> {
		let source: DataSource =
			Arc::from(DataSourceFile::open(path).map_err(Error::Io)? as Box<dyn sarstream_core::io::DataSourceTrait>);
		Self::open_source(source, options).await
	}

	/// Opens a remote HTTPS resource supporting byte-range GET.
	pub async fn open_remote(url: &str, options: MetadataOptions) -> Result<Hdf5Reader> {
		let url = url
			.parse()
			.map_err(|err| Error::Io(anyhow::anyhow!("invalid url '{url}': {err}")))?;
		let source: DataSource = Arc::from(
			DataSourceHttp::open(url).await.map_err(Error::Io)? as Box<dyn sarstream_core::io::DataSourceTrait>,
		);
		Self::open_source(source, options).await
	}

	/// Opens any byte source: fetches the metadata prefix and builds the
	/// dataset catalog without touching chunk data.
	pub async fn open_source(source: DataSource, options: MetadataOptions) -> Result<Hdf5Reader> {
		let prefix_length = options.prefetch_size.min(source.size());
		let prefix = source
			.read_range(&ByteRange::new(0, prefix_length))
			.await
			.map_err(Error::Io)?;

		let (superblock, catalog) = parse_metadata(prefix.as_slice(), source.size())?;
		log::debug!(
			"opened '{}': superblock v{}, {} datasets",
			source.name(),
			superblock.version,
			catalog.len()
		);

		let catalog = Arc::new(RwLock::new(catalog));
		let engine = ChunkEngine::new(source.clone(), superblock, catalog.clone());
		Ok(Hdf5Reader {
			source,
			superblock,
			catalog,
			engine,
		})
	}

	pub fn name(&self) -> String {
		self.source.name().to_string()
	}

	pub fn size(&self) -> u64 {
		self.source.size()
	}

	pub fn superblock(&self) -> &Superblock {
		&self.superblock
	}

	/// The engine backing this reader's chunk and region reads.
	pub fn engine(&self) -> &ChunkEngine {
		&self.engine
	}

	/// A sibling engine with its own chunk cache; tile layers use these to
	/// keep mask and per-band chunks from evicting each other.
	pub fn sibling_engine(&self, cache_capacity: usize) -> ChunkEngine {
		self.engine.sibling_with_cache(cache_capacity)
	}

	/// Lists every dataset in the catalog.
	pub fn list_datasets(&self) -> Vec<DatasetSummary> {
		self.catalog.read().unwrap().summaries()
	}

	/// Finds a dataset by exact hierarchical path, leading slash optional.
	pub fn find_dataset_by_path(&self, path: &str) -> Option<DatasetId> {
		let catalog = self.catalog.read().unwrap();
		catalog
			.find_by_path(path)
			.or_else(|| catalog.find_by_path(&format!("/{}", path.trim_start_matches('/'))))
			.or_else(|| catalog.find_by_path(path.trim_start_matches('/')))
	}

	/// Attributes of a dataset.
	pub fn dataset_attributes(&self, id: DatasetId) -> Result<BTreeMap<String, AttrValue>> {
		let catalog = self.catalog.read().unwrap();
		let record = catalog.get(id).ok_or_else(|| Error::MissingDataset(format!("{id:?}")))?;
		Ok(record.attributes.clone())
	}

	/// Attributes recorded for a group object.
	pub fn group_attributes(&self, path: &str) -> Option<BTreeMap<String, AttrValue>> {
		self.catalog.read().unwrap().group_attributes(path).cloned()
	}

	/// Shape and element type of a dataset.
	pub fn dataset_shape(&self, id: DatasetId) -> Result<(Vec<u64>, ElementType)> {
		let catalog = self.catalog.read().unwrap();
		let record = catalog.get(id).ok_or_else(|| Error::MissingDataset(format!("{id:?}")))?;
		Ok((record.shape.clone(), record.element_type))
	}

	/// Reads an entire dataset, preserving the native element width. Suitable
	/// for metadata scalars, string lists and coordinate arrays; rasters
	/// should go through `read_region` instead.
	pub async fn read_small_dataset(&self, id: DatasetId) -> Result<SmallDataset> {
		let (shape, element_type, layout) = {
			let catalog = self.catalog.read().unwrap();
			let record = catalog.get(id).ok_or_else(|| Error::MissingDataset(format!("{id:?}")))?;
			(record.shape.clone(), record.element_type, record.layout.clone())
		};
		let element_count: u64 = shape.iter().product::<u64>().max(1);
		let total_bytes = element_count * element_type.byte_size() as u64;
		if total_bytes > SMALL_DATASET_LIMIT {
			return Err(Error::Decode(format!(
				"dataset {id:?} holds {total_bytes} bytes, too large to load whole"
			)));
		}

		let bytes = match layout {
			DataLayout::Compact { data } => data,
			DataLayout::Contiguous { address, size } => self
				.source
				.read_range(&ByteRange::new(address, size.min(total_bytes)))
				.await
				.map_err(Error::Io)?
				.into_vec(),
			DataLayout::Chunked { ref chunk_dims, .. } => {
				if shape.len() > 1 {
					return Err(Error::Decode(format!(
						"chunked dataset {id:?} of rank {} is not a small dataset",
						shape.len()
					)));
				}
				let chunk_length = chunk_dims[0];
				let mut bytes = Vec::with_capacity(total_bytes as usize);
				let mut origin = 0u64;
				while origin < element_count {
					match self.engine.read_chunk_raw(id, &vec![origin]).await? {
						Some(chunk) => bytes.extend_from_slice(&chunk),
						None => bytes.extend(std::iter::repeat_n(0u8, (chunk_length * element_type.byte_size() as u64) as usize)),
					}
					origin += chunk_length;
				}
				bytes.truncate(total_bytes as usize);
				bytes
			}
		};

		let value = decode_values(&bytes, element_type)?;
		Ok(SmallDataset {
			value,
			shape,
			element_type,
		})
	}

	/// Reads only the first and last elements of a 1-D dataset.
	pub async fn read_dataset_endpoints(&self, id: DatasetId) -> Result<DatasetEndpoints> {
		let (shape, element_type, layout) = {
			let catalog = self.catalog.read().unwrap();
			let record = catalog.get(id).ok_or_else(|| Error::MissingDataset(format!("{id:?}")))?;
			(record.shape.clone(), record.element_type, record.layout.clone())
		};
		if shape.len() != 1 || shape[0] == 0 {
			return Err(Error::MissingDataset(format!("dataset {id:?} is not a non-empty 1-D array")));
		}
		let length = shape[0];
		let element_size = element_type.byte_size() as u64;

		let (first_bytes, last_bytes) = match layout {
			DataLayout::Compact { data } => {
				let first = data.get(0..element_size as usize).map(<[u8]>::to_vec);
				let last = data
					.get(((length - 1) * element_size) as usize..(length * element_size) as usize)
					.map(<[u8]>::to_vec);
				match (first, last) {
					(Some(first), Some(last)) => (first, last),
					_ => return Err(Error::Decode(format!("compact dataset {id:?} shorter than its shape"))),
				}
			}
			DataLayout::Contiguous { address, .. } => {
				let first = self
					.source
					.read_range(&ByteRange::new(address, element_size))
					.await
					.map_err(Error::Io)?;
				let last = self
					.source
					.read_range(&ByteRange::new(address + (length - 1) * element_size, element_size))
					.await
					.map_err(Error::Io)?;
				(first.into_vec(), last.into_vec())
			}
			DataLayout::Chunked { ref chunk_dims, .. } => {
				let chunk_length = chunk_dims[0];
				let last_origin = ((length - 1) / chunk_length) * chunk_length;
				let first_chunk = self
					.engine
					.read_chunk_raw(id, &vec![0])
					.await?
					.ok_or_else(|| Error::Decode(format!("first chunk of dataset {id:?} is sparse")))?;
				let last_chunk = if last_origin == 0 {
					first_chunk.clone()
				} else {
					self
						.engine
						.read_chunk_raw(id, &vec![last_origin])
						.await?
						.ok_or_else(|| Error::Decode(format!("last chunk of dataset {id:?} is sparse")))?
				};
				let offset_in_last = ((length - 1) - last_origin) * element_size;
				(
					first_chunk[..element_size as usize].to_vec(),
					last_chunk[offset_in_last as usize..(offset_in_last + element_size) as usize].to_vec(),
				)
			}
		};

		let first = decode_values(&first_bytes, element_type)?
			.get_f64(0)
			.ok_or_else(|| Error::Decode(format!("dataset {id:?} is not numeric")))?;
		let last = decode_values(&last_bytes, element_type)?
			.get_f64(0)
			.ok_or_else(|| Error::Decode(format!("dataset {id:?} is not numeric")))?;
		Ok(DatasetEndpoints { first, last, length })
	}

	/// Reads one chunk as a decoded `f32` buffer; `None` means sparse.
	pub async fn read_chunk(&self, id: DatasetId, coord: ChunkKey) -> Result<Option<ChunkBuffer>> {
		self.engine.read_chunk(id, coord).await
	}

	/// Reads many chunks through the batch coalescer.
	pub async fn read_chunks_batch(&self, id: DatasetId, coords: &[ChunkKey]) -> Result<Vec<Option<ChunkBuffer>>> {
		self.engine.read_chunks_batch(id, coords).await
	}

	/// Reads a dense rectangular region of a chunked 2-D dataset.
	pub async fn read_region(
		&self,
		id: DatasetId,
		row_start: u64,
		col_start: u64,
		row_count: usize,
		col_count: usize,
	) -> Result<RegionData> {
		read_region(&self.engine, id, row_start, col_start, row_count, col_count).await
	}
}

impl std::fmt::Debug for Hdf5Reader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Hdf5Reader")
			.field("source", &self.source.name())
			.field("datasets", &self.catalog.read().unwrap().len())
			.finish()
	}
}
