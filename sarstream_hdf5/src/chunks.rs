//! The chunk I/O engine: resolves chunk coordinates to byte ranges, coalesces
//! nearby reads into grouped range requests, runs the inverse filter pipeline
//! and decodes elements, keeping decoded chunks in a bounded LRU.
//!
//! Two rules are load-bearing here:
//! - There is no per-chunk cancellation. An in-flight read always completes
//!   and its result is cached, so a caller that lost interest still warms the
//!   cache for the next request and never starves the throughput estimator.
//! - A missing B-tree entry is *sparse* and the `None` result is cached; any
//!   fetch or decode failure is an *error* and is never cached, so transient
//!   failures stay retryable.

use crate::catalog::{Catalog, ChunkKey, ChunkLocation, DataLayout, DatasetId, ElementType, FilterSpec};
use crate::decode::decode_f32;
use crate::filters::apply_inverse_pipeline;
use crate::format::{Superblock, parse_chunk_btree_node};
use crate::{Error, Result};
use futures::StreamExt;
use sarstream_core::io::DataSource;
use sarstream_core::{ByteRange, LimitedCache};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// A decoded chunk, shared through the cache until evicted.
pub type ChunkBuffer = Arc<Vec<f32>>;

/// Gaps up to this many unused bytes are coalesced into one range request.
const COALESCE_GAP: u64 = 4096;

/// Window fetched per B-tree node during on-demand index loading.
const BTREE_FETCH_SIZE: u64 = 64 * 1024;

/// Default decoded-chunk cache capacity per engine.
pub const DEFAULT_CHUNK_CACHE_CAP: usize = 500;

/// Bounded adaptive concurrency with a throughput estimator.
///
/// The limit starts moderate and is tuned from observed group throughput:
/// samples trending upward raise it, samples below the moving average lower
/// it. Zero-byte and failed completions are never sampled, so the estimate
/// stays strictly positive.
#[derive(Debug)]
pub struct AdaptiveConcurrency {
	limit: usize,
	samples: Vec<f64>,
}

impl AdaptiveConcurrency {
	pub const INITIAL: usize = 8;
	pub const MIN: usize = 2;
	pub const MAX: usize = 32;
	const WINDOW: usize = 16;

	pub fn new() -> AdaptiveConcurrency {
		AdaptiveConcurrency {
			limit: Self::INITIAL,
			samples: Vec::new(),
		}
	}

	pub fn limit(&self) -> usize {
		self.limit
	}

	/// Mean of the recorded throughput samples in bytes per second.
	pub fn throughput(&self) -> Option<f64> {
		if self.samples.is_empty() {
			None
		} else {
			Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
		}
	}

	/// Records one successful non-empty group read.
	pub fn record(&mut self, bytes: u64, elapsed_secs: f64) {
		if bytes == 0 {
			return;
		}
		let rate = bytes as f64 / elapsed_secs.max(1e-9);

		if let Some(average) = self.throughput() {
			if rate > average * 1.05 {
				self.limit = (self.limit + 1).min(Self::MAX);
			} else if rate < average * 0.95 {
				self.limit = self.limit.saturating_sub(1).max(Self::MIN);
			}
		}

		self.samples.push(rate);
		if self.samples.len() > Self::WINDOW {
			self.samples.remove(0);
		}
	}
}

impl Default for AdaptiveConcurrency {
	fn default() -> Self {
		Self::new()
	}
}

/// Static facts about a dataset needed to fetch and decode its chunks.
#[derive(Clone, Debug)]
struct ChunkedDatasetInfo {
	chunk_dims: Vec<u64>,
	element_type: ElementType,
	filters: Vec<FilterSpec>,
}

impl ChunkedDatasetInfo {
	fn element_count(&self) -> usize {
		self.chunk_dims.iter().product::<u64>() as usize
	}

	fn natural_bytes(&self) -> usize {
		self.element_count() * self.element_type.byte_size()
	}
}

/// One member chunk of a coalesced read group.
struct GroupMember {
	result_index: usize,
	key: ChunkKey,
	location: ChunkLocation,
}

/// The chunk I/O engine. Cheap to clone into per-layer variants: clones share
/// the byte source, catalog and concurrency estimator but may hold their own
/// cache (mask layers and RGB bands keep separate caches to avoid evicting
/// each other's chunks).
pub struct ChunkEngine {
	source: DataSource,
	superblock: Superblock,
	catalog: Arc<RwLock<Catalog>>,
	limiter: Arc<Mutex<AdaptiveConcurrency>>,
	cache: Mutex<LimitedCache<(DatasetId, ChunkKey), Option<ChunkBuffer>>>,
}

impl ChunkEngine {
	pub fn new(source: DataSource, superblock: Superblock, catalog: Arc<RwLock<Catalog>>) -> ChunkEngine {
		Self::with_cache_capacity_inner(source, superblock, catalog, Arc::default(), DEFAULT_CHUNK_CACHE_CAP)
	}

	/// A sibling engine with its own cache of the given capacity, sharing the
	/// source, catalog and concurrency estimator.
	pub fn sibling_with_cache(&self, capacity: usize) -> ChunkEngine {
		Self::with_cache_capacity_inner(
			self.source.clone(),
			self.superblock,
			self.catalog.clone(),
			self.limiter.clone(),
			capacity,
		)
	}

	fn with_cache_capacity_inner(
		source: DataSource,
		superblock: Superblock,
		catalog: Arc<RwLock<Catalog>>,
		limiter: Arc<Mutex<AdaptiveConcurrency>>,
		capacity: usize,
	) -> ChunkEngine {
		ChunkEngine {
			source,
			superblock,
			catalog,
			limiter,
			cache: Mutex::new(LimitedCache::with_capacity(capacity)),
		}
	}

	pub fn current_concurrency(&self) -> usize {
		self.limiter.lock().unwrap().limit()
	}

	pub fn throughput_estimate(&self) -> Option<f64> {
		self.limiter.lock().unwrap().throughput()
	}

	pub fn cached_chunk_count(&self) -> usize {
		self.cache.lock().unwrap().len()
	}

	/// Reads one chunk; `None` is the sparse-data result.
	pub async fn read_chunk(&self, dataset: DatasetId, key: ChunkKey) -> Result<Option<ChunkBuffer>> {
		Ok(self.read_chunks_batch(dataset, &[key]).await?.pop().flatten())
	}

	/// Reads a batch of chunks, coalescing nearby ranges into grouped
	/// requests. The result preserves input order; entries are `None` for
	/// sparse chunks and for chunks whose read failed (failures are logged
	/// and never cached).
	pub async fn read_chunks_batch(&self, dataset: DatasetId, keys: &[ChunkKey]) -> Result<Vec<Option<ChunkBuffer>>> {
		let mut results: Vec<Option<ChunkBuffer>> = vec![None; keys.len()];
		if keys.is_empty() {
			return Ok(results);
		}

		self.ensure_chunk_index(dataset).await?;
		let info = self.chunked_info(dataset)?;

		// Resolve locations and satisfy what we can from the cache.
		let mut missing: Vec<GroupMember> = Vec::new();
		{
			let catalog = self.catalog.read().unwrap();
			let record = catalog.get(dataset).ok_or_else(|| Error::MissingDataset(format!("{dataset:?}")))?;
			let index = record.chunk_index.as_ref();
			let mut cache = self.cache.lock().unwrap();
			for (result_index, key) in keys.iter().enumerate() {
				let cache_key = (dataset, key.clone());
				if let Some(cached) = cache.get(&cache_key) {
					results[result_index] = cached;
					continue;
				}
				match index.and_then(|i| i.get(key)) {
					Some(&location) => missing.push(GroupMember {
						result_index,
						key: key.clone(),
						location,
					}),
					None => {
						// Sparse chunk: cache the absence.
						cache.add(cache_key, None);
					}
				}
			}
		}
		if missing.is_empty() {
			return Ok(results);
		}

		let groups = coalesce(missing);
		let limit = self.current_concurrency();
		log::trace!(
			"batch read of dataset {dataset:?}: {} chunks in {} groups, concurrency {limit}",
			keys.len(),
			groups.len()
		);

		let mut stream = futures::stream::iter(
			groups
				.into_iter()
				.map(|(range, members)| self.fetch_group(dataset, &info, range, members)),
		)
		.buffer_unordered(limit);

		while let Some(decoded) = stream.next().await {
			for (result_index, buffer) in decoded {
				results[result_index] = buffer;
			}
		}
		Ok(results)
	}

	/// Fetches one coalesced group and decodes its member chunks.
	async fn fetch_group(
		&self,
		dataset: DatasetId,
		info: &ChunkedDatasetInfo,
		range: ByteRange,
		members: Vec<GroupMember>,
	) -> Vec<(usize, Option<ChunkBuffer>)> {
		let started = Instant::now();
		let blob = match self.source.read_range(&range).await {
			Ok(blob) => blob,
			Err(err) => {
				// Error, not sparse: nothing is cached, the read can be retried.
				log::warn!("chunk group read {range} failed: {err}");
				return members.into_iter().map(|m| (m.result_index, None)).collect();
			}
		};
		// Failed or empty completions never reach the estimator.
		self
			.limiter
			.lock()
			.unwrap()
			.record(range.length, started.elapsed().as_secs_f64());

		let mut decoded = Vec::with_capacity(members.len());
		for member in members {
			let start = (member.location.offset - range.offset) as usize;
			let end = start + member.location.size as usize;
			let raw = blob.as_slice()[start..end].to_vec();
			match self.decode_chunk(info, raw, member.location.filter_mask) {
				Ok(buffer) => {
					let buffer = Arc::new(buffer);
					self
						.cache
						.lock()
						.unwrap()
						.add((dataset, member.key), Some(buffer.clone()));
					decoded.push((member.result_index, Some(buffer)));
				}
				Err(err) => {
					log::warn!("chunk {:?} of dataset {dataset:?} failed to decode: {err}", member.key);
					decoded.push((member.result_index, None));
				}
			}
		}
		decoded
	}

	fn decode_chunk(&self, info: &ChunkedDatasetInfo, raw: Vec<u8>, filter_mask: u32) -> Result<Vec<f32>> {
		let element_size = info.element_type.byte_size();
		let bytes = apply_inverse_pipeline(raw, &info.filters, filter_mask, element_size, info.natural_bytes())?;
		let buffer = decode_f32(&bytes, info.element_type)?;
		if buffer.len() != info.element_count() {
			return Err(Error::Decode(format!(
				"chunk decoded to {} elements, expected {}",
				buffer.len(),
				info.element_count()
			)));
		}
		Ok(buffer)
	}

	/// Reads one chunk and runs the inverse pipeline without the f32 element
	/// decode; small-dataset and endpoint reads use this to keep native
	/// precision. The result is not cached.
	pub async fn read_chunk_raw(&self, dataset: DatasetId, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
		self.ensure_chunk_index(dataset).await?;
		let info = self.chunked_info(dataset)?;
		let location = {
			let catalog = self.catalog.read().unwrap();
			let record = catalog.get(dataset).ok_or_else(|| Error::MissingDataset(format!("{dataset:?}")))?;
			record.chunk_index.as_ref().and_then(|i| i.get(key)).copied()
		};
		let Some(location) = location else {
			return Ok(None);
		};
		let blob = self
			.source
			.read_range(&ByteRange::new(location.offset, location.size))
			.await
			.map_err(Error::Io)?;
		let bytes = apply_inverse_pipeline(
			blob.into_vec(),
			&info.filters,
			location.filter_mask,
			info.element_type.byte_size(),
			info.natural_bytes(),
		)?;
		Ok(Some(bytes))
	}

	/// Shape and chunk dims of a chunked dataset, for region geometry.
	pub fn dataset_shape_and_chunks(&self, dataset: DatasetId) -> Result<(Vec<u64>, Vec<u64>)> {
		let catalog = self.catalog.read().unwrap();
		let record = catalog.get(dataset).ok_or_else(|| Error::MissingDataset(format!("{dataset:?}")))?;
		let chunk_dims = record
			.chunk_dims()
			.ok_or_else(|| Error::MissingDataset(format!("dataset {dataset:?} is not chunked")))?;
		Ok((record.shape.clone(), chunk_dims.to_vec()))
	}

	fn chunked_info(&self, dataset: DatasetId) -> Result<ChunkedDatasetInfo> {
		let catalog = self.catalog.read().unwrap();
		let record = catalog.get(dataset).ok_or_else(|| Error::MissingDataset(format!("{dataset:?}")))?;
		match &record.layout {
			DataLayout::Chunked { chunk_dims, .. } => Ok(ChunkedDatasetInfo {
				chunk_dims: chunk_dims.clone(),
				element_type: record.element_type,
				filters: record.filters.clone(),
			}),
			_ => Err(Error::MissingDataset(format!("dataset {dataset:?} is not chunked"))),
		}
	}

	/// Loads the chunk index on demand when the metadata prefix did not cover
	/// the B-tree: nodes are fetched in bounded windows starting at the root.
	async fn ensure_chunk_index(&self, dataset: DatasetId) -> Result<()> {
		let (index_address, index_version, rank) = {
			let catalog = self.catalog.read().unwrap();
			let record = catalog.get(dataset).ok_or_else(|| Error::MissingDataset(format!("{dataset:?}")))?;
			if record.chunk_index.is_some() {
				return Ok(());
			}
			match &record.layout {
				DataLayout::Chunked {
					index_address,
					index_version,
					..
				} => (*index_address, *index_version, record.shape.len()),
				_ => return Ok(()),
			}
		};

		if index_version != 3 {
			log::debug!("dataset {dataset:?} uses a v4 chunk index; chunks stay unavailable");
			return Ok(());
		}
		if index_address >= self.source.size() {
			return Err(Error::Format(format!(
				"chunk B-tree root of dataset {dataset:?} at {index_address} beyond end of file"
			)));
		}

		log::debug!("fetching chunk B-tree of dataset {dataset:?} at {index_address} on demand");
		let mut index = HashMap::new();
		let mut pending = vec![index_address];
		while let Some(node_address) = pending.pop() {
			let length = BTREE_FETCH_SIZE.min(self.source.size().saturating_sub(node_address));
			let blob = self
				.source
				.read_range(&ByteRange::new(node_address, length))
				.await
				.map_err(Error::Io)?;
			let node = parse_chunk_btree_node(blob.as_slice(), rank, self.superblock.offset_size)
				.map_err(|err| Error::Format(format!("B-tree node at {node_address}: {err}")))?;
			index.extend(node.entries);
			pending.extend(node.children);
		}

		self.catalog.write().unwrap().set_chunk_index(dataset, index);
		Ok(())
	}
}

impl std::fmt::Debug for ChunkEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChunkEngine")
			.field("source", &self.source.name())
			.field("concurrency", &self.current_concurrency())
			.finish()
	}
}

/// Sorts pending members by offset and folds ranges whose gap is at most
/// [`COALESCE_GAP`] into single requests.
fn coalesce(mut members: Vec<GroupMember>) -> Vec<(ByteRange, Vec<GroupMember>)> {
	members.sort_by_key(|m| m.location.offset);

	let mut groups: Vec<(ByteRange, Vec<GroupMember>)> = Vec::new();
	for member in members {
		let range = ByteRange::new(member.location.offset, member.location.size);
		match groups.last_mut() {
			Some((group_range, group_members)) if group_range.gap_to(&range).unwrap_or(0) <= COALESCE_GAP => {
				*group_range = group_range.merged_with(&range);
				group_members.push(member);
			}
			_ => groups.push((range, vec![member])),
		}
	}
	groups
}

#[cfg(test)]
mod tests {
	use super::*;

	fn member(index: usize, offset: u64, size: u64) -> GroupMember {
		GroupMember {
			result_index: index,
			key: vec![0, 0],
			location: ChunkLocation {
				offset,
				size,
				filter_mask: 0,
			},
		}
	}

	#[test]
	fn coalesce_merges_nearby_ranges() {
		let groups = coalesce(vec![
			member(0, 0, 1000),
			member(1, 1500, 1000), // gap 500 <= COALESCE_GAP
			member(2, 100_000, 1000),
		]);
		assert_eq!(groups.len(), 2);
		assert_eq!(groups[0].0, ByteRange::new(0, 2500));
		assert_eq!(groups[0].1.len(), 2);
		assert_eq!(groups[1].0, ByteRange::new(100_000, 1000));
	}

	#[test]
	fn coalesce_sorts_before_merging() {
		let groups = coalesce(vec![member(0, 5000, 100), member(1, 0, 100), member(2, 5200, 100)]);
		assert_eq!(groups.len(), 2);
		assert_eq!(groups[0].0.offset, 0);
		assert_eq!(groups[1].0, ByteRange::new(5000, 300));
	}

	#[test]
	fn coalesce_respects_gap_threshold() {
		let groups = coalesce(vec![member(0, 0, 100), member(1, 100 + COALESCE_GAP + 1, 100)]);
		assert_eq!(groups.len(), 2);
	}

	#[test]
	fn adaptive_limit_stays_bounded() {
		let mut limiter = AdaptiveConcurrency::new();
		assert_eq!(limiter.limit(), AdaptiveConcurrency::INITIAL);

		// A long run of improving samples saturates at MAX.
		for i in 1..200u64 {
			limiter.record(i * 1_000_000, 1.0);
		}
		assert!(limiter.limit() <= AdaptiveConcurrency::MAX);

		// A long run of collapsing samples floors at MIN.
		let mut limiter = AdaptiveConcurrency::new();
		for i in (1..200u64).rev() {
			limiter.record(i * 1000, 1.0);
		}
		assert!(limiter.limit() >= AdaptiveConcurrency::MIN);
	}

	#[test]
	fn zero_byte_completions_are_never_sampled() {
		let mut limiter = AdaptiveConcurrency::new();
		limiter.record(0, 0.001);
		limiter.record(0, 0.0);
		assert_eq!(limiter.throughput(), None);
		assert_eq!(limiter.limit(), AdaptiveConcurrency::INITIAL);
	}

	#[test]
	fn throughput_stays_strictly_positive() {
		let mut limiter = AdaptiveConcurrency::new();
		limiter.record(1, 0.0); // degenerate elapsed time
		for _ in 0..50 {
			limiter.record(1_000, 0.5);
		}
		let estimate = limiter.throughput().unwrap();
		assert!(estimate > 0.0);
		assert!(estimate.is_finite());
	}
}
