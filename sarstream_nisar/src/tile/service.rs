//! The tile service: translates viewport bboxes into pixel slices, chooses
//! between a direct region read and a progressive chunk-mosaic path, performs
//! multi-looking in linear power space and maintains the bounded caches.
//!
//! There is no caller-facing cancellation: a stale tile request runs to
//! completion and its chunks stay in the cache for the next request. Failed
//! reads surface as `None` tiles and are never cached, so the session stays
//! usable through transient errors.

use super::sampling::{
	MosaicGrid, SliceRect, bilinear_upsample, is_valid, looks_for_step, resample_box, resample_nearest, slice_from_bbox,
};
use crate::product::WorldBounds;
use crate::{Error, Result};
use sarstream_core::LimitedCache;
use sarstream_hdf5::{ChunkEngine, DatasetId, Hdf5Reader, read_region};
use std::sync::{Arc, Mutex};

/// Options for a tile service; defaults follow the interactive-viewer tuning.
#[derive(Clone, Copy, Debug)]
pub struct TileOptions {
	pub tile_size: usize,
	/// Decoded-chunk LRU capacity (entries); large overviews may want 600.
	pub chunk_cache_cap: usize,
	/// Separate mask-chunk LRU capacity.
	pub mask_cache_cap: usize,
	/// Tile LRU capacity.
	pub tile_cache_cap: usize,
	/// Regions up to this many source pixels are read densely.
	pub direct_read_limit: u64,
	/// Chunk-grid limit per axis for the immediately-served coarse pass.
	pub coarse_grid: usize,
	/// Chunk-grid limit per axis for the background refinement pass.
	pub fine_grid: usize,
}

impl Default for TileOptions {
	fn default() -> Self {
		TileOptions {
			tile_size: 256,
			chunk_cache_cap: 500,
			mask_cache_cap: 500,
			tile_cache_cap: 150,
			direct_read_limit: 1_000_000,
			coarse_grid: 8,
			fine_grid: 24,
		}
	}
}

/// A tile request. The bbox is either world or pixel coordinates; the service
/// auto-detects which (extents beyond twice the image dimension are world).
#[derive(Clone, Copy, Debug)]
pub struct TileRequest {
	pub tile_x: i64,
	pub tile_y: i64,
	pub zoom: u8,
	pub bbox: [f64; 4],
	pub multi_look: bool,
}

impl TileRequest {
	pub fn key(&self) -> TileKey {
		(self.tile_x, self.tile_y, self.zoom, self.multi_look)
	}
}

/// Tile cache key: `(tile_x, tile_y, zoom, multi_look)`.
pub type TileKey = (i64, i64, u8, bool);

/// A served tile: always `tile_size²` power samples, zero where invalid,
/// plus the nearest-sampled mask when the dataset has one.
#[derive(Clone, Debug)]
pub struct Tile {
	pub data: Vec<f32>,
	pub width: usize,
	pub height: usize,
	pub mask: Option<Vec<u8>>,
}

/// Callback invoked when a background refinement lands in the tile cache.
pub type RefineCallback = Arc<dyn Fn(TileKey) + Send + Sync>;

/// A tile service over one covariance-term dataset.
pub struct TileService {
	engine: ChunkEngine,
	mask_engine: Option<ChunkEngine>,
	dataset: DatasetId,
	mask_dataset: Option<DatasetId>,
	width: u64,
	height: u64,
	chunk_dims: (u64, u64),
	mask_chunk_dims: Option<(u64, u64)>,
	world_bounds: Option<WorldBounds>,
	options: TileOptions,
	tile_cache: Mutex<LimitedCache<TileKey, Arc<Tile>>>,
	on_refine: Mutex<Option<RefineCallback>>,
}

impl TileService {
	/// Builds a service for `dataset`, with an optional mask dataset riding
	/// along in its own chunk cache.
	pub fn new(
		reader: &Hdf5Reader,
		dataset: DatasetId,
		mask_dataset: Option<DatasetId>,
		world_bounds: Option<WorldBounds>,
		options: TileOptions,
	) -> Result<Arc<TileService>> {
		let engine = reader.sibling_engine(options.chunk_cache_cap);
		let (shape, chunk_dims) = engine.dataset_shape_and_chunks(dataset)?;
		if shape.len() != 2 {
			return Err(Error::MissingDataset(format!("dataset {dataset:?} is not a 2-D raster")));
		}

		let mut mask_engine = None;
		let mut mask_chunk_dims = None;
		if mask_dataset.is_some() {
			let engine = reader.sibling_engine(options.mask_cache_cap);
			match engine.dataset_shape_and_chunks(mask_dataset.unwrap()) {
				Ok((_, dims)) if dims.len() == 2 => {
					mask_chunk_dims = Some((dims[0], dims[1]));
					mask_engine = Some(engine);
				}
				_ => log::warn!("mask dataset is not a chunked 2-D raster; serving tiles without mask"),
			}
		}

		Ok(Arc::new(TileService {
			engine,
			mask_engine,
			dataset,
			mask_dataset: mask_chunk_dims.is_some().then(|| mask_dataset.unwrap()),
			width: shape[1],
			height: shape[0],
			chunk_dims: (chunk_dims[0], chunk_dims[1]),
			mask_chunk_dims,
			world_bounds,
			options,
			tile_cache: Mutex::new(LimitedCache::with_capacity(options.tile_cache_cap)),
			on_refine: Mutex::new(None),
		}))
	}

	/// Registers the refinement callback. The callback only depends on tile
	/// keys; visual parameters must stay out of it so the consumer's render
	/// layer keeps a referentially-stable tile function.
	pub fn set_on_refine(&self, callback: RefineCallback) {
		*self.on_refine.lock().unwrap() = Some(callback);
	}

	pub fn tile_size(&self) -> usize {
		self.options.tile_size
	}

	pub fn grid_size(&self) -> (u64, u64) {
		(self.height, self.width)
	}

	pub fn has_mask(&self) -> bool {
		self.mask_dataset.is_some()
	}

	pub fn cached_tile_count(&self) -> usize {
		self.tile_cache.lock().unwrap().len()
	}

	/// Serves a tile. `None` means the bbox misses the image entirely, or the
	/// read failed (logged; nothing cached, so a retry can succeed).
	pub async fn tile(self: &Arc<TileService>, request: &TileRequest) -> Result<Option<Arc<Tile>>> {
		let key = request.key();
		if let Some(tile) = self.tile_cache.lock().unwrap().get(&key) {
			return Ok(Some(tile));
		}

		let Some(slice) = slice_from_bbox(request.bbox, self.width, self.height, self.world_bounds.as_ref()) else {
			return Ok(None);
		};

		let tile = if slice.pixel_count() <= self.options.direct_read_limit {
			match self.direct_tile(slice, request.multi_look).await {
				Ok(tile) => Ok(self.tile_cache.lock().unwrap().add(key, Arc::new(tile))),
				Err(err) => Err(err),
			}
		} else {
			// The mosaic path caches the coarse tile itself, before the
			// refinement task can race it for the cache slot.
			self.mosaic_tile(slice, key, request.multi_look).await
		};

		match tile {
			Ok(tile) => Ok(Some(tile)),
			Err(err) => {
				log::warn!("tile {key:?} failed: {err}");
				Ok(None)
			}
		}
	}

	/// Direct path: read the exact rectangle, then resample.
	async fn direct_tile(&self, slice: SliceRect, multi_look: bool) -> Result<Tile> {
		let region = read_region(
			&self.engine,
			self.dataset,
			slice.row0,
			slice.col0,
			slice.rows as usize,
			slice.cols as usize,
		)
		.await?;

		let tile_size = self.options.tile_size;
		let data = if multi_look {
			resample_box(&region, tile_size)
		} else {
			resample_nearest(&region, tile_size)
		};
		let mask = self.sample_mask(slice, self.options.fine_grid).await;

		Ok(Tile {
			data,
			width: tile_size,
			height: tile_size,
			mask,
		})
	}

	/// Chunk-sampled path: serve and cache a coarse mosaic now, refine in
	/// the background.
	async fn mosaic_tile(self: &Arc<TileService>, slice: SliceRect, key: TileKey, multi_look: bool) -> Result<Arc<Tile>> {
		let coarse = self.build_coarse_tile(slice).await?;
		let coarse = self.tile_cache.lock().unwrap().add(key, Arc::new(coarse));

		// Detached refinement: its chunks land in the shared cache even if
		// every consumer has moved on by the time it completes.
		let service = self.clone();
		tokio::spawn(async move {
			match service.build_fine_tile(slice, multi_look).await {
				Ok(tile) => {
					service.tile_cache.lock().unwrap().add(key, Arc::new(tile));
					let callback = service.on_refine.lock().unwrap().clone();
					if let Some(callback) = callback {
						callback(key);
					}
				}
				Err(err) => log::warn!("refinement of tile {key:?} failed: {err}"),
			}
		});

		Ok(coarse)
	}

	/// Coarse pass: a capped chunk grid, box-filtered per cell, bilinearly
	/// interpolated up to tile size.
	async fn build_coarse_tile(&self, slice: SliceRect) -> Result<Tile> {
		let mut grid = MosaicGrid::plan(slice, self.chunk_dims, self.options.coarse_grid);
		let buffers = self.engine.read_chunks_batch(self.dataset, &grid.keys()).await?;
		grid.set_buffers(buffers);

		let tile_size = self.options.tile_size;
		let cells = grid.cell_means();
		let data = bilinear_upsample(&cells, grid.grid_cols(), grid.grid_rows(), tile_size);
		let mask = self.sample_mask(slice, self.options.coarse_grid).await;

		Ok(Tile {
			data,
			width: tile_size,
			height: tile_size,
			mask,
		})
	}

	/// Fine pass: a denser chunk grid, sampled per output pixel; multi-look
	/// averages `n²` sub-samples in linear power.
	async fn build_fine_tile(&self, slice: SliceRect, multi_look: bool) -> Result<Tile> {
		let mut grid = MosaicGrid::plan(slice, self.chunk_dims, self.options.fine_grid);
		let buffers = self.engine.read_chunks_batch(self.dataset, &grid.keys()).await?;
		grid.set_buffers(buffers);

		let tile_size = self.options.tile_size;
		let data = sample_tile_from_grid(&grid, tile_size, multi_look);
		let mask = self.sample_mask(slice, self.options.fine_grid).await;

		Ok(Tile {
			data,
			width: tile_size,
			height: tile_size,
			mask,
		})
	}

	/// Nearest-sampled mask tile through the separate mask engine; `None`
	/// when the dataset has no usable mask or the mask read failed.
	async fn sample_mask(&self, slice: SliceRect, grid_limit: usize) -> Option<Vec<u8>> {
		let mask_dataset = self.mask_dataset?;
		let mask_engine = self.mask_engine.as_ref()?;
		let chunk_dims = self.mask_chunk_dims?;

		let mut grid = MosaicGrid::plan(slice, chunk_dims, grid_limit);
		match mask_engine.read_chunks_batch(mask_dataset, &grid.keys()).await {
			Ok(buffers) => grid.set_buffers(buffers),
			Err(err) => {
				log::warn!("mask read failed: {err}");
				return None;
			}
		}

		let tile_size = self.options.tile_size;
		let step_y = slice.rows as f64 / tile_size as f64;
		let step_x = slice.cols as f64 / tile_size as f64;
		let mut mask = vec![0u8; tile_size * tile_size];
		for ty in 0..tile_size {
			let row = slice.row0 as f64 + (ty as f64 + 0.5) * step_y;
			for tx in 0..tile_size {
				let col = slice.col0 as f64 + (tx as f64 + 0.5) * step_x;
				// Mask categories pass straight through; 0 stays "invalid".
				if let Some(value) = grid.sample_any(row, col) {
					mask[ty * tile_size + tx] = value.clamp(0.0, 255.0) as u8;
				}
			}
		}
		Some(mask)
	}

	/// Warms the chunk cache with the coarse overview grid of the whole
	/// dataset, so the first tile render is served from memory.
	pub async fn prefetch_overview_chunks(&self) -> Result<()> {
		let slice = SliceRect {
			row0: 0,
			col0: 0,
			rows: self.height,
			cols: self.width,
		};
		let grid = MosaicGrid::plan(slice, self.chunk_dims, self.options.coarse_grid);
		let keys = grid.keys();
		log::debug!("prefetching {} overview chunks", keys.len());
		self.engine.read_chunks_batch(self.dataset, &keys).await?;
		Ok(())
	}
}

impl std::fmt::Debug for TileService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TileService")
			.field("dataset", &self.dataset)
			.field("size", &(self.width, self.height))
			.field("mask", &self.mask_dataset.is_some())
			.finish()
	}
}

/// Samples a tile from a mosaic grid: nearest for the fast preview, `n²`
/// linear-power sub-samples per output pixel for multi-look.
pub(crate) fn sample_tile_from_grid(grid: &MosaicGrid, tile_size: usize, multi_look: bool) -> Vec<f32> {
	let slice = grid.slice;
	let step_y = slice.rows as f64 / tile_size as f64;
	let step_x = slice.cols as f64 / tile_size as f64;
	let looks = looks_for_step(step_x, step_y);

	let mut data = vec![0f32; tile_size * tile_size];
	for ty in 0..tile_size {
		for tx in 0..tile_size {
			let value = if multi_look {
				let mut sum = 0f64;
				let mut count = 0usize;
				for i in 0..looks {
					let row = slice.row0 as f64 + (ty as f64 + (i as f64 + 0.5) / looks as f64) * step_y;
					for j in 0..looks {
						let col = slice.col0 as f64 + (tx as f64 + (j as f64 + 0.5) / looks as f64) * step_x;
						if let Some(sample) = grid.sample(row, col) {
							sum += f64::from(sample);
							count += 1;
						}
					}
				}
				if count > 0 { (sum / count as f64) as f32 } else { 0.0 }
			} else {
				let row = slice.row0 as f64 + (ty as f64 + 0.5) * step_y;
				let col = slice.col0 as f64 + (tx as f64 + 0.5) * step_x;
				grid.sample(row, col).unwrap_or(0.0)
			};
			debug_assert!(value >= 0.0 || value.is_nan());
			data[ty * tile_size + tx] = if is_valid(value) { value } else { 0.0 };
		}
	}
	data
}
