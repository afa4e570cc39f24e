//! The RGB multi-band tile service: coordinates parallel chunk reads across
//! several covariance-term datasets and returns raw per-band power buffers.
//! RGB conversion, contrast stretch and dB mapping are the downstream texture
//! stage's business, never done here.

use super::sampling::{MosaicGrid, slice_from_bbox};
use super::service::{TileOptions, TileRequest, sample_tile_from_grid};
use crate::product::{FrequencyStructure, WorldBounds};
use crate::{Error, Result};
use sarstream_hdf5::{ChunkEngine, DatasetId, Hdf5Reader};
use std::collections::BTreeMap;

/// Per-band chunk caches hold a full fine grid with headroom.
const BAND_CHUNK_CACHE_CAP: usize = 320;

/// A multi-band tile: one float power buffer per requested term.
#[derive(Clone, Debug)]
pub struct RgbTile {
	pub bands: BTreeMap<String, Vec<f32>>,
	pub width: usize,
	pub height: usize,
}

struct BandLayer {
	term: String,
	/// `None` when the term is missing or mismatched; the band zero-fills.
	dataset: Option<DatasetId>,
	engine: ChunkEngine,
}

/// A tile service producing aligned per-band buffers for compositing.
pub struct RgbTileService {
	bands: Vec<BandLayer>,
	width: u64,
	height: u64,
	chunk_dims: (u64, u64),
	world_bounds: Option<WorldBounds>,
	options: TileOptions,
}

impl RgbTileService {
	/// Builds the service for `required_terms`, classifying each through the
	/// resolved product structure. Bands whose dataset is absent or whose
	/// grid disagrees with the first band are zero-filled with a warning.
	pub fn new(
		reader: &Hdf5Reader,
		structure: &FrequencyStructure,
		required_terms: &[&str],
		options: TileOptions,
	) -> Result<RgbTileService> {
		let mut reference: Option<(Vec<u64>, Vec<u64>)> = None;
		let mut bands = Vec::with_capacity(required_terms.len());

		for term in required_terms {
			let engine = reader.sibling_engine(BAND_CHUNK_CACHE_CAP);
			let dataset = match structure.term(term) {
				Some(id) => match engine.dataset_shape_and_chunks(id) {
					Ok((shape, chunk_dims)) if shape.len() == 2 => match &reference {
						None => {
							reference = Some((shape, chunk_dims));
							Some(id)
						}
						Some((ref_shape, ref_chunks)) if *ref_shape == shape && *ref_chunks == chunk_dims => Some(id),
						Some(_) => {
							log::warn!("band {term} has a mismatched grid; filling with zeros");
							None
						}
					},
					_ => {
						log::warn!("band {term} is not a chunked 2-D raster; filling with zeros");
						None
					}
				},
				None => {
					log::warn!("band {term} is not present in the product; filling with zeros");
					None
				}
			};
			bands.push(BandLayer {
				term: (*term).to_string(),
				dataset,
				engine,
			});
		}

		let (shape, chunk_dims) =
			reference.ok_or_else(|| Error::MissingDataset("no required band resolves to a dataset".to_string()))?;

		Ok(RgbTileService {
			bands,
			width: shape[1],
			height: shape[0],
			chunk_dims: (chunk_dims[0], chunk_dims[1]),
			world_bounds: structure.world_bounds,
			options,
		})
	}

	pub fn terms(&self) -> Vec<&str> {
		self.bands.iter().map(|b| b.term.as_str()).collect()
	}

	/// Serves one multi-band tile. The covering chunk rectangle is computed
	/// once; every band issues its chunk reads in parallel through its own
	/// engine, and each engine's coalescer folds the per-band reads into a
	/// handful of range requests.
	pub async fn rgb_tile(&self, request: &TileRequest) -> Result<Option<RgbTile>> {
		let Some(slice) = slice_from_bbox(request.bbox, self.width, self.height, self.world_bounds.as_ref()) else {
			return Ok(None);
		};

		let tile_size = self.options.tile_size;
		let grid_limit = self.options.fine_grid;
		let multi_look = request.multi_look;

		let futures = self.bands.iter().map(|band| async move {
			let Some(dataset) = band.dataset else {
				return (band.term.clone(), vec![0f32; tile_size * tile_size]);
			};
			let mut grid = MosaicGrid::plan(slice, self.chunk_dims, grid_limit);
			match band.engine.read_chunks_batch(dataset, &grid.keys()).await {
				Ok(buffers) => {
					grid.set_buffers(buffers);
					(band.term.clone(), sample_tile_from_grid(&grid, tile_size, multi_look))
				}
				Err(err) => {
					// A failed band becomes zeros; the other bands still show.
					log::warn!("band {} read failed: {err}", band.term);
					(band.term.clone(), vec![0f32; tile_size * tile_size])
				}
			}
		});

		let bands = futures::future::join_all(futures).await.into_iter().collect();
		Ok(Some(RgbTile {
			bands,
			width: tile_size,
			height: tile_size,
		}))
	}
}

impl std::fmt::Debug for RgbTileService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RgbTileService")
			.field("terms", &self.terms())
			.field("size", &(self.width, self.height))
			.finish()
	}
}
