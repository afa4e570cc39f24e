//! Product-structure discovery: band, frequencies, covariance terms,
//! coordinates, projection, mask and identification metadata, each resolved
//! through spec paths first and progressively weaker fallbacks after.

mod bounds;
mod identification;
mod projection;
mod structure;

pub use bounds::*;
pub use identification::*;
pub use projection::*;
pub use structure::*;

use crate::Result;
use sarstream_hdf5::Hdf5Reader;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A NISAR L2 GCOV product opened over a cloud-optimized HDF5 reader.
#[derive(Debug)]
pub struct GcovProduct {
	reader: Arc<Hdf5Reader>,
	band: Band,
	identification: BTreeMap<String, String>,
	frequencies: Vec<FrequencyStructure>,
}

impl GcovProduct {
	/// Resolves the product structure; cheap reads only (scalars, coordinate
	/// endpoints), no raster chunks unless the heuristic classifier runs.
	pub async fn open(reader: Arc<Hdf5Reader>) -> Result<GcovProduct> {
		let band = detect_band(&reader);
		let identification = read_identification(&reader, band).await;
		let frequencies = resolve_frequencies(&reader, band).await?;

		Ok(GcovProduct {
			reader,
			band,
			identification,
			frequencies,
		})
	}

	pub fn reader(&self) -> &Arc<Hdf5Reader> {
		&self.reader
	}

	pub fn band(&self) -> Band {
		self.band
	}

	/// Flat identification metadata; every field optional.
	pub fn identification(&self) -> &BTreeMap<String, String> {
		&self.identification
	}

	pub fn frequencies(&self) -> &[FrequencyStructure] {
		&self.frequencies
	}

	/// The structure of one frequency, by letter.
	pub fn frequency(&self, letter: char) -> Option<&FrequencyStructure> {
		self.frequencies.iter().find(|f| f.frequency == letter)
	}

	/// The first resolved frequency, which is the primary display target.
	pub fn primary_frequency(&self) -> Result<&FrequencyStructure> {
		self
			.frequencies
			.first()
			.ok_or_else(|| crate::Error::MissingDataset("product has no resolvable frequency".to_string()))
	}

	/// Builds a tile service for one covariance term of a frequency; the
	/// frequency's mask rides along when present.
	pub fn tile_service(
		&self,
		frequency: char,
		term: &str,
		options: crate::TileOptions,
	) -> Result<std::sync::Arc<crate::TileService>> {
		let structure = self
			.frequency(frequency)
			.ok_or_else(|| crate::Error::MissingDataset(format!("frequency {frequency} not present")))?;
		let dataset = structure
			.term(term)
			.ok_or_else(|| crate::Error::MissingDataset(format!("covariance term {term} not present")))?;
		crate::TileService::new(&self.reader, dataset, structure.mask, structure.world_bounds, options)
	}

	/// Builds a multi-band tile service over the given covariance terms.
	pub fn rgb_service(&self, frequency: char, terms: &[&str], options: crate::TileOptions) -> Result<crate::RgbTileService> {
		let structure = self
			.frequency(frequency)
			.ok_or_else(|| crate::Error::MissingDataset(format!("frequency {frequency} not present")))?;
		crate::RgbTileService::new(&self.reader, structure, terms, options)
	}
}
