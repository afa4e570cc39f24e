//! Band, frequency and covariance-term discovery with the three-tier policy:
//! spec path lookup, then path-tail scanning, then shape/value heuristics as
//! a loudly-logged last resort.

use super::bounds::{WorldBounds, resolve_axes};
use super::projection::resolve_epsg;
use crate::Result;
use sarstream_hdf5::{DatasetId, DatasetSummary, ElementType, Hdf5Reader};

/// Radar band of the product.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Band {
	LSar,
	SSar,
}

impl Band {
	pub fn name(&self) -> &'static str {
		match self {
			Band::LSar => "LSAR",
			Band::SSar => "SSAR",
		}
	}
}

/// The nine canonical covariance terms: four real diagonal terms and the
/// complex off-diagonal products.
pub const DIAGONAL_TERMS: [&str; 4] = ["HHHH", "HVHV", "VHVH", "VVVV"];
pub const OFF_DIAGONAL_TERMS: [&str; 6] = ["HHHV", "HHVH", "HHVV", "HVVH", "HVVV", "VHVV"];

pub fn is_known_term(name: &str) -> bool {
	DIAGONAL_TERMS.contains(&name) || OFF_DIAGONAL_TERMS.contains(&name)
}

/// Resolved structure of one frequency sub-band.
#[derive(Clone, Debug)]
pub struct FrequencyStructure {
	pub frequency: char,
	/// Covariance terms mapped to their datasets, diagonal terms first.
	pub terms: Vec<(String, DatasetId)>,
	pub shape: (u64, u64),
	pub x_coordinates: Option<DatasetId>,
	pub y_coordinates: Option<DatasetId>,
	/// Pixel spacing in world units, positive.
	pub x_spacing: Option<f64>,
	pub y_spacing: Option<f64>,
	pub epsg: u32,
	pub world_bounds: Option<WorldBounds>,
	pub mask: Option<DatasetId>,
}

impl FrequencyStructure {
	pub fn term(&self, name: &str) -> Option<DatasetId> {
		self.terms.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
	}

	pub fn has_mask(&self) -> bool {
		self.mask.is_some()
	}
}

/// Detects the band from spec paths, falling back to a path scan.
pub fn detect_band(reader: &Hdf5Reader) -> Band {
	for band in [Band::LSar, Band::SSar] {
		if reader
			.find_dataset_by_path(&format!("/science/{}/identification/listOfFrequencies", band.name()))
			.is_some()
		{
			return band;
		}
	}
	let datasets = reader.list_datasets();
	let has = |needle: &str| {
		datasets
			.iter()
			.any(|d| d.path.as_deref().is_some_and(|p| p.contains(needle)))
	};
	if has("/SSAR/") && !has("/LSAR/") {
		return Band::SSar;
	}
	if !has("/LSAR/") {
		log::warn!("band not identifiable from paths; assuming LSAR");
	}
	Band::LSar
}

/// Resolves every frequency the product advertises (or that path scanning
/// reveals), in letter order.
pub async fn resolve_frequencies(reader: &Hdf5Reader, band: Band) -> Result<Vec<FrequencyStructure>> {
	let mut letters = frequencies_from_spec(reader, band).await;
	if letters.is_empty() {
		letters = frequencies_from_paths(reader);
	}
	if letters.is_empty() {
		log::warn!("no frequency list found; assuming frequency A");
		letters = vec!['A'];
	}

	let mut frequencies = Vec::new();
	for letter in letters {
		match resolve_frequency(reader, band, letter).await {
			Ok(Some(structure)) => frequencies.push(structure),
			Ok(None) => log::warn!("frequency {letter} has no resolvable covariance terms"),
			Err(err) => log::warn!("failed to resolve frequency {letter}: {err}"),
		}
	}
	Ok(frequencies)
}

/// Tier 1: `identification/listOfFrequencies`.
async fn frequencies_from_spec(reader: &Hdf5Reader, band: Band) -> Vec<char> {
	let path = format!("/science/{}/identification/listOfFrequencies", band.name());
	let Some(id) = reader.find_dataset_by_path(&path) else {
		return Vec::new();
	};
	match reader.read_small_dataset(id).await {
		Ok(dataset) => dataset
			.value
			.texts()
			.iter()
			.filter_map(|t| t.trim().chars().next())
			.filter(|c| matches!(c, 'A' | 'B'))
			.collect(),
		Err(err) => {
			log::debug!("listOfFrequencies unreadable: {err}");
			Vec::new()
		}
	}
}

/// Tier 2: scan catalog paths for `frequencyA`/`frequencyB` segments.
fn frequencies_from_paths(reader: &Hdf5Reader) -> Vec<char> {
	let mut letters = Vec::new();
	for letter in ['A', 'B'] {
		let needle = format!("frequency{letter}");
		if reader
			.list_datasets()
			.iter()
			.any(|d| d.path.as_deref().is_some_and(|p| p.contains(&needle)))
		{
			letters.push(letter);
		}
	}
	letters
}

async fn resolve_frequency(reader: &Hdf5Reader, band: Band, letter: char) -> Result<Option<FrequencyStructure>> {
	let grid_path = format!("/science/{}/GCOV/grids/frequency{letter}", band.name());

	let terms = resolve_terms(reader, &grid_path, letter).await;
	let Some((_, first_term)) = terms.first() else {
		return Ok(None);
	};
	let (shape, _) = reader.dataset_shape(*first_term)?;
	if shape.len() != 2 {
		return Ok(None);
	}
	let shape = (shape[0], shape[1]);

	let x_coordinates = find_auxiliary(reader, &grid_path, "xCoordinates", letter);
	let y_coordinates = find_auxiliary(reader, &grid_path, "yCoordinates", letter);
	let mask = find_auxiliary(reader, &grid_path, "mask", letter);

	let x_spacing_dataset = find_auxiliary(reader, &grid_path, "xCoordinateSpacing", letter);
	let y_spacing_dataset = find_auxiliary(reader, &grid_path, "yCoordinateSpacing", letter);

	let axes = resolve_axes(
		reader,
		shape,
		x_coordinates,
		y_coordinates,
		x_spacing_dataset,
		y_spacing_dataset,
	)
	.await;

	let projection_dataset = find_auxiliary(reader, &grid_path, "projection", letter);
	let epsg = resolve_epsg(reader, projection_dataset, axes.world_bounds.as_ref()).await;

	Ok(Some(FrequencyStructure {
		frequency: letter,
		terms,
		shape,
		x_coordinates,
		y_coordinates,
		x_spacing: axes.x_spacing,
		y_spacing: axes.y_spacing,
		epsg,
		world_bounds: axes.world_bounds,
		mask,
	}))
}

/// Resolves covariance terms with the three tiers.
async fn resolve_terms(reader: &Hdf5Reader, grid_path: &str, letter: char) -> Vec<(String, DatasetId)> {
	// Tier 1: the spec's listOfCovarianceTerms next to the term datasets.
	let mut terms = Vec::new();
	if let Some(list_id) = reader.find_dataset_by_path(&format!("{grid_path}/listOfCovarianceTerms")) {
		if let Ok(list) = reader.read_small_dataset(list_id).await {
			for name in list.value.texts() {
				let name = name.trim();
				if !is_known_term(name) {
					continue;
				}
				if let Some(id) = reader.find_dataset_by_path(&format!("{grid_path}/{name}")) {
					terms.push((name.to_string(), id));
				}
			}
		}
	}
	if !terms.is_empty() {
		sort_terms(&mut terms);
		return terms;
	}

	// Tier 2: match catalog path tails against the closed term set, preferring
	// candidates under the active frequency when duplicated.
	let needle = format!("frequency{letter}");
	let datasets = reader.list_datasets();
	for term in DIAGONAL_TERMS.iter().chain(OFF_DIAGONAL_TERMS.iter()) {
		let candidates: Vec<&DatasetSummary> = datasets
			.iter()
			.filter(|d| d.path.as_deref().is_some_and(|p| path_tail(p) == *term))
			.collect();
		let chosen = match candidates.len() {
			0 => None,
			1 => Some(candidates[0]),
			_ => candidates
				.iter()
				.find(|d| d.path.as_deref().is_some_and(|p| p.contains(&needle)))
				.copied()
				.or(Some(candidates[0])),
		};
		if let Some(dataset) = chosen {
			terms.push(((*term).to_string(), dataset.id));
		}
	}
	if !terms.is_empty() {
		sort_terms(&mut terms);
		return terms;
	}

	// Tier 3: shape/value heuristic over anonymous rasters.
	classify_terms_by_power(reader).await
}

/// Last-resort classification: sample the center chunk of each candidate
/// raster and order by mean power. The strongest is co-pol `HHHH`; for two
/// candidates a gap above 3 dB marks the second as cross-pol `HVHV`,
/// otherwise as the second co-pol `VVVV`.
async fn classify_terms_by_power(reader: &Hdf5Reader) -> Vec<(String, DatasetId)> {
	let rasters: Vec<DatasetSummary> = reader
		.list_datasets()
		.into_iter()
		.filter(|d| d.chunked && d.shape.len() == 2 && matches!(d.element_type, ElementType::F32 | ElementType::ComplexF32))
		.collect();
	if rasters.is_empty() {
		return Vec::new();
	}
	// All candidates must share a shape to be covariance terms of one grid.
	let shape = rasters[0].shape.clone();
	let rasters: Vec<_> = rasters.into_iter().filter(|d| d.shape == shape).collect();

	let mut ranked: Vec<(DatasetId, f64)> = Vec::new();
	for dataset in &rasters {
		let Some(chunk_dims) = &dataset.chunk_dims else { continue };
		let center = vec![
			(dataset.shape[0] / 2 / chunk_dims[0]) * chunk_dims[0],
			(dataset.shape[1] / 2 / chunk_dims[1]) * chunk_dims[1],
		];
		match reader.read_chunk(dataset.id, center).await {
			Ok(Some(buffer)) => {
				let valid: Vec<f32> = buffer.iter().copied().filter(|v| v.is_finite() && *v > 0.0).collect();
				if !valid.is_empty() {
					let mean = f64::from(valid.iter().sum::<f32>()) / valid.len() as f64;
					ranked.push((dataset.id, mean));
				}
			}
			Ok(None) => {}
			Err(err) => log::debug!("center chunk of {:?} unreadable: {err}", dataset.id),
		}
	}
	ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
	if ranked.is_empty() {
		return Vec::new();
	}

	log::warn!(
		"covariance terms not identifiable from paths; falling back to center-chunk power ranking over {} candidates",
		ranked.len()
	);

	let mut terms = vec![("HHHH".to_string(), ranked[0].0)];
	if ranked.len() >= 2 {
		// 3 dB in linear power is a factor of two.
		let gap_db = 10.0 * (ranked[0].1 / ranked[1].1.max(f64::MIN_POSITIVE)).log10();
		let second = if gap_db > 3.0 { "HVHV" } else { "VVVV" };
		log::warn!("power gap to second candidate is {gap_db:.1} dB; classifying it as {second}");
		terms.push((second.to_string(), ranked[1].0));
	}
	for (id, _) in ranked.iter().skip(2) {
		let name = DIAGONAL_TERMS
			.iter()
			.find(|t| !terms.iter().any(|(n, _)| n == *t))
			.copied()
			.unwrap_or("VHVH");
		terms.push((name.to_string(), *id));
	}
	terms
}

/// Finds an auxiliary dataset by spec path, falling back to a path-tail scan
/// that prefers the active frequency.
fn find_auxiliary(reader: &Hdf5Reader, grid_path: &str, name: &str, letter: char) -> Option<DatasetId> {
	if let Some(id) = reader.find_dataset_by_path(&format!("{grid_path}/{name}")) {
		return Some(id);
	}
	let needle = format!("frequency{letter}");
	let datasets = reader.list_datasets();
	let candidates: Vec<&DatasetSummary> = datasets
		.iter()
		.filter(|d| d.path.as_deref().is_some_and(|p| path_tail(p) == name))
		.collect();
	match candidates.len() {
		0 => None,
		1 => Some(candidates[0].id),
		_ => candidates
			.iter()
			.find(|d| d.path.as_deref().is_some_and(|p| p.contains(&needle)))
			.map(|d| d.id)
			.or(Some(candidates[0].id)),
	}
}

fn path_tail(path: &str) -> &str {
	path.rsplit('/').next().unwrap_or(path)
}

/// Diagonal terms first (display order), off-diagonals after, both in the
/// canonical sequence.
fn sort_terms(terms: &mut [(String, DatasetId)]) {
	let rank = |name: &str| -> usize {
		DIAGONAL_TERMS
			.iter()
			.chain(OFF_DIAGONAL_TERMS.iter())
			.position(|t| *t == name)
			.unwrap_or(usize::MAX)
	};
	terms.sort_by_key(|(name, _)| rank(name));
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn known_terms_cover_diagonal_and_off_diagonal() {
		assert!(is_known_term("HHHH"));
		assert!(is_known_term("HHVV"));
		assert!(!is_known_term("XXXX"));
		assert!(!is_known_term("mask"));
	}

	#[test]
	fn sort_orders_diagonals_first() {
		let mut terms = vec![
			("HHVV".to_string(), DatasetId(0)),
			("VVVV".to_string(), DatasetId(1)),
			("HHHH".to_string(), DatasetId(2)),
		];
		sort_terms(&mut terms);
		let names: Vec<&str> = terms.iter().map(|(n, _)| n.as_str()).collect();
		assert_eq!(names, vec!["HHHH", "VVVV", "HHVV"]);
	}

	#[test]
	fn path_tail_takes_final_segment() {
		assert_eq!(path_tail("/science/LSAR/GCOV/grids/frequencyA/HHHH"), "HHHH");
		assert_eq!(path_tail("HHHH"), "HHHH");
	}
}
