//! World-bounds and pixel-spacing resolution with the three-tier policy:
//! full coordinate arrays, endpoint reads, then origin plus spacing.

use sarstream_hdf5::{DataValue, DatasetId, Hdf5Reader};

/// Georeferenced bounds of the raster grid in projection units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldBounds {
	pub min_x: f64,
	pub min_y: f64,
	pub max_x: f64,
	pub max_y: f64,
}

impl WorldBounds {
	pub fn width(&self) -> f64 {
		self.max_x - self.min_x
	}

	pub fn height(&self) -> f64 {
		self.max_y - self.min_y
	}
}

/// Resolved axis metadata.
#[derive(Clone, Debug, Default)]
pub struct ResolvedAxes {
	pub world_bounds: Option<WorldBounds>,
	pub x_spacing: Option<f64>,
	pub y_spacing: Option<f64>,
}

/// Resolves both axes. `shape` is `(rows, cols)`; the x axis pairs with
/// columns and the y axis with rows.
pub async fn resolve_axes(
	reader: &Hdf5Reader,
	shape: (u64, u64),
	x_coordinates: Option<DatasetId>,
	y_coordinates: Option<DatasetId>,
	x_spacing_dataset: Option<DatasetId>,
	y_spacing_dataset: Option<DatasetId>,
) -> ResolvedAxes {
	let x_spacing_authoritative = read_spacing(reader, x_spacing_dataset).await;
	let y_spacing_authoritative = read_spacing(reader, y_spacing_dataset).await;

	let x_axis = resolve_axis(reader, x_coordinates, x_spacing_authoritative, shape.1, "x").await;
	let y_axis = resolve_axis(reader, y_coordinates, y_spacing_authoritative, shape.0, "y").await;

	let world_bounds = match (&x_axis, &y_axis) {
		(Some(x), Some(y)) => Some(WorldBounds {
			min_x: x.min,
			max_x: x.max,
			min_y: y.min,
			max_y: y.max,
		}),
		_ => None,
	};

	// Spacing datasets are authoritative; array-derived spacing fills gaps.
	ResolvedAxes {
		world_bounds,
		x_spacing: x_spacing_authoritative.or(x_axis.as_ref().and_then(|a| a.derived_spacing)),
		y_spacing: y_spacing_authoritative.or(y_axis.as_ref().and_then(|a| a.derived_spacing)),
	}
}

#[derive(Clone, Copy, Debug)]
struct ResolvedAxis {
	min: f64,
	max: f64,
	derived_spacing: Option<f64>,
}

async fn resolve_axis(
	reader: &Hdf5Reader,
	coordinates: Option<DatasetId>,
	spacing: Option<f64>,
	grid_length: u64,
	axis: &str,
) -> Option<ResolvedAxis> {
	let id = coordinates?;

	// Tier 1: the whole coordinate array.
	if let Ok(dataset) = reader.read_small_dataset(id).await {
		if let DataValue::F64(values) = &dataset.value {
			if !values.is_empty() {
				if values.len() as u64 != grid_length {
					log::warn!(
						"{axis} coordinate array has {} entries but the grid is {grid_length} wide; proceeding",
						values.len()
					);
				}
				let first = values[0];
				let last = values[values.len() - 1];
				return Some(axis_from_endpoints(first, last, values.len() as u64));
			}
		}
	}

	// Tier 2: endpoint-only read.
	if let Ok(endpoints) = reader.read_dataset_endpoints(id).await {
		if endpoints.length != grid_length {
			log::warn!(
				"{axis} coordinate array has {} entries but the grid is {grid_length} wide; proceeding",
				endpoints.length
			);
		}
		return Some(axis_from_endpoints(endpoints.first, endpoints.last, endpoints.length));
	}

	// Tier 3: first element plus authoritative spacing.
	let spacing = spacing?;
	let origin = read_first_element(reader, id).await?;
	let last = origin + (grid_length.saturating_sub(1)) as f64 * spacing;
	log::debug!("{axis} bounds derived from origin {origin} and spacing {spacing}");
	Some(axis_from_endpoints(origin, last, grid_length))
}

fn axis_from_endpoints(first: f64, last: f64, length: u64) -> ResolvedAxis {
	let derived_spacing = if length > 1 {
		Some(((last - first) / (length - 1) as f64).abs())
	} else {
		None
	};
	ResolvedAxis {
		min: first.min(last),
		max: first.max(last),
		derived_spacing,
	}
}

async fn read_spacing(reader: &Hdf5Reader, dataset: Option<DatasetId>) -> Option<f64> {
	let id = dataset?;
	match reader.read_small_dataset(id).await {
		Ok(dataset) => dataset.value.get_f64(0).map(f64::abs).filter(|s| *s > 0.0),
		Err(err) => {
			log::debug!("spacing dataset unreadable: {err}");
			None
		}
	}
}

async fn read_first_element(reader: &Hdf5Reader, id: DatasetId) -> Option<f64> {
	reader.read_dataset_endpoints(id).await.ok().map(|e| e.first)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn endpoints_order_independent() {
		// Descending y coordinates still produce min < max.
		let axis = axis_from_endpoints(4_100_000.0, 4_089_780.0, 512);
		assert_eq!(axis.min, 4_089_780.0);
		assert_eq!(axis.max, 4_100_000.0);
		assert_eq!(axis.derived_spacing, Some(20.0));
	}

	#[test]
	fn single_element_axis_has_no_spacing() {
		let axis = axis_from_endpoints(7.0, 7.0, 1);
		assert_eq!(axis.derived_spacing, None);
	}
}
