//! The region reader: stitches the chunks covering a rectangle into one dense
//! `f32` buffer. Sparse chunks leave zeros.

use crate::catalog::{ChunkKey, DatasetId};
use crate::chunks::ChunkEngine;
use crate::{Error, Result};

/// A dense rectangular read result.
#[derive(Clone, Debug)]
pub struct RegionData {
	pub data: Vec<f32>,
	pub width: usize,
	pub height: usize,
}

/// Reads `row_count × col_count` elements starting at `(row_start, col_start)`
/// from a chunked 2-D dataset.
///
/// The output always has the requested dimensions; parts that fall outside
/// the dataset or on sparse chunks stay zero.
pub async fn read_region(
	engine: &ChunkEngine,
	dataset: DatasetId,
	row_start: u64,
	col_start: u64,
	row_count: usize,
	col_count: usize,
) -> Result<RegionData> {
	let (shape, chunk_dims) = dataset_geometry(engine, dataset)?;
	let mut output = vec![0f32; row_count * col_count];
	if row_count == 0 || col_count == 0 || row_start >= shape.0 || col_start >= shape.1 {
		return Ok(RegionData {
			data: output,
			width: col_count,
			height: row_count,
		});
	}

	let row_end = (row_start + row_count as u64).min(shape.0);
	let col_end = (col_start + col_count as u64).min(shape.1);
	let (chunk_rows, chunk_cols) = chunk_dims;

	// Covering chunk rectangle.
	let first_chunk_row = row_start / chunk_rows;
	let last_chunk_row = (row_end - 1) / chunk_rows;
	let first_chunk_col = col_start / chunk_cols;
	let last_chunk_col = (col_end - 1) / chunk_cols;

	let mut keys: Vec<ChunkKey> = Vec::new();
	for chunk_row in first_chunk_row..=last_chunk_row {
		for chunk_col in first_chunk_col..=last_chunk_col {
			keys.push(vec![chunk_row * chunk_rows, chunk_col * chunk_cols]);
		}
	}

	let buffers = engine.read_chunks_batch(dataset, &keys).await?;

	for (key, buffer) in keys.iter().zip(buffers) {
		let Some(buffer) = buffer else { continue };
		let chunk_row0 = key[0];
		let chunk_col0 = key[1];

		// Intersection of this chunk with the requested region.
		let copy_row0 = chunk_row0.max(row_start);
		let copy_row1 = (chunk_row0 + chunk_rows).min(row_end);
		let copy_col0 = chunk_col0.max(col_start);
		let copy_col1 = (chunk_col0 + chunk_cols).min(col_end);

		for row in copy_row0..copy_row1 {
			let source_offset = ((row - chunk_row0) * chunk_cols + (copy_col0 - chunk_col0)) as usize;
			let target_offset = ((row - row_start) as usize) * col_count + (copy_col0 - col_start) as usize;
			let length = (copy_col1 - copy_col0) as usize;
			output[target_offset..target_offset + length]
				.copy_from_slice(&buffer[source_offset..source_offset + length]);
		}
	}

	Ok(RegionData {
		data: output,
		width: col_count,
		height: row_count,
	})
}

/// Shape and chunk dims of a chunked 2-D dataset.
fn dataset_geometry(engine: &ChunkEngine, dataset: DatasetId) -> Result<((u64, u64), (u64, u64))> {
	let (shape, chunk_dims) = engine.dataset_shape_and_chunks(dataset)?;
	if shape.len() != 2 || chunk_dims.len() != 2 {
		return Err(Error::MissingDataset(format!(
			"dataset {dataset:?} is not a chunked 2-D raster"
		)));
	}
	Ok(((shape[0], shape[1]), (chunk_dims[0], chunk_dims[1])))
}
