use anyhow::{Context, Result, ensure};
use sarstream_nisar::{GcovProduct, TileOptions, TileRequest};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// local file or pre-signed https URL of a NISAR GCOV product
	#[arg(required = true)]
	source: String,

	/// output file for the raw little-endian f32 tile
	#[arg(long, short, required = true)]
	out: PathBuf,

	/// covariance term to sample
	#[arg(long, short, default_value = "HHHH")]
	term: String,

	/// frequency sub-band
	#[arg(long, short, default_value = "A")]
	frequency: char,

	/// bounding box as min-x,min-y,max-x,max-y (world or pixel coordinates);
	/// defaults to the full image
	#[arg(long, short, value_delimiter = ',', num_args = 4, allow_hyphen_values = true)]
	bbox: Option<Vec<f64>>,

	/// output tile edge length in pixels
	#[arg(long, default_value_t = 256)]
	tile_size: usize,

	/// average sub-samples in linear power instead of nearest-neighbor
	#[arg(long, short)]
	multi_look: bool,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let reader = super::open_reader(&arguments.source, None).await?;
	let product = GcovProduct::open(Arc::new(reader)).await?;

	let structure = product
		.frequency(arguments.frequency)
		.with_context(|| format!("frequency {} not present", arguments.frequency))?;
	let (rows, cols) = structure.shape;

	let options = TileOptions {
		tile_size: arguments.tile_size,
		..TileOptions::default()
	};
	let service = product.tile_service(arguments.frequency, &arguments.term, options)?;
	service.prefetch_overview_chunks().await?;

	let bbox = match &arguments.bbox {
		Some(values) => [values[0], values[1], values[2], values[3]],
		None => [0.0, 0.0, cols as f64, rows as f64],
	};
	let request = TileRequest {
		tile_x: 0,
		tile_y: 0,
		zoom: 0,
		bbox,
		multi_look: arguments.multi_look,
	};

	let tile = service
		.tile(&request)
		.await?
		.context("bbox does not intersect the image")?;

	ensure!(tile.data.len() == arguments.tile_size * arguments.tile_size);
	let bytes: Vec<u8> = tile.data.iter().flat_map(|v| v.to_le_bytes()).collect();
	std::fs::write(&arguments.out, &bytes).with_context(|| format!("cannot write {:?}", arguments.out))?;

	let valid = tile.data.iter().filter(|&&v| v > 0.0).count();
	let peak = tile.data.iter().copied().fold(0f32, f32::max);
	println!(
		"wrote {} ({}x{}, {:.1}% valid, peak power {peak:.6})",
		arguments.out.display(),
		tile.width,
		tile.height,
		100.0 * valid as f64 / tile.data.len() as f64
	);

	Ok(())
}
