use anyhow::Result;
use colored::Colorize;
use sarstream_nisar::GcovProduct;
use std::sync::Arc;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// local file or pre-signed https URL of a NISAR GCOV product
	#[arg(required = true)]
	source: String,

	/// metadata prefetch size in MiB (default 8, maximum 32)
	#[arg(long, short)]
	prefetch: Option<u64>,

	/// also list every dataset in the catalog
	#[arg(long, short)]
	datasets: bool,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	log::debug!("open {:?}", arguments.source);
	let reader = super::open_reader(&arguments.source, arguments.prefetch).await?;
	println!("{} {} ({} bytes)", "source:".bold(), reader.name(), reader.size());

	let summaries = reader.list_datasets();
	println!("{} {} datasets in catalog", "catalog:".bold(), summaries.len());
	if arguments.datasets {
		for dataset in &summaries {
			println!(
				"  {:<60} {:>14} {:?} chunks: {}",
				dataset.path.as_deref().unwrap_or("(no path)"),
				format!("{:?}", dataset.shape),
				dataset.element_type,
				dataset.chunk_count
			);
		}
	}

	let product = GcovProduct::open(Arc::new(reader)).await?;
	println!("{} {}", "band:".bold(), product.band().name());

	if !product.identification().is_empty() {
		println!("{}", "identification:".bold());
		for (field, value) in product.identification() {
			println!("  {field}: {value}");
		}
	}

	for frequency in product.frequencies() {
		println!("{} {}", "frequency:".bold(), frequency.frequency);
		println!("  grid: {} x {} pixels", frequency.shape.0, frequency.shape.1);
		println!("  crs: EPSG:{}", frequency.epsg);
		if let Some(bounds) = &frequency.world_bounds {
			println!(
				"  bounds: x {} .. {}, y {} .. {}",
				bounds.min_x, bounds.max_x, bounds.min_y, bounds.max_y
			);
		}
		if let (Some(dx), Some(dy)) = (frequency.x_spacing, frequency.y_spacing) {
			println!("  spacing: {dx} x {dy}");
		}
		let terms: Vec<&str> = frequency.terms.iter().map(|(n, _)| n.as_str()).collect();
		println!("  terms: {}", terms.join(", "));
		println!("  mask: {}", if frequency.has_mask() { "present" } else { "absent" });
	}

	Ok(())
}
