mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{ErrorLevel, Verbosity};

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about,
	long_about = None,
	propagate_version = true,
	disable_help_subcommand = true,
)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[command(flatten)]
	verbose: Verbosity<ErrorLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Show the structure of a NISAR GCOV file (local path or https URL)
	Probe(tools::probe::Subcommand),

	/// Fetch one tile and write it as raw little-endian f32
	Tile(tools::tile::Subcommand),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	env_logger::Builder::new()
		.filter_level(cli.verbose.log_level_filter())
		.format_timestamp(None)
		.init();

	run(cli)
}

fn run(cli: Cli) -> Result<()> {
	match &cli.command {
		Commands::Probe(arguments) => tools::probe::run(arguments),
		Commands::Tile(arguments) => tools::tile::run(arguments),
	}
}

#[cfg(test)]
mod tests {
	use crate::{Cli, run};
	use anyhow::Result;
	use clap::Parser;

	pub fn run_command(arg_vec: Vec<&str>) -> Result<String> {
		let cli = Cli::try_parse_from(arg_vec)?;
		let msg = format!("{:?}", cli);
		run(cli)?;
		Ok(msg)
	}

	#[test]
	fn help() {
		let err = run_command(vec!["sarstream"]).unwrap_err().to_string();
		assert!(err.contains("Usage: sarstream"));
	}

	#[test]
	fn version() {
		let err = run_command(vec!["sarstream", "-V"]).unwrap_err().to_string();
		assert!(err.starts_with("sarstream "));
	}

	#[test]
	fn probe_subcommand_requires_source() {
		let err = run_command(vec!["sarstream", "probe"]).unwrap_err().to_string();
		assert!(err.contains("probe"));
	}
}
