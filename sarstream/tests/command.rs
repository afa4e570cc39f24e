//! End-to-end CLI tests against a synthesized GCOV file on disk.

use anyhow::Result;
use assert_cmd::Command;
use assert_fs::TempDir;
use sarstream_hdf5::testing::{GcovFileOptions, build_gcov_file};
use std::fs;

fn write_sample(dir: &TempDir) -> Result<std::path::PathBuf> {
	let path = dir.path().join("sample_gcov.h5");
	fs::write(&path, build_gcov_file(&GcovFileOptions::default()).as_slice())?;
	Ok(path)
}

#[test]
fn probe_prints_structure() -> Result<()> {
	let dir = TempDir::new()?;
	let path = write_sample(&dir)?;

	let output = Command::cargo_bin("sarstream")?
		.arg("probe")
		.arg(&path)
		.arg("--datasets")
		.output()?;
	assert!(output.status.success());

	let stdout = String::from_utf8(output.stdout)?;
	assert!(stdout.contains("band: LSAR"));
	assert!(stdout.contains("missionId: NISAR"));
	assert!(stdout.contains("HHHH, HVHV, VHVH, VVVV"));
	assert!(stdout.contains("EPSG:32611"));
	assert!(stdout.contains("mask: present"));
	assert!(stdout.contains("/science/LSAR/GCOV/grids/frequencyA/HHHH"));
	Ok(())
}

#[test]
fn tile_writes_raw_f32() -> Result<()> {
	let dir = TempDir::new()?;
	let path = write_sample(&dir)?;
	let out = dir.path().join("tile.f32");

	let output = Command::cargo_bin("sarstream")?
		.arg("tile")
		.arg(&path)
		.arg("--out")
		.arg(&out)
		.arg("--term")
		.arg("HVHV")
		.arg("--multi-look")
		.output()?;
	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

	let bytes = fs::read(&out)?;
	assert_eq!(bytes.len(), 256 * 256 * 4);

	// At least half the tile carries positive power.
	let valid = bytes
		.chunks_exact(4)
		.map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
		.filter(|&v| v > 0.0)
		.count();
	assert!(valid * 2 >= 256 * 256);
	Ok(())
}

#[test]
fn probe_fails_cleanly_on_missing_file() -> Result<()> {
	Command::cargo_bin("sarstream")?
		.arg("probe")
		.arg("/nonexistent/file.h5")
		.assert()
		.failure();
	Ok(())
}
