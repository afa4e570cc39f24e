pub mod probe;
pub mod tile;

use anyhow::{Context, Result};
use sarstream_hdf5::{Hdf5Reader, MetadataOptions};
use std::path::Path;

/// Opens a reader over a local path or an http(s) URL.
pub async fn open_reader(source: &str, prefetch_mib: Option<u64>) -> Result<Hdf5Reader> {
	let options = match prefetch_mib {
		Some(mib) => MetadataOptions::with_prefetch_size(mib * 1024 * 1024),
		None => MetadataOptions::default(),
	};

	let reader = if source.starts_with("http://") || source.starts_with("https://") {
		Hdf5Reader::open_remote(source, options).await
	} else {
		let path = Path::new(source)
			.canonicalize()
			.with_context(|| format!("cannot resolve path '{source}'"))?;
		Hdf5Reader::open_local(&path, options).await
	};
	reader.with_context(|| format!("failed to open '{source}'"))
}
