//! End-to-end reader tests against synthesized GCOV-shaped files.

use anyhow::Result;
use sarstream_core::io::{DataSourceBlob, DataSourceTrait};
use sarstream_hdf5::testing::{GcovFileOptions, ProjectionStyle, TestFileBuilder, TestFilters, build_gcov_file, speckle_power};
use sarstream_hdf5::{DataValue, ElementType, Hdf5Reader, MetadataOptions};
use std::sync::Arc;

const TERM_PATHS: [&str; 4] = [
	"/science/LSAR/GCOV/grids/frequencyA/HHHH",
	"/science/LSAR/GCOV/grids/frequencyA/HVHV",
	"/science/LSAR/GCOV/grids/frequencyA/VHVH",
	"/science/LSAR/GCOV/grids/frequencyA/VVVV",
];

async fn open_default(options: &GcovFileOptions) -> Result<(Hdf5Reader, Arc<DataSourceBlob>)> {
	let blob = build_gcov_file(options);
	let source = Arc::new(*DataSourceBlob::new(blob));
	let reader = Hdf5Reader::open_source(source.clone(), MetadataOptions::default()).await?;
	Ok((reader, source))
}

#[tokio::test]
async fn open_and_list_datasets() -> Result<()> {
	let (reader, _) = open_default(&GcovFileOptions::default()).await?;

	let raster_count = reader
		.list_datasets()
		.iter()
		.filter(|d| d.shape.len() == 2 && d.element_type == ElementType::F32 && d.chunked)
		.count();
	assert!(raster_count >= 4, "expected at least four 2-D f32 rasters, got {raster_count}");

	for path in TERM_PATHS {
		let id = reader.find_dataset_by_path(path).unwrap_or_else(|| panic!("missing {path}"));
		let summary = reader
			.list_datasets()
			.into_iter()
			.find(|d| d.id == id)
			.unwrap();
		assert_eq!(summary.shape, vec![512, 512]);
		assert_eq!(summary.chunk_dims, Some(vec![128, 128]));
		assert_eq!(summary.chunk_count, 16);
	}

	// The mask rides along as a u8 raster.
	let mask = reader
		.find_dataset_by_path("/science/LSAR/GCOV/grids/frequencyA/mask")
		.expect("missing mask");
	let (shape, element_type) = reader.dataset_shape(mask)?;
	assert_eq!(shape, vec![512, 512]);
	assert_eq!(element_type, ElementType::U8);
	Ok(())
}

#[tokio::test]
async fn chunk_fidelity() -> Result<()> {
	let (reader, _) = open_default(&GcovFileOptions::default()).await?;
	let id = reader.find_dataset_by_path(TERM_PATHS[0]).unwrap();

	let chunk = reader.read_chunk(id, vec![0, 0]).await?.expect("chunk (0,0) present");
	assert_eq!(chunk.len(), 128 * 128);

	for (r, c) in [(0u64, 0u64), (1, 7), (64, 64), (127, 127)] {
		let expected = speckle_power(0, r, c);
		assert_eq!(chunk[(r * 128 + c) as usize], expected, "mismatch at ({r},{c})");
	}

	let positive_mean = chunk.iter().filter(|&&v| v > 0.0).sum::<f32>() / chunk.len() as f32;
	assert!(positive_mean > 0.0);
	Ok(())
}

#[tokio::test]
async fn chunk_in_second_btree_leaf() -> Result<()> {
	// 16 chunks split the index into two leaves under an internal node.
	let (reader, _) = open_default(&GcovFileOptions::default()).await?;
	let id = reader.find_dataset_by_path(TERM_PATHS[1]).unwrap();

	let chunk = reader.read_chunk(id, vec![384, 384]).await?.expect("last chunk present");
	assert_eq!(chunk[0], speckle_power(1, 384, 384));
	Ok(())
}

#[tokio::test]
async fn region_read_crosses_chunk_boundaries() -> Result<()> {
	let (reader, _) = open_default(&GcovFileOptions::default()).await?;
	let id = reader.find_dataset_by_path(TERM_PATHS[0]).unwrap();

	let region = reader.read_region(id, 100, 96, 64, 80).await?;
	assert_eq!(region.height, 64);
	assert_eq!(region.width, 80);
	assert_eq!(region.data.len(), 64 * 80);

	for (row_offset, col_offset) in [(0usize, 0usize), (27, 31), (63, 79)] {
		let expected = speckle_power(0, 100 + row_offset as u64, 96 + col_offset as u64);
		assert_eq!(region.data[row_offset * 80 + col_offset], expected);
	}
	Ok(())
}

#[tokio::test]
async fn region_clips_to_dataset_and_zero_fills() -> Result<()> {
	let (reader, _) = open_default(&GcovFileOptions::default()).await?;
	let id = reader.find_dataset_by_path(TERM_PATHS[0]).unwrap();

	// Region extends 32 rows and columns past the 512-pixel edge.
	let region = reader.read_region(id, 480, 480, 64, 64).await?;
	assert_eq!(region.data.len(), 64 * 64);
	assert_eq!(region.data[(32 * 64) + 32], 0.0, "out-of-bounds area must be zero");
	assert_eq!(region.data[0], speckle_power(0, 480, 480));
	Ok(())
}

#[tokio::test]
async fn sparse_chunk_reads_as_none_and_zeros() -> Result<()> {
	let options = GcovFileOptions {
		sparse: vec![(0, 128)],
		..GcovFileOptions::default()
	};
	let (reader, _) = open_default(&options).await?;
	let id = reader.find_dataset_by_path(TERM_PATHS[0]).unwrap();

	assert!(reader.read_chunk(id, vec![0, 128]).await?.is_none(), "sparse chunk is None");
	assert!(reader.read_chunk(id, vec![0, 0]).await?.is_some());

	// The region covering the hole gets zeros there, data elsewhere.
	let region = reader.read_region(id, 0, 0, 128, 256).await?;
	assert_eq!(region.data[10 * 256 + 200], 0.0);
	assert_eq!(region.data[10 * 256 + 100], speckle_power(0, 10, 100));
	Ok(())
}

#[tokio::test]
async fn repeated_chunk_reads_hit_the_cache() -> Result<()> {
	let (reader, source) = open_default(&GcovFileOptions::default()).await?;
	let id = reader.find_dataset_by_path(TERM_PATHS[0]).unwrap();

	reader.read_chunk(id, vec![0, 0]).await?;
	let after_first = source.read_count();
	for _ in 0..5 {
		reader.read_chunk(id, vec![0, 0]).await?;
	}
	assert_eq!(source.read_count(), after_first, "cache hits must not touch the source");
	Ok(())
}

#[tokio::test]
async fn sparse_results_are_cached_too() -> Result<()> {
	let options = GcovFileOptions {
		sparse: vec![(0, 128)],
		..GcovFileOptions::default()
	};
	let (reader, source) = open_default(&options).await?;
	let id = reader.find_dataset_by_path(TERM_PATHS[0]).unwrap();

	reader.read_chunk(id, vec![0, 128]).await?;
	let after_first = source.read_count();
	reader.read_chunk(id, vec![0, 128]).await?;
	assert_eq!(source.read_count(), after_first);
	Ok(())
}

#[tokio::test]
async fn batch_reads_coalesce_into_few_requests() -> Result<()> {
	let (reader, source) = open_default(&GcovFileOptions::default()).await?;
	let id = reader.find_dataset_by_path(TERM_PATHS[0]).unwrap();

	let keys: Vec<Vec<u64>> = (0..4)
		.flat_map(|r| (0..4).map(move |c| vec![r * 128, c * 128]))
		.collect();

	let before = source.read_count();
	let chunks = reader.read_chunks_batch(id, &keys).await?;
	let requests = source.read_count() - before;

	assert_eq!(chunks.len(), 16);
	assert!(chunks.iter().all(Option::is_some));
	// Chunks are adjacent on disk; 16 reads must collapse to a handful.
	assert!(requests <= 3, "expected coalesced requests, got {requests}");
	Ok(())
}

#[tokio::test]
async fn btree_beyond_prefix_is_fetched_on_demand() -> Result<()> {
	let options = GcovFileOptions {
		btrees_beyond_prefix: true,
		..GcovFileOptions::default()
	};
	let blob = build_gcov_file(&options);
	let source = Arc::new(*DataSourceBlob::new(blob));
	// 64 KiB of prefix covers the object headers but not the B-trees.
	let reader = Hdf5Reader::open_source(source.clone(), MetadataOptions::with_prefetch_size(64 * 1024)).await?;

	let id = reader
		.find_dataset_by_path(TERM_PATHS[0])
		.expect("dataset registered without chunk index");

	let chunk = reader.read_chunk(id, vec![256, 256]).await?.expect("chunk readable");
	assert_eq!(chunk[0], speckle_power(0, 256, 256));
	Ok(())
}

#[tokio::test]
async fn endpoints_of_contiguous_coordinates() -> Result<()> {
	let options = GcovFileOptions::default();
	let (reader, _) = open_default(&options).await?;
	let id = reader
		.find_dataset_by_path("/science/LSAR/GCOV/grids/frequencyA/xCoordinates")
		.unwrap();

	let endpoints = reader.read_dataset_endpoints(id).await?;
	assert_eq!(endpoints.length, 512);
	assert_eq!(endpoints.first, 500_000.0);
	assert_eq!(endpoints.last, 500_000.0 + 511.0 * 20.0);
	Ok(())
}

#[tokio::test]
async fn endpoints_of_chunked_coordinates() -> Result<()> {
	let mut b = TestFileBuilder::new();
	let values: Vec<f64> = (0..1000).map(|i| 1000.0 + f64::from(i) * 0.5).collect();
	let coords = b.add_chunked_f64_1d(&values, 256, TestFilters::deflate_only());
	let root = b.add_group(&[("coords", coords)], &[]);
	let blob = b.finish(root);

	let source = Arc::new(*DataSourceBlob::new(blob));
	let reader = Hdf5Reader::open_source(source, MetadataOptions::default()).await?;
	let id = reader.find_dataset_by_path("/coords").unwrap();

	let endpoints = reader.read_dataset_endpoints(id).await?;
	assert_eq!(endpoints.length, 1000);
	assert_eq!(endpoints.first, 1000.0);
	assert_eq!(endpoints.last, 1000.0 + 999.0 * 0.5);
	Ok(())
}

#[tokio::test]
async fn small_dataset_reads() -> Result<()> {
	let (reader, _) = open_default(&GcovFileOptions::default()).await?;

	let terms = reader
		.find_dataset_by_path("/science/LSAR/GCOV/grids/frequencyA/listOfCovarianceTerms")
		.unwrap();
	let terms = reader.read_small_dataset(terms).await?;
	assert_eq!(terms.value.texts(), &["HHHH", "HVHV", "VHVH", "VVVV"]);

	let mission = reader
		.find_dataset_by_path("/science/LSAR/identification/missionId")
		.unwrap();
	let mission = reader.read_small_dataset(mission).await?;
	assert_eq!(mission.value.get_text(0), Some("NISAR"));

	let projection = reader
		.find_dataset_by_path("/science/LSAR/GCOV/grids/frequencyA/projection")
		.unwrap();
	let projection = reader.read_small_dataset(projection).await?;
	assert_eq!(projection.value.get_f64(0), Some(32611.0));

	let x_coords = reader
		.find_dataset_by_path("/science/LSAR/GCOV/grids/frequencyA/xCoordinates")
		.unwrap();
	let x_coords = reader.read_small_dataset(x_coords).await?;
	match &x_coords.value {
		DataValue::F64(values) => {
			assert_eq!(values.len(), 512);
			// Full f64 precision must survive the read.
			assert_eq!(values[1] - values[0], 20.0);
		}
		other => panic!("expected F64 coordinates, got {other:?}"),
	}
	Ok(())
}

#[tokio::test]
async fn attributes_are_catalogued() -> Result<()> {
	let options = GcovFileOptions {
		projection: ProjectionStyle::Attribute,
		epsg: 32618,
		..GcovFileOptions::default()
	};
	let (reader, _) = open_default(&options).await?;

	let projection = reader
		.find_dataset_by_path("/science/LSAR/GCOV/grids/frequencyA/projection")
		.unwrap();
	let attributes = reader.dataset_attributes(projection)?;
	assert_eq!(attributes.get("epsg_code").and_then(|a| a.as_int()), Some(32618));

	let group_attributes = reader.group_attributes("/science/LSAR/identification").unwrap();
	assert_eq!(
		group_attributes.get("productType").and_then(|a| a.as_text().map(str::to_owned)),
		Some("GCOV".to_string())
	);
	Ok(())
}

#[tokio::test]
async fn datasets_found_by_scan_when_traversal_fails() -> Result<()> {
	let blob = build_gcov_file(&GcovFileOptions::default());
	// Point the superblock's root address into the void; only the OHDR scan
	// pass can discover the datasets now. The root address field sits at
	// offset 36 of a v2 superblock with 8-byte addresses.
	let mut bytes = blob.into_vec();
	bytes[36..44].copy_from_slice(&u64::MAX.to_le_bytes());

	let source = Arc::new(*DataSourceBlob::new(bytes.into()));
	let reader = Hdf5Reader::open_source(source, MetadataOptions::default()).await?;

	let rasters: Vec<_> = reader
		.list_datasets()
		.into_iter()
		.filter(|d| d.shape == vec![512, 512] && d.element_type == ElementType::F32)
		.collect();
	assert!(rasters.len() >= 4, "scan passes must still find the rasters");

	// Chunk data remains readable without any path information.
	let chunk = reader.read_chunk(rasters[0].id, vec![0, 0]).await?;
	assert!(chunk.is_some());
	Ok(())
}

#[tokio::test]
async fn open_rejects_non_hdf5() {
	let source = Arc::new(*DataSourceBlob::new(vec![0u8; 4096].into()));
	let result = Hdf5Reader::open_source(source, MetadataOptions::default()).await;
	assert!(matches!(result, Err(sarstream_hdf5::Error::Format(_))));
}
