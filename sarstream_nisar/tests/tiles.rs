//! Tile service behavior: direct and progressive paths, caches, masks and
//! multi-band coalescing, all against synthesized files.

use sarstream_core::io::DataSourceBlob;
use sarstream_hdf5::testing::{GcovFileOptions, build_gcov_file};
use sarstream_hdf5::{Hdf5Reader, MetadataOptions, Result};
use sarstream_nisar::{GcovProduct, TileOptions, TileRequest};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

async fn open_product(options: &GcovFileOptions) -> Result<(GcovProduct, Arc<DataSourceBlob>)> {
	let blob = build_gcov_file(options);
	let source = Arc::new(*DataSourceBlob::new(blob));
	let reader = Hdf5Reader::open_source(source.clone(), MetadataOptions::default()).await?;
	let product = GcovProduct::open(Arc::new(reader)).await?;
	Ok((product, source))
}

fn full_image_request(multi_look: bool) -> TileRequest {
	TileRequest {
		tile_x: 0,
		tile_y: 0,
		zoom: 0,
		bbox: [0.0, 0.0, 512.0, 512.0],
		multi_look,
	}
}

fn variance(values: &[f32]) -> f64 {
	let valid: Vec<f64> = values.iter().filter(|v| **v > 0.0).map(|&v| f64::from(v)).collect();
	let mean = valid.iter().sum::<f64>() / valid.len() as f64;
	valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / valid.len() as f64
}

#[tokio::test]
async fn full_image_tile_is_tile_sized_and_populated() -> Result {
	let (product, _) = open_product(&GcovFileOptions::default()).await?;
	let service = product.tile_service('A', "HHHH", TileOptions::default())?;

	let tile = service.tile(&full_image_request(false)).await?.expect("tile present");
	assert_eq!(tile.width, 256);
	assert_eq!(tile.height, 256);
	assert_eq!(tile.data.len(), 256 * 256);

	let non_zero = tile.data.iter().filter(|&&v| v > 0.0).count();
	assert!(non_zero * 2 >= tile.data.len(), "at least half the pixels carry power");
	assert!(tile.data.iter().all(|&v| v >= 0.0), "power representation is non-negative");
	Ok(())
}

#[tokio::test]
async fn world_bbox_selects_the_same_full_image() -> Result {
	let (product, _) = open_product(&GcovFileOptions::default()).await?;
	let service = product.tile_service('A', "HHHH", TileOptions::default())?;

	let bounds = product.primary_frequency()?.world_bounds.unwrap();
	let request = TileRequest {
		tile_x: 9,
		tile_y: 9,
		zoom: 0,
		bbox: [bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y],
		multi_look: false,
	};
	let tile = service.tile(&request).await?.expect("tile present");
	let non_zero = tile.data.iter().filter(|&&v| v > 0.0).count();
	assert!(non_zero * 2 >= tile.data.len());
	Ok(())
}

#[tokio::test]
async fn bbox_outside_image_returns_none() -> Result {
	let (product, _) = open_product(&GcovFileOptions::default()).await?;
	let service = product.tile_service('A', "HHHH", TileOptions::default())?;

	let request = TileRequest {
		tile_x: 1,
		tile_y: 0,
		zoom: 0,
		bbox: [600.0, 600.0, 900.0, 900.0],
		multi_look: false,
	};
	assert!(service.tile(&request).await?.is_none());
	Ok(())
}

#[tokio::test]
async fn multi_look_reduces_variance() -> Result {
	let (product, _) = open_product(&GcovFileOptions::default()).await?;
	let service = product.tile_service('A', "HHHH", TileOptions::default())?;

	let preview = service.tile(&full_image_request(false)).await?.unwrap();
	let averaged = service.tile(&full_image_request(true)).await?.unwrap();

	assert!(
		variance(&averaged.data) < variance(&preview.data),
		"speckle reduction: multi-look variance must be strictly lower"
	);
	Ok(())
}

#[tokio::test]
async fn mask_rides_along_with_categories() -> Result {
	let (product, _) = open_product(&GcovFileOptions::default()).await?;
	let service = product.tile_service('A', "HHHH", TileOptions::default())?;
	assert!(service.has_mask());

	let tile = service.tile(&full_image_request(false)).await?.unwrap();
	let mask = tile.mask.as_ref().expect("mask present");
	assert_eq!(mask.len(), 256 * 256);

	// The synthesized mask holds fill at the border and categories inside.
	assert!(mask.iter().all(|&v| v <= 5 || v == 255));
	let valid = mask.iter().filter(|&&v| (1..=5).contains(&v)).count();
	assert!(valid * 2 >= mask.len(), "interior categories dominate");
	assert!(mask.iter().any(|&v| v == 255), "fill border visible at tile edge");
	Ok(())
}

#[tokio::test]
async fn tile_cache_hit_is_identical_and_free() -> Result {
	let (product, source) = open_product(&GcovFileOptions::default()).await?;
	let service = product.tile_service('A', "HHHH", TileOptions::default())?;

	let first = service.tile(&full_image_request(true)).await?.unwrap();
	let reads_after_first = source.read_count();

	let second = service.tile(&full_image_request(true)).await?.unwrap();
	assert_eq!(source.read_count(), reads_after_first, "cache hit issues zero source reads");
	assert!(Arc::ptr_eq(&first, &second), "cache returns the identical tile");
	Ok(())
}

#[tokio::test]
async fn tile_cache_is_bounded_lru() -> Result {
	let (product, _) = open_product(&GcovFileOptions::default()).await?;
	let options = TileOptions {
		tile_cache_cap: 4,
		..TileOptions::default()
	};
	let service = product.tile_service('A', "HHHH", options)?;

	let request_for = |i: i64| TileRequest {
		tile_x: i,
		tile_y: 0,
		zoom: 1,
		// Distinct strips of the image.
		bbox: [i as f64 * 64.0, 0.0, i as f64 * 64.0 + 64.0, 512.0],
		multi_look: false,
	};

	let mut last = None;
	for i in 0..7 {
		last = service.tile(&request_for(i)).await?;
	}

	assert_eq!(service.cached_tile_count(), 4, "cache size is exactly the cap");

	// The most recently requested tile is still resident.
	let again = service.tile(&request_for(6)).await?.unwrap();
	assert!(Arc::ptr_eq(&last.unwrap(), &again));
	Ok(())
}

#[tokio::test]
async fn prefetch_makes_overview_tile_free() -> Result {
	let (product, source) = open_product(&GcovFileOptions::default()).await?;
	let service = product.tile_service('A', "HHHH", TileOptions::default())?;

	service.prefetch_overview_chunks().await?;
	let reads_after_prefetch = source.read_count();

	// The full-image slice reads exactly the chunks the prefetch warmed;
	// only the mask layer may still touch the source.
	let tile = service.tile(&full_image_request(false)).await?.unwrap();
	let data_reads = source.read_count() - reads_after_prefetch;
	assert!(tile.data.iter().any(|&v| v > 0.0));
	assert!(data_reads <= 1, "overview tile served from warmed cache, saw {data_reads} reads");
	Ok(())
}

fn large_single_term() -> GcovFileOptions {
	GcovFileOptions {
		shape: (1024, 1024),
		chunk: (64, 64),
		terms: vec!["HHHH"],
		include_mask: false,
		..GcovFileOptions::default()
	}
}

#[tokio::test]
async fn large_region_refines_in_background() -> Result {
	let (product, _) = open_product(&large_single_term()).await?;
	let service = product.tile_service('A', "HHHH", TileOptions::default())?;

	let (sender, receiver) = mpsc::channel();
	service.set_on_refine(Arc::new(move |key| {
		let _ = sender.send(key);
	}));

	let request = TileRequest {
		tile_x: 3,
		tile_y: 5,
		zoom: 2,
		bbox: [0.0, 0.0, 1024.0, 1024.0],
		multi_look: false,
	};
	let coarse = service.tile(&request).await?.expect("coarse tile served immediately");
	assert_eq!(coarse.data.len(), 256 * 256);

	// The refinement callback fires with the same tile key.
	let mut fired = None;
	for _ in 0..300 {
		if let Ok(key) = receiver.try_recv() {
			fired = Some(key);
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert_eq!(fired, Some((3, 5, 2, false)), "refinement callback fired");

	// The refined tile replaces the coarse one under the same key and keeps
	// the raw speckle texture the coarse mosaic smoothed away.
	let refined = service.tile(&request).await?.unwrap();
	assert!(!Arc::ptr_eq(&coarse, &refined), "refined tile replaces the coarse tile");
	assert!(
		variance(&refined.data) > variance(&coarse.data) * 2.0,
		"refined sampling restores speckle variance"
	);

	let coarse_distinct: std::collections::BTreeSet<u32> = coarse.data.iter().map(|v| v.to_bits()).collect();
	let refined_distinct: std::collections::BTreeSet<u32> = refined.data.iter().map(|v| v.to_bits()).collect();
	assert!(refined_distinct.len() >= coarse_distinct.len());
	Ok(())
}

#[tokio::test]
async fn rgb_dual_pol_coalesces_reads() -> Result {
	let options = GcovFileOptions {
		shape: (1024, 1024),
		chunk: (256, 256),
		terms: vec!["HHHH", "HVHV"],
		include_mask: false,
		..GcovFileOptions::default()
	};
	let (product, source) = open_product(&options).await?;
	let service = product.rgb_service('A', &["HHHH", "HVHV"], TileOptions::default())?;

	let request = TileRequest {
		tile_x: 0,
		tile_y: 0,
		zoom: 0,
		bbox: [0.0, 0.0, 1024.0, 1024.0],
		multi_look: false,
	};
	let before = source.read_count();
	let tile = service.rgb_tile(&request).await?.expect("rgb tile present");
	let requests = source.read_count() - before;

	// 16 chunks per band; far fewer range requests after coalescing.
	assert!(requests <= 8, "dual-pol overview must coalesce, saw {requests} requests");

	for term in ["HHHH", "HVHV"] {
		let band = &tile.bands[term];
		assert_eq!(band.len(), 256 * 256);
		let non_zero = band.iter().filter(|&&v| v > 0.0).count();
		assert!(non_zero * 2 >= band.len(), "band {term} populated");
	}
	Ok(())
}

#[tokio::test]
async fn rgb_missing_band_zero_fills() -> Result {
	let options = GcovFileOptions {
		shape: (1024, 1024),
		chunk: (256, 256),
		terms: vec!["HHHH", "HVHV"],
		include_mask: false,
		..GcovFileOptions::default()
	};
	let (product, _) = open_product(&options).await?;
	let service = product.rgb_service('A', &["HHHH", "HVHV", "VVVV"], TileOptions::default())?;

	let request = TileRequest {
		tile_x: 0,
		tile_y: 0,
		zoom: 0,
		bbox: [0.0, 0.0, 1024.0, 1024.0],
		multi_look: false,
	};
	let tile = service.rgb_tile(&request).await?.unwrap();

	assert!(tile.bands["HHHH"].iter().any(|&v| v > 0.0));
	assert!(tile.bands["VVVV"].iter().all(|&v| v == 0.0), "missing band zero-fills");
	Ok(())
}

#[tokio::test]
async fn rgb_multi_look_averages_in_power() -> Result {
	let options = large_single_term();
	let (product, _) = open_product(&options).await?;
	let structure = product.primary_frequency()?;
	let service = sarstream_nisar::RgbTileService::new(product.reader(), structure, &["HHHH"], TileOptions::default())?;

	let request = |multi_look| TileRequest {
		tile_x: 0,
		tile_y: 0,
		zoom: 0,
		bbox: [0.0, 0.0, 1024.0, 1024.0],
		multi_look,
	};
	let preview = service.rgb_tile(&request(false)).await?.unwrap();
	let averaged = service.rgb_tile(&request(true)).await?.unwrap();
	assert!(variance(&averaged.bands["HHHH"]) < variance(&preview.bands["HHHH"]));
	Ok(())
}
