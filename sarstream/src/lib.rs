//! Streams NISAR L2 GCOV rasters straight out of cloud-hosted HDF5 files:
//! byte-range I/O, prefix-only metadata parsing, coalesced chunk reads and
//! progressive multi-looked tiles.
//!
//! This crate re-exports the workspace libraries under one roof:
//! - [`core`]: byte sources, blobs, byte ranges, the bounded LRU cache;
//! - [`hdf5`]: the cloud-optimized HDF5 reader;
//! - [`nisar`]: product resolution and the tile services.
//!
//! ```no_run
//! use sarstream::hdf5::{Hdf5Reader, MetadataOptions};
//! use sarstream::nisar::{GcovProduct, TileOptions, TileRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> sarstream::hdf5::Result<()> {
//!     let reader = Hdf5Reader::open_remote("https://example.com/gcov.h5", MetadataOptions::default()).await?;
//!     let product = GcovProduct::open(Arc::new(reader)).await?;
//!     let service = product.tile_service('A', "HHHH", TileOptions::default())?;
//!     service.prefetch_overview_chunks().await?;
//!     let tile = service
//!         .tile(&TileRequest {
//!             tile_x: 0,
//!             tile_y: 0,
//!             zoom: 0,
//!             bbox: [0.0, 0.0, 1e9, 1e9],
//!             multi_look: true,
//!         })
//!         .await?;
//!     println!("tile: {:?}", tile.map(|t| (t.width, t.height)));
//!     Ok(())
//! }
//! ```

pub use sarstream_core as core;
pub use sarstream_hdf5 as hdf5;
pub use sarstream_nisar as nisar;
