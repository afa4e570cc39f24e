//! NISAR-aware raster streaming on top of the cloud-optimized HDF5 reader:
//! product-structure discovery with multi-tier fallbacks, and tile services
//! that turn viewport requests into chunk reads, multi-looked in linear power
//! space, with bounded caches and progressive coarse-to-fine refinement.

pub mod product;
pub mod tile;

pub use product::*;
pub use tile::*;

pub use sarstream_hdf5::{Error, Result};
