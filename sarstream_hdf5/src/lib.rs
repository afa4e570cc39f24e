//! Cloud-optimized HDF5 reading: parses the metadata prefix of a file into a
//! dataset catalog, then serves chunk, region and small-dataset reads over
//! byte-range I/O without ever materializing the whole file.
//!
//! The parser targets paged-aggregation layouts where metadata is
//! consolidated at the front of the file, plus the narrower NISAR product
//! convention; it is not a general HDF5 implementation.

mod catalog;
mod chunks;
mod decode;
mod error;
mod filters;
pub mod format;
mod parser;
mod reader;
mod region;

pub mod testing;

pub use catalog::*;
pub use chunks::{AdaptiveConcurrency, ChunkBuffer, ChunkEngine, DEFAULT_CHUNK_CACHE_CAP};
pub use decode::{DataValue, decode_f32, decode_values};
pub use error::{Error, Result};
pub use filters::{apply_inverse_pipeline, deflate, fletcher32, shuffle, unshuffle};
pub use parser::{MetadataOptions, parse_metadata};
pub use reader::{DatasetEndpoints, Hdf5Reader, SmallDataset};
pub use region::{RegionData, read_region};
