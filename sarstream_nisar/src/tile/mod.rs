//! Tile production: viewport translation, resampling, progressive
//! refinement and the multi-band compositing reads.

mod rgb;
mod sampling;
mod service;

pub use rgb::*;
pub use sampling::{MosaicGrid, SliceRect, looks_for_step, slice_from_bbox};
pub use service::*;
