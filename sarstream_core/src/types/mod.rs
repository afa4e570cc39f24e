//! Contains basic value types: byte buffers, byte ranges and the bounded cache.

mod blob;
pub use blob::*;

mod byte_range;
pub use byte_range::*;

mod limited_cache;
pub use limited_cache::*;
