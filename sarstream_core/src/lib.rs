//! Shared primitives for the sarstream crates: byte buffers, byte ranges,
//! bounded LRU caches, binary value readers and random-access data sources.

pub mod io;
pub mod types;
pub use types::*;
