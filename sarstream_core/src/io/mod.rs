//! Random-access data sources (local file, HTTP byte-range, in-memory blob)
//! and the binary value reader used to parse file-format structures.

mod data_source;
mod data_source_blob;
mod data_source_file;
mod data_source_http;
mod value_reader;

pub use data_source::*;
pub use data_source_blob::*;
pub use data_source_file::*;
pub use data_source_http::*;
pub use value_reader::*;
