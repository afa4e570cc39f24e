//! Superblock parsing for versions 0 through 3.
//!
//! The superblock fixes the width of every address (`offset_size`) and length
//! (`length_size`) in the rest of the file, and points at the root group
//! object header.

use crate::{Error, Result};
use sarstream_core::io::ValueReaderSlice;

use super::HDF5_SIGNATURE;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Superblock {
	pub version: u8,
	/// Width of file addresses in bytes: 2, 4 or 8.
	pub offset_size: u8,
	/// Width of lengths in bytes.
	pub length_size: u8,
	pub base_address: u64,
	/// End-of-file address; equals the file size for well-formed files.
	pub end_of_file: u64,
	/// Address of the root group object header (v2/v3) or of the root
	/// group's symbol-table entry target (v0/v1).
	pub root_address: u64,
}

impl Superblock {
	/// Parses the superblock from the start of the prefetched prefix.
	///
	/// # Errors
	/// `Error::Format` when the signature is missing, the version is
	/// unsupported, or the address widths are not in `{2, 4, 8}`.
	pub fn parse(prefix: &[u8]) -> Result<Superblock> {
		if prefix.len() < 48 || &prefix[0..8] != HDF5_SIGNATURE {
			return Err(Error::Format("not HDF5".to_string()));
		}

		let mut reader = ValueReaderSlice::new_le(prefix);
		reader.skip(8).map_err(fmt)?;
		let version = reader.read_u8().map_err(fmt)?;

		match version {
			0 | 1 => Self::parse_v0(&mut reader, version),
			2 | 3 => Self::parse_v2(&mut reader, version),
			other => Err(Error::Format(format!("unsupported superblock version {other}"))),
		}
	}

	fn parse_v0(reader: &mut ValueReaderSlice<'_, byteorder::LittleEndian>, version: u8) -> Result<Superblock> {
		// free-space version, root-group version, reserved, shared-header version
		reader.skip(4).map_err(fmt)?;
		let offset_size = reader.read_u8().map_err(fmt)?;
		let length_size = reader.read_u8().map_err(fmt)?;
		check_width(offset_size)?;
		check_width(length_size)?;
		// reserved, group leaf k, group internal k, consistency flags
		reader.skip(1 + 2 + 2 + 4).map_err(fmt)?;
		if version == 1 {
			// indexed-storage internal k, reserved
			reader.skip(4).map_err(fmt)?;
		}
		let width = offset_size as usize;
		let base_address = reader.read_uint(width).map_err(fmt)?;
		reader.skip(width as u64).map_err(fmt)?; // free-space address
		let end_of_file = reader.read_uint(width).map_err(fmt)?;
		reader.skip(width as u64).map_err(fmt)?; // driver-info address
		// Root group symbol-table entry: link name offset, object header address.
		reader.skip(width as u64).map_err(fmt)?;
		let root_address = reader.read_uint(width).map_err(fmt)?;

		Ok(Superblock {
			version,
			offset_size,
			length_size,
			base_address,
			end_of_file,
			root_address,
		})
	}

	fn parse_v2(reader: &mut ValueReaderSlice<'_, byteorder::LittleEndian>, version: u8) -> Result<Superblock> {
		let offset_size = reader.read_u8().map_err(fmt)?;
		let length_size = reader.read_u8().map_err(fmt)?;
		check_width(offset_size)?;
		check_width(length_size)?;
		reader.skip(1).map_err(fmt)?; // file consistency flags
		let width = offset_size as usize;
		let base_address = reader.read_uint(width).map_err(fmt)?;
		reader.skip(width as u64).map_err(fmt)?; // superblock extension address
		let end_of_file = reader.read_uint(width).map_err(fmt)?;
		let root_address = reader.read_uint(width).map_err(fmt)?;

		Ok(Superblock {
			version,
			offset_size,
			length_size,
			base_address,
			end_of_file,
			root_address,
		})
	}
}

fn check_width(width: u8) -> Result {
	match width {
		2 | 4 | 8 => Ok(()),
		other => Err(Error::Format(format!("invalid address width {other}"))),
	}
}

fn fmt(err: anyhow::Error) -> Error {
	Error::Format(format!("truncated superblock: {err}"))
}
