//! Best-effort fractal-heap link recovery.
//!
//! New-style groups with many children store their links as managed objects in
//! a fractal heap. Resolving that structure exactly requires more of the file
//! than a metadata prefix guarantees, so this parser is deliberately lenient:
//! it walks the root block (direct, or one level of indirection), then scans
//! the object data for records that look like serialized link messages. Every
//! failure is local; the pass yields whatever links it can substantiate.

use super::{HardLink, Superblock, is_undefined, parse_link};
use anyhow::{Result, ensure};
use sarstream_core::io::ValueReaderSlice;

pub const FRHP_SIGNATURE: &[u8; 4] = b"FRHP";
pub const FHDB_SIGNATURE: &[u8; 4] = b"FHDB";
pub const FHIB_SIGNATURE: &[u8; 4] = b"FHIB";

/// Extracts link-shaped records from the fractal heap at `address`.
pub fn scan_fractal_heap_links(prefix: &[u8], address: u64, sb: &Superblock) -> Result<Vec<HardLink>> {
	let header = FractalHeapHeader::parse(prefix, address, sb)?;
	let mut links = Vec::new();

	for block_address in header.direct_blocks(prefix, sb) {
		let start = block_address as usize;
		if start >= prefix.len() || !prefix[start..].starts_with(FHDB_SIGNATURE) {
			continue;
		}
		let block_end = (start + header.starting_block_size as usize).min(prefix.len());
		if let Err(err) = scan_direct_block(&prefix[start..block_end], &header, sb, &mut links) {
			log::debug!("fractal heap direct block at {block_address}: {err}");
		}
	}

	Ok(links)
}

struct FractalHeapHeader {
	flags: u8,
	max_heap_size_bits: u16,
	starting_block_size: u64,
	root_block_address: u64,
	current_rows: u16,
	table_width: u16,
}

impl FractalHeapHeader {
	fn parse(prefix: &[u8], address: u64, sb: &Superblock) -> Result<FractalHeapHeader> {
		let start = address as usize;
		ensure!(start < prefix.len(), "fractal heap header outside prefix");
		let bytes = &prefix[start..];
		ensure!(bytes.starts_with(FRHP_SIGNATURE), "not a fractal heap header");

		let o = sb.offset_size as u64;
		let l = sb.length_size as u64;
		let mut r = ValueReaderSlice::new_le(bytes);
		r.skip(4)?;
		let version = r.read_u8()?;
		ensure!(version == 0, "unsupported fractal heap version {version}");
		r.skip(2)?; // heap id length
		let io_filter_length = r.read_u16()?;
		let flags = r.read_u8()?;
		r.skip(4)?; // maximum size of managed objects
		r.skip(l + o)?; // next huge id, huge btree address
		r.skip(l + o)?; // free space, free-space manager address
		r.skip(4 * l)?; // managed space, allocated space, iterator offset, managed count
		r.skip(2 * l)?; // huge size, huge count
		r.skip(2 * l)?; // tiny size, tiny count
		let table_width = r.read_u16()?;
		let starting_block_size = r.read_uint(sb.length_size as usize)?;
		r.skip(l)?; // maximum direct block size
		let max_heap_size_bits = r.read_u16()?;
		r.skip(2)?; // starting rows in root indirect block
		let root_block_address = r.read_uint(sb.offset_size as usize)?;
		let current_rows = r.read_u16()?;
		ensure!(io_filter_length == 0, "filtered fractal heaps are not scanned");
		ensure!(starting_block_size > 0 && starting_block_size <= (1 << 24), "implausible block size");

		Ok(FractalHeapHeader {
			flags,
			max_heap_size_bits,
			starting_block_size,
			root_block_address,
			current_rows,
			table_width,
		})
	}

	/// Width in bytes of the block-offset field inside heap blocks.
	fn block_offset_width(&self) -> u64 {
		u64::from(self.max_heap_size_bits).div_ceil(8)
	}

	/// Returns candidate direct-block addresses: the root itself when the
	/// heap has no indirection, otherwise the root indirect block's children.
	fn direct_blocks(&self, prefix: &[u8], sb: &Superblock) -> Vec<u64> {
		if is_undefined(self.root_block_address, sb.offset_size) {
			return Vec::new();
		}
		if self.current_rows == 0 {
			return vec![self.root_block_address];
		}

		let start = self.root_block_address as usize;
		if start >= prefix.len() || !prefix[start..].starts_with(FHIB_SIGNATURE) {
			return Vec::new();
		}
		let mut r = ValueReaderSlice::new_le(&prefix[start..]);
		let mut blocks = Vec::new();
		let result: Result<()> = (|| {
			r.skip(4 + 1)?; // signature, version
			r.skip(u64::from(sb.offset_size))?; // heap header address
			r.skip(self.block_offset_width())?;
			let entries = u64::from(self.current_rows) * u64::from(self.table_width);
			for _ in 0..entries.min(256) {
				let address = r.read_uint(sb.offset_size as usize)?;
				if !is_undefined(address, sb.offset_size) {
					blocks.push(address);
				}
			}
			Ok(())
		})();
		if let Err(err) = result {
			log::debug!("fractal heap indirect block: {err}");
		}
		blocks
	}
}

/// Scans the data region of one direct block for serialized link messages.
fn scan_direct_block(block: &[u8], header: &FractalHeapHeader, sb: &Superblock, links: &mut Vec<HardLink>) -> Result<()> {
	let mut r = ValueReaderSlice::new_le(block);
	r.skip(4 + 1)?; // signature, version
	r.skip(u64::from(sb.offset_size))?; // heap header address
	r.skip(header.block_offset_width())?;
	if header.flags & 0x02 != 0 {
		r.skip(4)?; // checksum
	}

	let data_start = r.position() as usize;
	let data = &block[data_start..];
	let mut pos = 0usize;
	let mut misses = 0usize;
	while pos < data.len() && misses < 4096 {
		match try_link_at(&data[pos..], sb) {
			Some((link, consumed)) => {
				links.push(link);
				pos += consumed;
				misses = 0;
			}
			None => {
				pos += 1;
				misses += 1;
			}
		}
	}
	Ok(())
}

/// Attempts to decode a link message at the start of `bytes`, returning the
/// link and the number of bytes it plausibly occupies.
fn try_link_at(bytes: &[u8], sb: &Superblock) -> Option<(HardLink, usize)> {
	if bytes.len() < 4 || bytes[0] != 1 {
		return None;
	}
	let flags = bytes[1];
	if flags & !0x1F != 0 {
		return None;
	}
	let link = parse_link(bytes, sb.offset_size).ok()??;
	if link.name.is_empty()
		|| link.name.len() > 256
		|| !link.name.bytes().all(|b| b.is_ascii_graphic() || b == b' ')
	{
		return None;
	}
	if link.address == 0 || link.address >= sb.end_of_file {
		return None;
	}

	// Recompute the record length the same way parse_link consumed it.
	let mut consumed = 2usize;
	if flags & 0x08 != 0 {
		consumed += 1;
	}
	if flags & 0x04 != 0 {
		consumed += 8;
	}
	if flags & 0x10 != 0 {
		consumed += 1;
	}
	consumed += 1 << (flags & 0x03);
	consumed += link.name.len() + sb.offset_size as usize;
	Some((link, consumed))
}
