//! EPSG code resolution: a chain of independent strategies, each returning
//! `Option`, tried in order of authority with WGS84 as the loudly-logged
//! final fallback.

use super::bounds::WorldBounds;
use lazy_static::lazy_static;
use regex::Regex;
use sarstream_hdf5::{DatasetId, Hdf5Reader};

lazy_static! {
	/// WKT1 `AUTHORITY["EPSG","32611"]` (the outermost one appears last).
	static ref RE_WKT1_AUTHORITY: Regex = Regex::new(r#"AUTHORITY\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#).unwrap();
	/// WKT2 `ID["EPSG",32611]`.
	static ref RE_WKT2_ID: Regex = Regex::new(r#"ID\[\s*"EPSG"\s*,\s*(\d+)\s*\]"#).unwrap();
}

/// Northings above this are only reachable with the southern-hemisphere
/// false northing of 10^7.
const SOUTHERN_NORTHING_THRESHOLD: f64 = 5.5e6;

/// Resolves the EPSG code of the product grid.
pub async fn resolve_epsg(reader: &Hdf5Reader, projection_dataset: Option<DatasetId>, bounds: Option<&WorldBounds>) -> u32 {
	if let Some(id) = projection_dataset {
		if let Some(epsg) = epsg_from_scalar(reader, id).await {
			return epsg;
		}
		if let Some(epsg) = epsg_from_attribute(reader, id) {
			return epsg;
		}
		if let Some(epsg) = epsg_from_wkt(reader, id) {
			return epsg;
		}
		if let Some(epsg) = epsg_from_utm_zone(reader, id, bounds) {
			return epsg;
		}
	}
	log::warn!("projection not resolvable; falling back to EPSG:4326");
	4326
}

/// The `projection` dataset's scalar value, when it is a plausible code.
async fn epsg_from_scalar(reader: &Hdf5Reader, id: DatasetId) -> Option<u32> {
	let value = reader.read_small_dataset(id).await.ok()?.value.get_f64(0)?;
	plausible_epsg(value as i64)
}

/// The `epsg_code` attribute.
fn epsg_from_attribute(reader: &Hdf5Reader, id: DatasetId) -> Option<u32> {
	let attributes = reader.dataset_attributes(id).ok()?;
	plausible_epsg(attributes.get("epsg_code")?.as_int()?)
}

/// An embedded WKT string in the `spatial_ref` attribute, WKT1 or WKT2.
fn epsg_from_wkt(reader: &Hdf5Reader, id: DatasetId) -> Option<u32> {
	let attributes = reader.dataset_attributes(id).ok()?;
	let wkt = attributes.get("spatial_ref")?.as_text()?.to_owned();
	parse_wkt_epsg(&wkt)
}

/// Extracts the EPSG code from a WKT1 or WKT2 string. For WKT1 the LAST
/// `AUTHORITY` entry belongs to the outermost (whole-CRS) node.
pub fn parse_wkt_epsg(wkt: &str) -> Option<u32> {
	if let Some(captures) = RE_WKT1_AUTHORITY.captures_iter(wkt).last() {
		return captures[1].parse().ok().and_then(|v: i64| plausible_epsg(v));
	}
	if let Some(captures) = RE_WKT2_ID.captures_iter(wkt).last() {
		return captures[1].parse().ok().and_then(|v: i64| plausible_epsg(v));
	}
	None
}

/// Infers a UTM code from a `utm_zone_number` attribute; the hemisphere comes
/// from the maximum northing of the resolved bounds.
fn epsg_from_utm_zone(reader: &Hdf5Reader, id: DatasetId, bounds: Option<&WorldBounds>) -> Option<u32> {
	let attributes = reader.dataset_attributes(id).ok()?;
	let zone = attributes.get("utm_zone_number")?.as_int()?;
	if !(1..=60).contains(&zone) {
		return None;
	}
	let southern = bounds.is_some_and(|b| b.max_y > SOUTHERN_NORTHING_THRESHOLD);
	let base = if southern { 32700 } else { 32600 };
	Some(base + zone as u32)
}

fn plausible_epsg(value: i64) -> Option<u32> {
	// Valid EPSG CRS codes occupy 1024..=32767.
	if (1024..=32767).contains(&value) {
		Some(value as u32)
	} else {
		None
	}
}
