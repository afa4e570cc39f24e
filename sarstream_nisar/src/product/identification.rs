//! Product identification metadata: a flat map of string fields read from the
//! spec's `identification/*` datasets, with the group's attributes as the
//! fallback source. Every field is optional.

use super::structure::Band;
use sarstream_hdf5::{AttrValue, DataValue, Hdf5Reader};
use std::collections::BTreeMap;

/// Fields the spec places under `identification/`.
const IDENTIFICATION_FIELDS: [&str; 12] = [
	"missionId",
	"productType",
	"absoluteOrbitNumber",
	"trackNumber",
	"frameNumber",
	"orbitPassDirection",
	"lookDirection",
	"boundingPolygon",
	"zeroDopplerStartTime",
	"zeroDopplerEndTime",
	"processingDateTime",
	"isUrgentObservation",
];

/// Reads the identification map: spec-path datasets first, group attributes
/// filling any holes.
pub async fn read_identification(reader: &Hdf5Reader, band: Band) -> BTreeMap<String, String> {
	let group_path = format!("/science/{}/identification", band.name());
	let mut map = BTreeMap::new();

	for field in IDENTIFICATION_FIELDS {
		let Some(id) = reader.find_dataset_by_path(&format!("{group_path}/{field}")) else {
			continue;
		};
		match reader.read_small_dataset(id).await {
			Ok(dataset) => {
				if let Some(text) = stringify(&dataset.value) {
					map.insert(field.to_string(), text);
				}
			}
			Err(err) => log::debug!("identification field {field} unreadable: {err}"),
		}
	}

	// Fallback: attributes attached to the identification group itself.
	if let Some(attributes) = reader.group_attributes(&group_path) {
		for (name, value) in attributes {
			map.entry(name).or_insert_with(|| stringify_attr(&value));
		}
	}

	map
}

fn stringify(value: &DataValue) -> Option<String> {
	match value {
		DataValue::Text(texts) => match texts.len() {
			0 => None,
			1 => Some(texts[0].clone()),
			_ => Some(texts.join(", ")),
		},
		DataValue::Int(values) => values.first().map(ToString::to_string),
		DataValue::F64(values) => values.first().map(ToString::to_string),
		DataValue::F32(values) => values.first().map(ToString::to_string),
	}
}

fn stringify_attr(value: &AttrValue) -> String {
	match value {
		AttrValue::Text(text) => text.clone(),
		AttrValue::Int(v) => v.to_string(),
		AttrValue::Float(v) => v.to_string(),
		AttrValue::TextArray(values) => values.join(", "),
		AttrValue::IntArray(values) => values.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
		AttrValue::FloatArray(values) => values.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stringify_scalar_and_list() {
		assert_eq!(stringify(&DataValue::Text(vec!["NISAR".into()])), Some("NISAR".into()));
		assert_eq!(
			stringify(&DataValue::Text(vec!["A".into(), "B".into()])),
			Some("A, B".into())
		);
		assert_eq!(stringify(&DataValue::Int(vec![42])), Some("42".into()));
		assert_eq!(stringify(&DataValue::Text(vec![])), None);
	}

	#[test]
	fn stringify_attr_variants() {
		assert_eq!(stringify_attr(&AttrValue::Text("GCOV".into())), "GCOV");
		assert_eq!(stringify_attr(&AttrValue::Int(7)), "7");
		assert_eq!(stringify_attr(&AttrValue::IntArray(vec![1, 2])), "1, 2");
	}
}
