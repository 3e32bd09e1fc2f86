//! Merging of raw tile responses.
//!
//! An airspace straddling a tile boundary comes back once per tile it
//! touches. Merging concatenates the feature collections of several tile
//! responses and keeps the first feature for each signature:
//!
//! - `id:<provider id>` when the feature carries `_id` or `id`
//! - `sig:<name>|<type>|<first coordinate>` otherwise
//!
//! Merging never fails the caller. An unparseable response is logged and the
//! first response body is returned unmerged.

use std::collections::HashSet;

use bytes::Bytes;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::MergeError;
use crate::geometry::feature::{id_string, properties_id};

/// Merge raw feature collection bodies into one deduplicated collection.
///
/// A single response is returned as-is without parsing; an empty list yields
/// an empty feature collection.
pub fn merge_geojson_responses(responses: &[Bytes]) -> Bytes {
    match responses {
        [] => Bytes::from(empty_collection().to_string()),
        [single] => single.clone(),
        [first, ..] => match try_merge(responses) {
            Ok(merged) => merged,
            Err(e) => {
                warn!(
                    error = %e,
                    responses = responses.len(),
                    "Failed to merge tile responses, returning first response"
                );
                first.clone()
            }
        },
    }
}

/// Merge, reporting the first unparseable response instead of falling back.
pub fn try_merge(responses: &[Bytes]) -> Result<Bytes, MergeError> {
    let mut seen = HashSet::new();
    let mut features = Vec::new();
    let mut total = 0usize;

    for (index, body) in responses.iter().enumerate() {
        let collection: Value = serde_json::from_slice(body).map_err(|e| MergeError::Json {
            index,
            message: e.to_string(),
        })?;
        let Some(Value::Array(batch)) = collection.get("features") else {
            return Err(MergeError::NotAFeatureCollection(index));
        };

        for feature in batch {
            total += 1;
            if seen.insert(feature_signature(feature)) {
                features.push(feature.clone());
            }
        }
    }

    debug!(
        responses = responses.len(),
        total,
        unique = features.len(),
        "Merged tile responses"
    );

    let mut merged = empty_collection();
    merged["features"] = Value::Array(features);
    Ok(Bytes::from(merged.to_string()))
}

/// Deduplication signature of a raw feature in either provider shape.
pub fn feature_signature(feature: &Value) -> String {
    let Some(object) = feature.as_object() else {
        return format!("raw:{feature}");
    };

    let (properties, feature_id) = match object.get("properties") {
        Some(Value::Object(properties)) => (properties, object.get("id").and_then(id_string)),
        _ => (object, None),
    };

    if let Some(id) = properties_id(properties).or(feature_id) {
        return format!("id:{id}");
    }

    format!(
        "sig:{}|{}|{}",
        text_of(properties, "name"),
        text_of(properties, "type"),
        first_coordinate(object.get("geometry")).unwrap_or_default()
    )
}

fn empty_collection() -> Value {
    json!({"type": "FeatureCollection", "features": []})
}

fn text_of(properties: &Map<String, Value>, key: &str) -> String {
    match properties.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// First `[lon, lat]` position of a geometry, at any nesting depth.
fn first_coordinate(geometry: Option<&Value>) -> Option<String> {
    let mut current = geometry?.get("coordinates")?;
    loop {
        let items = current.as_array()?;
        match items.first()? {
            Value::Array(_) => current = &items[0],
            Value::Number(_) => {
                let lon = items.first()?;
                let lat = items.get(1)?;
                return Some(format!("{lon},{lat}"));
            }
            _ => return None,
        }
    }
}
