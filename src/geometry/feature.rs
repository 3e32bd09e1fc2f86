//! Provider feature normalization and identity.
//!
//! Providers deliver airspaces in two shapes:
//!
//! - standard GeoJSON: `{"type": "Feature", "id": ..., "properties": {...}, "geometry": {...}}`
//! - flattened: provider keys at the top level next to `geometry`
//!   (`{"_id": ..., "name": ..., "type": 4, "geometry": {...}}`)
//!
//! Both normalize to one [`AirspaceFeature`] before anything else looks at
//! them, so the rest of the crate never sees the difference.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::bounds::{LatLon, Ring};
use crate::error::FeatureError;

/// Length of a fallback id in hex characters.
pub const FALLBACK_ID_LEN: usize = 16;

const FEET_PER_METRE: f64 = 3.28084;

/// Altitude units used by the provider's limit objects.
const UNIT_METRES: i64 = 0;
const UNIT_FEET: i64 = 1;
const UNIT_FLIGHT_LEVEL: i64 = 6;

/// A provider feature in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct AirspaceFeature {
    /// Provider properties, whichever shape they arrived in
    pub properties: Map<String, Value>,

    /// Polygon rings; for multi-polygons only the outer ring of each part
    pub rings: Vec<Ring>,

    /// Feature-level `id` of a standard GeoJSON feature
    pub feature_id: Option<String>,
}

impl AirspaceFeature {
    /// Normalize a provider feature.
    ///
    /// Returns `Ok(None)` when the geometry is null, empty or of a type other
    /// than `Polygon`/`MultiPolygon`; callers treat that as a no-op.
    pub fn from_value(value: &Value) -> Result<Option<Self>, FeatureError> {
        let object = value.as_object().ok_or(FeatureError::NotAnObject)?;
        let geometry = object.get("geometry").ok_or(FeatureError::MissingGeometry)?;

        let (properties, feature_id) = match object.get("properties") {
            Some(Value::Object(properties)) => {
                (properties.clone(), object.get("id").and_then(id_string))
            }
            _ => {
                let properties = object
                    .iter()
                    .filter(|(key, _)| key.as_str() != "geometry")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                (properties, None)
            }
        };

        let rings = match parse_geometry(geometry)? {
            Some(rings) if !rings.is_empty() => rings,
            _ => return Ok(None),
        };

        Ok(Some(Self {
            properties,
            rings,
            feature_id,
        }))
    }

    /// Stable provider id, if the feature carries one.
    pub fn provider_id(&self) -> Option<String> {
        properties_id(&self.properties).or_else(|| self.feature_id.clone())
    }

    pub fn name(&self) -> &str {
        self.properties
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Airspace classification code, `0` when absent.
    pub fn type_code(&self) -> i64 {
        self.properties
            .get("type")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    pub fn country(&self) -> Option<&str> {
        self.properties.get("country").and_then(Value::as_str)
    }

    pub fn lower_altitude_ft(&self) -> Option<i32> {
        altitude_limit_ft(&self.properties, "lowerLimit")
    }
}

/// Identity for a feature.
///
/// Uses the provider id when present; otherwise a truncated SHA-256 of
/// `name|type|country`. Two distinct airspaces sharing all three fields get
/// the same fallback id.
pub fn generate_id(feature: &AirspaceFeature) -> String {
    if let Some(id) = feature.provider_id() {
        return id;
    }

    let signature = format!(
        "{}|{}|{}",
        feature.name(),
        feature.type_code(),
        feature.country().unwrap_or("")
    );
    let digest = hex::encode(Sha256::digest(signature.as_bytes()));
    digest[..FALLBACK_ID_LEN].to_string()
}

/// Convert a `{value, unit, referenceDatum}` limit object to feet.
pub fn altitude_limit_ft(properties: &Map<String, Value>, key: &str) -> Option<i32> {
    let limit = properties.get(key)?.as_object()?;
    let value = limit.get("value")?.as_f64()?;
    let unit = limit.get("unit").and_then(Value::as_i64).unwrap_or(UNIT_FEET);

    let feet = match unit {
        UNIT_METRES => value * FEET_PER_METRE,
        UNIT_FEET => value,
        UNIT_FLIGHT_LEVEL => value * 100.0,
        _ => return None,
    };
    Some(feet.round() as i32)
}

/// Provider id from properties: `_id`, then `id`.
pub(crate) fn properties_id(properties: &Map<String, Value>) -> Option<String> {
    properties
        .get("_id")
        .and_then(id_string)
        .or_else(|| properties.get("id").and_then(id_string))
}

/// Non-empty string or numeric id as a string.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_geometry(geometry: &Value) -> Result<Option<Vec<Ring>>, FeatureError> {
    if geometry.is_null() {
        return Ok(None);
    }

    let kind = geometry
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FeatureError::MissingGeometryType)?;
    let coordinates = geometry.get("coordinates");

    match kind {
        "Polygon" => {
            let rings = as_array(coordinates, "polygon")?
                .iter()
                .map(parse_ring)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(rings.into_iter().filter(|r| !r.is_empty()).collect()))
        }
        "MultiPolygon" => {
            let mut rings = Vec::new();
            for polygon in as_array(coordinates, "multipolygon")? {
                let polygon = polygon.as_array().ok_or_else(|| {
                    FeatureError::InvalidCoordinates("polygon is not an array".to_string())
                })?;
                if let Some(outer) = polygon.first() {
                    let ring = parse_ring(outer)?;
                    if !ring.is_empty() {
                        rings.push(ring);
                    }
                }
            }
            Ok(Some(rings))
        }
        _ => Ok(None),
    }
}

fn as_array<'a>(value: Option<&'a Value>, what: &str) -> Result<&'a Vec<Value>, FeatureError> {
    value
        .and_then(Value::as_array)
        .ok_or_else(|| FeatureError::InvalidCoordinates(format!("{what} coordinates are not an array")))
}

fn parse_ring(ring: &Value) -> Result<Ring, FeatureError> {
    ring.as_array()
        .ok_or_else(|| FeatureError::InvalidCoordinates("ring is not an array".to_string()))?
        .iter()
        .map(parse_position)
        .collect()
}

/// GeoJSON positions are `[lon, lat, (alt)]`.
fn parse_position(position: &Value) -> Result<LatLon, FeatureError> {
    let invalid = || FeatureError::InvalidCoordinates(format!("bad position {position}"));

    let pair = position.as_array().filter(|p| p.len() >= 2).ok_or_else(invalid)?;
    let lon = pair[0].as_f64().ok_or_else(invalid)?;
    let lat = pair[1].as_f64().ok_or_else(invalid)?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(invalid());
    }
    Ok(LatLon::new(lat, lon))
}
