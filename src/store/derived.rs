//! Memoized values derived from stored geometries.
//!
//! Stored entries stay immutable. Anything computed from them for display
//! (bounds, the normalized [`Airspace`] projection, a render style) lives in a
//! [`DerivedCache`] keyed by id. Each slot remembers the `geometry_hash` it
//! was computed from and is rebuilt when the entry under that id changes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::entry::CachedGeometry;
use crate::geometry::{altitude_limit_ft, BoundingBox};

/// Normalized domain view of a stored airspace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Airspace {
    pub id: String,
    pub name: String,
    pub type_code: i64,
    pub icao_class: Option<i64>,
    pub country: Option<String>,
    pub lower_altitude_ft: Option<i32>,
    pub upper_altitude_ft: Option<i32>,
}

impl Airspace {
    pub fn from_entry(entry: &CachedGeometry) -> Self {
        let properties = &entry.properties;
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            type_code: entry.type_code,
            icao_class: properties.get("icaoClass").and_then(Value::as_i64),
            country: properties
                .get("country")
                .and_then(Value::as_str)
                .map(str::to_string),
            lower_altitude_ft: entry.lower_altitude_ft,
            upper_altitude_ft: altitude_limit_ft(properties, "upperLimit"),
        }
    }
}

struct Derived<S> {
    geometry_hash: String,
    bounds: Option<Option<BoundingBox>>,
    airspace: Option<Arc<Airspace>>,
    style: Option<S>,
}

impl<S> Derived<S> {
    fn empty(geometry_hash: &str) -> Self {
        Self {
            geometry_hash: geometry_hash.to_string(),
            bounds: None,
            airspace: None,
            style: None,
        }
    }
}

/// Side cache of derived values, generic over the caller's style type.
pub struct DerivedCache<S> {
    slots: HashMap<String, Derived<S>>,
}

impl<S: Clone> DerivedCache<S> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Slot for `entry`, reset when it was derived from another geometry.
    fn slot(&mut self, entry: &CachedGeometry) -> &mut Derived<S> {
        let slot = self
            .slots
            .entry(entry.id.clone())
            .or_insert_with(|| Derived::empty(&entry.geometry_hash));
        if slot.geometry_hash != entry.geometry_hash {
            *slot = Derived::empty(&entry.geometry_hash);
        }
        slot
    }

    /// Memoized bounding box; `None` for an empty or corrupt buffer.
    pub fn bounds(&mut self, entry: &CachedGeometry) -> Option<BoundingBox> {
        let slot = self.slot(entry);
        if let Some(bounds) = slot.bounds {
            return bounds;
        }

        let bounds = entry.bounds().unwrap_or_else(|e| {
            warn!(id = %entry.id, error = %e, "Corrupt geometry buffer");
            None
        });
        slot.bounds = Some(bounds);
        bounds
    }

    /// Memoized domain projection.
    pub fn airspace(&mut self, entry: &CachedGeometry) -> Arc<Airspace> {
        let slot = self.slot(entry);
        slot.airspace
            .get_or_insert_with(|| Arc::new(Airspace::from_entry(entry)))
            .clone()
    }

    /// Memoized style, computed by `compute` on first use.
    pub fn style<F>(&mut self, entry: &CachedGeometry, compute: F) -> S
    where
        F: FnOnce(&CachedGeometry, &Airspace) -> S,
    {
        let airspace = self.airspace(entry);
        let slot = self.slot(entry);
        slot.style
            .get_or_insert_with(|| compute(entry, &airspace))
            .clone()
    }

    /// Drop everything derived for `id`. Returns whether anything was cached.
    pub fn clear_derived(&mut self, id: &str) -> bool {
        self.slots.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<S: Clone> Default for DerivedCache<S> {
    fn default() -> Self {
        Self::new()
    }
}
