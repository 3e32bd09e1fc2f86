//! Airspace geometry layer.
//!
//! This module turns provider features into a canonical, compact form that the
//! geometry store can deduplicate and persist.
//!
//! # Components
//!
//! - [`codec`]: fixed-point ring encoding, bounds scan and content hashing
//! - [`feature`]: normalization of the two provider feature shapes and
//!   identity generation
//! - [`BoundingBox`]: geographic rectangle shared with the tile layer
//!
//! # Pipeline
//!
//! ```text
//! provider JSON ──► AirspaceFeature::from_value ──► (properties, rings)
//!                                                        │
//!                        generate_id ◄───────────────────┤
//!                        codec::hash_of ◄────────────────┤
//!                        codec::encode ◄─────────────────┘
//! ```

mod bounds;
pub mod codec;
pub mod feature;

pub use bounds::{BoundingBox, LatLon, Ring};
pub use codec::{
    bounds_of, decode, encode, hash_of, uncompressed_size, COORDINATE_SCALE,
};
pub use feature::{altitude_limit_ft, generate_id, AirspaceFeature, FALLBACK_ID_LEN};
