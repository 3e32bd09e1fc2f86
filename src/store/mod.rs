//! Deduplicated airspace geometry storage.
//!
//! Provider tiles overlap, so the same airspace arrives many times. This
//! module keeps one canonical [`CachedGeometry`] per airspace id across two
//! tiers:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              GeometryStore               │
//! │  ┌────────────────┐  ┌────────────────┐  │
//! │  │  LRU (memory)  │  │  duplicate and │  │
//! │  │  bounded       │  │  hit counters  │  │
//! │  └───────┬────────┘  └────────────────┘  │
//! └──────────┼───────────────────────────────┘
//!            │ miss / write-through
//!            ▼
//! ┌──────────────────────────────────────────┐
//! │   GeometryTier (memory map or JSON file) │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Values derived from an entry for display are memoized separately in a
//! [`DerivedCache`] so that stored entries stay immutable.

mod derived;
mod entry;
mod geometry_store;
mod tier;

pub use derived::{Airspace, DerivedCache};
pub use entry::CachedGeometry;
pub use geometry_store::{
    BatchOutcome, GeometryStore, GeometryStoreConfig, PutOutcome, DEFAULT_MAX_AGE,
    DEFAULT_MEMORY_CAPACITY,
};
pub use tier::{FileGeometryTier, GeometryTier, MemoryGeometryTier};
