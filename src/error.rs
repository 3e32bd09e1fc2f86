use thiserror::Error;

/// Errors raised while decoding a fixed-point ring buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Buffer ended before the declared ring or point data
    #[error("Truncated ring buffer: needed {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Bytes left over after the last declared ring
    #[error("Trailing data in ring buffer: {0} bytes")]
    TrailingData(usize),
}

/// Errors raised while normalizing a provider feature
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    /// Feature is not a JSON object
    #[error("Feature is not an object")]
    NotAnObject,

    /// Feature has no `geometry` member
    #[error("Feature has no geometry")]
    MissingGeometry,

    /// Geometry has no `type` member
    #[error("Geometry has no type")]
    MissingGeometryType,

    /// Coordinate array has the wrong shape
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

/// Errors from the durable geometry tier
#[derive(Debug, Clone, Error)]
pub enum TierError {
    /// Filesystem or storage engine failure
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// Stored snapshot could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Tier cannot serve requests right now
    #[error("Durable tier unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for TierError {
    fn from(err: std::io::Error) -> Self {
        TierError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TierError {
    fn from(err: serde_json::Error) -> Self {
        TierError::Serialization(err.to_string())
    }
}

/// Errors related to tile addressing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TileError {
    /// Latitude is NaN or outside [-90, 90]
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// Longitude is NaN or outside [-180, 180]
    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),

    /// Zoom level is above the supported maximum
    #[error("Invalid zoom level: {zoom} (max {max})")]
    InvalidZoom { zoom: u8, max: u8 },

    /// Tile coordinate lies outside the grid for its zoom
    #[error("Tile ({x}, {y}) out of range for zoom {zoom}")]
    OutOfRange { x: u32, y: u32, zoom: u8 },

    /// Viewport corners are inverted
    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),

    /// Tile belongs to a different zoom than the cache
    #[error("Tile zoom {actual} does not match cache zoom {expected}")]
    ZoomMismatch { expected: u8, actual: u8 },
}

/// Errors raised while merging raw tile responses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// Response body is not valid JSON
    #[error("Response {index} is not valid JSON: {message}")]
    Json { index: usize, message: String },

    /// Response parsed but has no `features` array
    #[error("Response {0} is not a feature collection")]
    NotAFeatureCollection(usize),
}

/// Top-level error for cache operations
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Provider feature could not be parsed
    #[error("Malformed feature: {0}")]
    MalformedFeature(#[from] FeatureError),

    /// Stored geometry buffer is corrupt
    #[error("Corrupt geometry: {0}")]
    Codec(#[from] CodecError),

    /// Durable tier I/O failed
    #[error("Durable tier failure: {0}")]
    DurableTier(#[from] TierError),

    /// Tile addressing failed
    #[error("Tile error: {0}")]
    Tile(#[from] TileError),
}
