//! Fixed-point ring codec.
//!
//! Coordinates are multiplied by [`COORDINATE_SCALE`] and stored as `i32`,
//! which keeps about 1cm of precision and halves the footprint of a pair of
//! `f64`s.
//!
//! # Buffer Layout
//!
//! All integers are little-endian:
//!
//! ```text
//! u32 ring_count
//! repeat ring_count:
//!     u32 point_count
//!     repeat point_count:
//!         i32 lon * 1e7
//!         i32 lat * 1e7
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

use super::bounds::{BoundingBox, LatLon, Ring};
use crate::error::CodecError;

/// Scale factor between decimal degrees and stored integers.
pub const COORDINATE_SCALE: f64 = 1e7;

/// Size of one encoded point (lon + lat).
const POINT_SIZE: usize = 8;

/// Size of a ring or point count.
const COUNT_SIZE: usize = 4;

/// Size of one point held as two `f64`s, the baseline for compression ratios.
const UNCOMPRESSED_POINT_SIZE: usize = 16;

#[inline]
fn to_fixed(degrees: f64) -> i32 {
    (degrees * COORDINATE_SCALE).round() as i32
}

#[inline]
fn from_fixed(value: i32) -> f64 {
    value as f64 / COORDINATE_SCALE
}

/// Encode rings into the fixed-point buffer.
pub fn encode(rings: &[Ring]) -> Bytes {
    let points: usize = rings.iter().map(Vec::len).sum();
    let mut buf = BytesMut::with_capacity(COUNT_SIZE * (1 + rings.len()) + points * POINT_SIZE);

    buf.put_u32_le(rings.len() as u32);
    for ring in rings {
        buf.put_u32_le(ring.len() as u32);
        for point in ring {
            buf.put_i32_le(to_fixed(point.lon));
            buf.put_i32_le(to_fixed(point.lat));
        }
    }

    buf.freeze()
}

/// Decode a buffer produced by [`encode`].
pub fn decode(buf: &[u8]) -> Result<Vec<Ring>, CodecError> {
    let mut reader = Reader::new(buf);
    let ring_count = reader.count()?;

    let mut rings = Vec::with_capacity(ring_count.min(1024));
    for _ in 0..ring_count {
        let point_count = reader.count()?;
        reader.require(point_count.saturating_mul(POINT_SIZE))?;

        let mut ring = Vec::with_capacity(point_count);
        for _ in 0..point_count {
            ring.push(reader.point());
        }
        rings.push(ring);
    }

    reader.finish()?;
    Ok(rings)
}

/// Bounding box of an encoded buffer in a single pass, without building rings.
///
/// Returns `Ok(None)` for a buffer with no points.
pub fn bounds_of(buf: &[u8]) -> Result<Option<BoundingBox>, CodecError> {
    let mut reader = Reader::new(buf);
    let ring_count = reader.count()?;

    let mut bounds: Option<BoundingBox> = None;
    for _ in 0..ring_count {
        let point_count = reader.count()?;
        reader.require(point_count.saturating_mul(POINT_SIZE))?;

        for _ in 0..point_count {
            let point = reader.point();
            match bounds.as_mut() {
                Some(b) => b.extend(point),
                None => bounds = Some(BoundingBox::from_point(point)),
            }
        }
    }

    reader.finish()?;
    Ok(bounds)
}

/// Content digest of the ordered vertex stream, as lowercase hex.
///
/// The digest is computed over the fixed-point text of each vertex, so any
/// two inputs that encode to the same buffer hash identically.
pub fn hash_of(rings: &[Ring]) -> String {
    let mut hasher = Sha256::new();
    for ring in rings {
        for point in ring {
            hasher.update(format!("{},{};", to_fixed(point.lat), to_fixed(point.lon)).as_bytes());
        }
        hasher.update(b"|");
    }
    hex::encode(hasher.finalize())
}

/// Byte count of the rings held as `f64` pairs.
pub fn uncompressed_size(rings: &[Ring]) -> usize {
    rings.iter().map(Vec::len).sum::<usize>() * UNCOMPRESSED_POINT_SIZE
}

/// Bounds-checked cursor over an encoded buffer.
struct Reader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    fn offset(&self) -> usize {
        self.len - self.buf.remaining()
    }

    fn require(&self, needed: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                offset: self.offset(),
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn count(&mut self) -> Result<usize, CodecError> {
        self.require(COUNT_SIZE)?;
        Ok(self.buf.get_u32_le() as usize)
    }

    /// Caller must have checked `require(POINT_SIZE)`.
    fn point(&mut self) -> LatLon {
        let lon = from_fixed(self.buf.get_i32_le());
        let lat = from_fixed(self.buf.get_i32_le());
        LatLon::new(lat, lon)
    }

    fn finish(self) -> Result<(), CodecError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingData(n)),
        }
    }
}
