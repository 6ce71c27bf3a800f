//! HTTP Range header parsing
//!
//! Only the single-range `bytes=start-end` form is supported; suffix ranges
//! and multipart ranges are rejected as unsatisfiable, matching what the
//! streaming clients actually send.

use crate::error::{Error, Result};

/// A resolved byte range. Invariant: `start <= end < total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    pub content_length: u64,
}

impl RangeSpec {
    /// `Content-Range` header value for a 206 response.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// Parse a `Range` header against an object of `total` bytes.
///
/// A missing end bound means "through the last byte"; an explicit end past
/// the object is clamped to `total - 1`. Unsatisfiable inputs (start past
/// the object, inverted bounds, non-numeric bounds, empty object) map to
/// [`Error::RangeNotSatisfiable`].
pub fn parse_range_header(header: &str, total: u64) -> Result<RangeSpec> {
    let unsatisfiable = || Error::RangeNotSatisfiable { total };

    let spec = header
        .strip_prefix("bytes=")
        .ok_or_else(unsatisfiable)?
        .trim();
    if total == 0 || spec.contains(',') {
        return Err(unsatisfiable());
    }

    let (start_str, end_str) = spec.split_once('-').ok_or_else(unsatisfiable)?;
    let start: u64 = start_str.parse().map_err(|_| unsatisfiable())?;
    let end: u64 = if end_str.is_empty() {
        total - 1
    } else {
        let end: u64 = end_str.parse().map_err(|_| unsatisfiable())?;
        end.min(total - 1)
    };

    if start > end || start >= total {
        return Err(unsatisfiable());
    }

    Ok(RangeSpec {
        start,
        end,
        content_length: end - start + 1,
    })
}
