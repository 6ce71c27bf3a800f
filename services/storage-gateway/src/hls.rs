//! HLS placeholder playlist
//!
//! Serves a well-formed media playlist over fixed byte windows of the stored
//! object. The three pseudo-segments claim ten seconds each regardless of
//! the real timeline; players get a valid playlist and valid bytes, nothing
//! more.

use crate::range::RangeSpec;

/// Number of pseudo-segments advertised per file.
pub const SEGMENT_COUNT: u64 = 3;

/// Claimed duration per pseudo-segment, in seconds.
pub const SEGMENT_DURATION_SECS: u64 = 10;

/// Render the placeholder m3u8 playlist for a file.
pub fn build_placeholder_manifest(file_id: &str, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let mut manifest = String::from("#EXTM3U\n");
    manifest.push_str("#EXT-X-VERSION:3\n");
    manifest.push_str(&format!("#EXT-X-TARGETDURATION:{SEGMENT_DURATION_SECS}\n"));
    manifest.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
    for n in 0..SEGMENT_COUNT {
        manifest.push_str(&format!("#EXTINF:{SEGMENT_DURATION_SECS}.0,\n"));
        manifest.push_str(&format!("{base}/stream/{file_id}/segment/{n}\n"));
    }
    manifest.push_str("#EXT-X-ENDLIST\n");
    manifest
}

/// Byte window for pseudo-segment `index` of an object of `total` bytes.
/// `None` when the window starts past the object.
pub fn segment_range(index: u64, segment_size: u64, total: u64) -> Option<RangeSpec> {
    let start = index.checked_mul(segment_size)?;
    if start >= total || total == 0 {
        return None;
    }
    let end = (start + segment_size - 1).min(total - 1);
    Some(RangeSpec {
        start,
        end,
        content_length: end - start + 1,
    })
}

/// Synthesized `Range` header for a pseudo-segment.
pub fn segment_range_header(spec: &RangeSpec) -> String {
    format!("bytes={}-{}", spec.start, spec.end)
}
