//! Human-readable byte sizes for log lines

const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Format a byte count as a human-readable size with two decimals.
///
/// Used in upload/stream log lines where raw byte counts are hard to scan.
/// Sizes are binary (1 KiB = 1024 B).
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let exp = (bytes.ilog2() / 10).min((UNITS.len() - 1) as u32);
    if exp == 0 {
        return format!("{bytes} B");
    }
    let value = bytes as f64 / (1u64 << (exp * 10)) as f64;
    format!("{:.2} {}", value, UNITS[exp as usize])
}
