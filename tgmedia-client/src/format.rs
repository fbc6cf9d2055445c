//! Human-readable sizes.

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format `bytes` in base 1024, rounded to `precision` decimals with
/// trailing zeros dropped: `1536 → "1.5 KB"`, `1024 → "1 KB"`.
///
/// Zero and negative sizes are `"0 B"`.
pub fn format_size(bytes: i64, precision: usize) -> String {
    if bytes <= 0 {
        return "0 B".into();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let factor = 10f64.powi(precision.min(15) as i32);
    let rounded = (value * factor).round() / factor;
    let mut text = format!("{rounded:.precision$}");
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    format!("{text} {}", UNITS[unit])
}
