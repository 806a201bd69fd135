//! Human-readable byte sizes.

const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Formats a byte count with decimal units and three significant digits.
///
/// `0` is `"0 B"`, `1536` is `"1.54 kB"`, `12_345_678` is `"12.3 MB"`.
/// The unit is chosen before rounding, so `999_999` is `"1000 kB"`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1000 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    let decimals = if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else {
        2
    };
    let mut text = format!("{:.*}", decimals, value);

    if text.contains('.') {
        text = text.trim_end_matches('0').trim_end_matches('.').to_string();
    }

    format!("{} {}", text, UNITS[unit])
}
