//! Human-readable byte counts
//!
//! Decimal (1000-based) units, matching how file sizes are shown to users:
//! `0` → `Zero KB`, `512` → `512 bytes`, `1_530_000` → `1.5 MB`.

const UNITS: &[(&str, usize)] = &[("KB", 0), ("MB", 1), ("GB", 2), ("TB", 2), ("PB", 2)];

/// Format a byte count using decimal units.
pub fn format_byte_count(bytes: u64) -> String {
    match bytes {
        0 => return "Zero KB".to_string(),
        1 => return "1 byte".to_string(),
        2..=999 => return format!("{} bytes", bytes),
        _ => {}
    }

    let mut value = bytes as f64 / 1000.0;
    let mut index = 0;
    loop {
        let (unit, precision) = UNITS[index];
        let rendered = format!("{:.*}", precision, value);
        let rounds_up = rendered.parse::<f64>().map_or(false, |v| v >= 1000.0);
        if !rounds_up || index == UNITS.len() - 1 {
            return format!("{} {}", trim_fraction(&rendered), unit);
        }
        value /= 1000.0;
        index += 1;
    }
}

/// Format a possibly unknown size (`<= 0` is unknown).
pub fn format_optional_byte_count(bytes: i64) -> String {
    if bytes > 0 {
        format_byte_count(bytes as u64)
    } else {
        "Unknown".to_string()
    }
}

fn trim_fraction(rendered: &str) -> &str {
    if rendered.contains('.') {
        rendered.trim_end_matches('0').trim_end_matches('.')
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_counts() {
        assert_eq!(format_byte_count(0), "Zero KB");
        assert_eq!(format_byte_count(1), "1 byte");
        assert_eq!(format_byte_count(512), "512 bytes");
        assert_eq!(format_byte_count(999), "999 bytes");
    }

    #[test]
    fn test_decimal_units() {
        assert_eq!(format_byte_count(1_000), "1 KB");
        assert_eq!(format_byte_count(1_499), "1 KB");
        assert_eq!(format_byte_count(1_500_000), "1.5 MB");
        assert_eq!(format_byte_count(4_000_000), "4 MB");
        assert_eq!(format_byte_count(2_350_000_000), "2.35 GB");
        assert_eq!(format_byte_count(3_000_000_000_000), "3 TB");
    }

    #[test]
    fn test_rounding_promotes_unit() {
        assert_eq!(format_byte_count(999_999), "1 MB");
        assert_eq!(format_byte_count(999_990_000), "1 GB");
    }

    #[test]
    fn test_optional_counts() {
        assert_eq!(format_optional_byte_count(-1), "Unknown");
        assert_eq!(format_optional_byte_count(0), "Unknown");
        assert_eq!(format_optional_byte_count(200), "200 bytes");
    }
}
