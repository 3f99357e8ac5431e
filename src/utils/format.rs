//! Human-readable size formatting for run output.

/// Format a byte count: one decimal below 10 units, none above.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if size < 10.0 {
        format!("{:.1}{}", size, UNITS[unit_index])
    } else {
        format!("{:.0}{}", size, UNITS[unit_index])
    }
}
