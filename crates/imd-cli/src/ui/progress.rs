//! Download progress formatting

/// Human readable byte count (`1.5 MB`).
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// `current / total (pct%)`, or just `current` when the size is unknown.
pub fn format_progress(current: u64, total: Option<u64>) -> String {
    match total.filter(|&t| t > 0) {
        Some(t) => {
            let pct = (current.min(t) * 100) / t;
            format!("{} / {} ({pct}%)", format_size(current), format_size(t))
        }
        None => format_size(current),
    }
}
