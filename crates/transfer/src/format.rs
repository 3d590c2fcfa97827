use std::time::Duration;

/// Human-readable byte count (`1.5 GB`), 1024-based.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}

/// Human-readable duration: `12.3s`, `4m 5s`, `2h 3m`.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        return format!("{secs:.1}s");
    }
    let minutes = (secs / 60.0) as u64;
    let rem = secs - (minutes * 60) as f64;
    if minutes < 60 {
        return format!("{minutes}m {rem:.0}s");
    }
    format!("{}h {}m", minutes / 60, minutes % 60)
}
