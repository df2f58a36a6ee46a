//! Compact uptime formatting.

/// Format whole seconds as `1d 2h 3m 4s`, omitting zero components.
pub fn format_seconds(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::format_seconds;

    #[test]
    fn omits_zero_components() {
        assert_eq!(format_seconds(0), "0s");
        assert_eq!(format_seconds(59), "59s");
        assert_eq!(format_seconds(3_600), "1h");
        assert_eq!(format_seconds(93_784), "1d 2h 3m 4s");
        assert_eq!(format_seconds(86_460), "1d 1m");
    }
}
