//! Display formatting helpers.

/// Format a runtime given in minutes, e.g. `"2 hours 5 minutes"`.
///
/// Zero-valued parts are omitted, except that a zero runtime reads
/// `"0 minutes"`. Each unit is singular only when its count is exactly one.
///
/// # Example
///
/// ```
/// use marquee_core::format::format_runtime;
///
/// assert_eq!(format_runtime(125), "2 hours 5 minutes");
/// assert_eq!(format_runtime(61), "1 hour 1 minute");
/// assert_eq!(format_runtime(0), "0 minutes");
/// ```
#[must_use]
pub fn format_runtime(minutes: u32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;

    match (hours, rest) {
        (0, rest) => unit(rest, "minute"),
        (hours, 0) => unit(hours, "hour"),
        (hours, rest) => format!("{} {}", unit(hours, "hour"), unit(rest, "minute")),
    }
}

fn unit(count: u32, name: &str) -> String {
    if count == 1 {
        format!("1 {name}")
    } else {
        format!("{count} {name}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_only() {
        assert_eq!(format_runtime(0), "0 minutes");
        assert_eq!(format_runtime(1), "1 minute");
        assert_eq!(format_runtime(45), "45 minutes");
    }

    #[test]
    fn test_whole_hours() {
        assert_eq!(format_runtime(60), "1 hour");
        assert_eq!(format_runtime(180), "3 hours");
    }

    #[test]
    fn test_minute_plural_does_not_follow_hours() {
        // One hour, several minutes and several hours, one minute
        assert_eq!(format_runtime(62), "1 hour 2 minutes");
        assert_eq!(format_runtime(121), "2 hours 1 minute");
    }
}
