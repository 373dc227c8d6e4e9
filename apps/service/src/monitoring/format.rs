use chrono::TimeDelta;

/// Format a microsecond count for log lines (`"850µs"`, `"12.40ms"`, `"1.50s"`)
pub fn human_micros(micros: u64) -> String {
    match micros {
        0..1_000 => format!("{micros}µs"),
        1_000..1_000_000 => format!("{:.2}ms", micros as f64 / 1_000.0),
        _ => format!("{:.2}s", micros as f64 / 1_000_000.0),
    }
}

/// Format a duration using its two most significant units
pub fn human_duration(delta: TimeDelta) -> String {
    let total = delta.num_seconds().max(0);
    let units = [
        (total / 86_400, "day"),
        ((total % 86_400) / 3_600, "hour"),
        ((total % 3_600) / 60, "minute"),
        (total % 60, "second"),
    ];

    let parts: Vec<String> = units
        .iter()
        .skip_while(|(value, _)| *value == 0)
        .take(2)
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            let plural = if *value == 1 { "" } else { "s" };
            format!("{value} {unit}{plural}")
        })
        .collect();

    if parts.is_empty() { "0 seconds".to_string() } else { parts.join(" ") }
}

/// Whole microseconds in a duration
pub fn micros(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_micros() {
        assert_eq!(human_micros(850), "850µs");
        assert_eq!(human_micros(12_400), "12.40ms");
        assert_eq!(human_micros(1_500_000), "1.50s");
    }

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(TimeDelta::seconds(0)), "0 seconds");
        assert_eq!(human_duration(TimeDelta::seconds(1)), "1 second");
        assert_eq!(human_duration(TimeDelta::seconds(3_725)), "1 hour 2 minutes");
        assert_eq!(human_duration(TimeDelta::seconds(86_400 * 2 + 5)), "2 days");
        assert_eq!(human_duration(TimeDelta::seconds(-30)), "0 seconds");
    }
}
