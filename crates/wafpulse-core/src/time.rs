//! Event timestamp resolution

use chrono::{DateTime, NaiveDateTime, Utc};

/// Accepted textual time formats, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// `2024-01-16T10:20:30Z`, `2024-01-16T10:20:30.123+09:00`
    Rfc3339,
    /// ModSecurity audit log, `Tue Jan 16 10:20:30 2024`
    AuditLog,
    /// ModSecurity error log, `16/Jan/2024:10:20:30 +0000`
    ApacheLog,
    /// `2024-01-16 10:20:30`, taken as UTC
    NaiveSpaced,
    /// `2024-01-16T10:20:30.123`, taken as UTC
    NaiveIso,
    /// Unix epoch seconds
    EpochSeconds,
}

pub const ACCEPTED_FORMATS: [TimeFormat; 6] = [
    TimeFormat::Rfc3339,
    TimeFormat::AuditLog,
    TimeFormat::ApacheLog,
    TimeFormat::NaiveSpaced,
    TimeFormat::NaiveIso,
    TimeFormat::EpochSeconds,
];

impl TimeFormat {
    /// Parse `input` under this format
    pub fn parse(&self, input: &str) -> Option<DateTime<Utc>> {
        match self {
            TimeFormat::Rfc3339 => DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            TimeFormat::AuditLog => NaiveDateTime::parse_from_str(input, "%a %b %e %H:%M:%S %Y")
                .ok()
                .map(|naive| naive.and_utc()),
            TimeFormat::ApacheLog => DateTime::parse_from_str(input, "%d/%b/%Y:%H:%M:%S %z")
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            TimeFormat::NaiveSpaced => NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc()),
            TimeFormat::NaiveIso => NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc()),
            TimeFormat::EpochSeconds => input
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        }
    }
}

/// Parse a timestamp under the first accepted format that matches
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    ACCEPTED_FORMATS.iter().find_map(|format| format.parse(input))
}

/// Resolve an event time from candidate timestamps in priority order,
/// falling back to `now` when none parses.
pub fn resolve_event_time(candidates: &[&str], now: DateTime<Utc>) -> DateTime<Utc> {
    candidates
        .iter()
        .find_map(|candidate| parse_timestamp(candidate))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn expected() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 16, 10, 20, 30).unwrap()
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(parse_timestamp("2024-01-16T10:20:30Z"), Some(expected()));
        assert_eq!(parse_timestamp("2024-01-16T19:20:30+09:00"), Some(expected()));
    }

    #[test]
    fn test_audit_log_format() {
        assert_eq!(parse_timestamp("Tue Jan 16 10:20:30 2024"), Some(expected()));
    }

    #[test]
    fn test_apache_log_format() {
        assert_eq!(parse_timestamp("16/Jan/2024:10:20:30 +0000"), Some(expected()));
    }

    #[test]
    fn test_naive_formats() {
        assert_eq!(parse_timestamp("2024-01-16 10:20:30"), Some(expected()));
        assert_eq!(parse_timestamp("2024-01-16T10:20:30"), Some(expected()));
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(parse_timestamp("1705400430"), Some(expected()));
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_resolve_prefers_first_candidate() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let resolved = resolve_event_time(&["2024-01-16T10:20:30Z", "1600000000"], now);
        assert_eq!(resolved, expected());
    }

    #[test]
    fn test_resolve_falls_back_to_second_candidate() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let resolved = resolve_event_time(&["not a time", "2024-01-16 10:20:30"], now);
        assert_eq!(resolved, expected());
    }

    #[test]
    fn test_resolve_falls_back_to_now() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(resolve_event_time(&["", "garbage"], now), now);
        assert_eq!(resolve_event_time(&[], now), now);
    }
}
