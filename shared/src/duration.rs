//! Duration literal parsing: `^([0-9]+)([smhd])?$`.
//!
//! A bare integer means seconds; an optional trailing unit suffix
//! (`s`/`m`/`h`/`d`) scales it. The digit run must be non-empty: a bare
//! unit suffix or an empty string is always rejected.

use std::time::Duration;

use crate::NightWatchError;

/// Parses a duration literal such as `"10s"`, `"2m"`, `"1h"`, `"1d"`, or
/// a bare `"5"` (seconds). Empty strings and anything not matching the
/// pattern are rejected.
pub fn parse_duration(literal: &str) -> crate::Result<Duration> {
    if literal.is_empty() {
        return Err(NightWatchError::ConfigurationInvalid(
            "duration literal cannot be empty".to_string(),
        )
        .into());
    }

    let (digits, unit) = match literal.chars().last() {
        Some(c) if c.is_ascii_digit() => (literal, 's'),
        Some(c) if matches!(c, 's' | 'm' | 'h' | 'd') => (&literal[..literal.len() - 1], c),
        _ => {
            return Err(NightWatchError::ConfigurationInvalid(format!(
                "duration literal '{}' has an unrecognized unit suffix",
                literal
            ))
            .into())
        }
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NightWatchError::ConfigurationInvalid(format!(
            "duration literal '{}' must start with a non-empty digit run",
            literal
        ))
        .into());
    }

    let count: u64 = digits.parse().map_err(|_| {
        NightWatchError::ConfigurationInvalid(format!(
            "duration literal '{}' has an out-of-range count",
            literal
        ))
    })?;

    let seconds = match unit {
        's' => count,
        'm' => count * 60,
        'h' => count * 3600,
        'd' => count * 86400,
        _ => unreachable!(),
    };

    Ok(Duration::from_secs(seconds))
}

/// Formats a duration back to its canonical seconds literal. Used when
/// persisting task config (period fields are stored as the literal that
/// was parsed, or as a plain second count if constructed in memory).
pub fn format_duration_literal(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("xy").is_err());
    }

    #[test]
    fn rejects_unit_without_digits() {
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration("10w").is_err());
    }
}
