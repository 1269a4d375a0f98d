//! Duration grammar: integer followed by one of `s m h d w M y`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("{0:?} is not a valid timerange")]
    NotATimerange(String),
    #[error("{0:?} is not a valid unit")]
    BadUnit(String),
}

/// Parse a duration string like `"5m"`, `"2h"`, `"1y"` into seconds.
///
/// Units: s=1, m=60, h=3600, d=86400, w=604800, M=2592000 (30-day month),
/// y=31536000 (365-day year). Anything else (missing/invalid unit,
/// non-integer prefix) is rejected.
pub fn parse_duration_secs(timerange: &str) -> Result<u64, DurationParseError> {
    if timerange.is_empty() {
        return Err(DurationParseError::NotATimerange(timerange.to_string()));
    }
    let (value_part, unit) = timerange.split_at(timerange.len() - 1);
    let value: u64 = value_part
        .parse()
        .map_err(|_| DurationParseError::NotATimerange(timerange.to_string()))?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        "w" => 604800,
        "M" => 2_592_000,
        "y" => 31_536_000,
        other => return Err(DurationParseError::BadUnit(other.to_string())),
    };
    Ok(value * multiplier)
}
