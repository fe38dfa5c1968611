//! Parsing of `--start` / `--end` arguments

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, TimeDelta, Utc};

/// Parse a point in time relative to `now`.
///
/// Accepts `now`, an RFC 3339 timestamp (`2024-05-01T10:00:00Z`), or an
/// amount of time ago such as `30s`, `5m`, `2h` or `1d`.
pub fn parse_time(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if input.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Ok(time) = DateTime::parse_from_rfc3339(input) {
        return Ok(time.with_timezone(&Utc));
    }

    let ago = parse_ago(input)?;
    now.checked_sub_signed(ago)
        .ok_or_else(|| anyhow!("time '{}' is out of range", input))
}

fn parse_ago(input: &str) -> Result<TimeDelta> {
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let amount: i64 = digits
        .parse()
        .with_context(|| format!("invalid time '{}'", input))?;

    let delta = match unit {
        "s" => TimeDelta::try_seconds(amount),
        "m" => TimeDelta::try_minutes(amount),
        "h" => TimeDelta::try_hours(amount),
        "d" => TimeDelta::try_days(amount),
        "" => bail!("missing unit in '{}' (use s, m, h or d)", input),
        other => bail!("unknown time unit '{}' in '{}'", other, input),
    };

    delta.ok_or_else(|| anyhow!("time '{}' is out of range", input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_now() {
        assert_eq!(parse_time("now", now()).unwrap(), now());
        assert_eq!(parse_time(" NOW ", now()).unwrap(), now());
    }

    #[test]
    fn test_parse_rfc3339() {
        let parsed = parse_time("2024-05-01T10:00:00+02:00", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_relative() {
        assert_eq!(
            parse_time("30s", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 59, 30).unwrap()
        );
        assert_eq!(
            parse_time("5m", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 55, 0).unwrap()
        );
        assert_eq!(
            parse_time("2h", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time("1d", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 4, 30, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_time("", now()).is_err());
        assert!(parse_time("5", now()).is_err());
        assert!(parse_time("5w", now()).is_err());
        assert!(parse_time("m", now()).is_err());
        assert!(parse_time("-5m", now()).is_err());
        assert!(parse_time("yesterday", now()).is_err());
    }
}
