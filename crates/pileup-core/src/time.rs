//! Timestamp parsing tolerant of the formats the server emits.
//!
//! Push envelopes carry RFC 3339 timestamps with an offset, while stored
//! queue entries are serialized as naive ISO-8601 strings. Naive values are
//! interpreted as UTC.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::errors::{CoreError, Result};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp in RFC 3339 or naive ISO-8601 form.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CoreError::InvalidTimestamp(raw.to_string()))
}

/// Format a timestamp the way the client writes it back out.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `serde(with = ...)` adapter for required timestamps.
pub mod flexible {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as RFC 3339.
    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    /// Deserialize from any accepted format.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// `serde(with = ...)` adapter for optional timestamps.
///
/// Unparseable values decode as `None` rather than failing the whole payload.
pub mod flexible_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as RFC 3339 or `null`.
    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&super::format_timestamp(ts)),
            None => s.serialize_none(),
        }
    }

    /// Deserialize from any accepted format, `null`, or garbage (as `None`).
    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.and_then(|raw| super::parse_timestamp(&raw).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_timestamp("2025-06-01T12:30:00.250+02:00").unwrap();
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn parses_naive_as_utc() {
        let ts = parse_timestamp("2025-06-01T12:30:00.123456").unwrap();
        assert_eq!(ts.hour(), 12);
        assert_eq!(ts.day(), 1);
    }

    #[test]
    fn parses_naive_without_fraction() {
        let ts = parse_timestamp("2025-06-01 08:00:00").unwrap();
        assert_eq!(ts.hour(), 8);
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_timestamp("not a time").unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimestamp(_)));
    }

    #[test]
    fn format_uses_z_suffix() {
        let ts = parse_timestamp("2025-06-01T00:00:00Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2025-06-01T00:00:00.000000Z");
    }
}
