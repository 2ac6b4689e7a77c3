use crate::{Error, Result};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved key carrying the sample timestamp
pub const TIMESTAMP_FIELD: &str = "timestamp";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// One write: named float fields stamped with a single UTC timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Metric fields, keyed by name
    pub fields: BTreeMap<String, f64>,
    /// Assigned by the server at write time
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(fields: BTreeMap<String, f64>, timestamp: DateTime<Utc>) -> Self {
        Self { fields, timestamp }
    }

    /// Build a sample from raw `name=value` pairs.
    ///
    /// Every value must parse as a finite float or the whole sample is
    /// rejected. The first occurrence of a repeated key wins, and a
    /// client-supplied `timestamp` key is ignored.
    pub fn from_pairs<I, K, V>(pairs: I, timestamp: DateTime<Utc>) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut fields = BTreeMap::new();
        for (name, raw) in pairs {
            let name = name.into();
            if name == TIMESTAMP_FIELD || fields.contains_key(&name) {
                continue;
            }
            let value = parse_finite(raw.as_ref()).ok_or_else(|| {
                Error::InvalidSample(format!("field '{}' is not a finite float", name))
            })?;
            fields.insert(name, value);
        }
        Ok(Self { fields, timestamp })
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Render a timestamp as ISO-8601 UTC with six fractional digits and `Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted timestamp.
///
/// Accepts RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS[.f]` forms, the latter
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry(TIMESTAMP_FIELD, &format_timestamp(&self.timestamp))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(SampleVisitor)
    }
}

struct SampleVisitor;

impl<'de> Visitor<'de> for SampleVisitor {
    type Value = Sample;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object of numeric fields with a timestamp string")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Sample, A::Error> {
        let mut fields = BTreeMap::new();
        let mut timestamp = None;

        while let Some(key) = access.next_key::<String>()? {
            if key == TIMESTAMP_FIELD {
                let raw: String = access.next_value()?;
                let ts = parse_timestamp(&raw)
                    .ok_or_else(|| de::Error::custom(format!("bad timestamp '{}'", raw)))?;
                timestamp = Some(ts);
            } else {
                let value: f64 = access.next_value()?;
                fields.insert(key, value);
            }
        }

        let timestamp = timestamp.ok_or_else(|| de::Error::missing_field(TIMESTAMP_FIELD))?;
        Ok(Sample { fields, timestamp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_from_pairs_parses_floats() {
        let sample = Sample::from_pairs([("load", "0.42"), ("temp", " 21 ")], ts()).unwrap();
        assert_eq!(sample.get("load"), Some(0.42));
        assert_eq!(sample.get("temp"), Some(21.0));
    }

    #[test]
    fn test_from_pairs_rejects_whole_sample() {
        let err = Sample::from_pairs([("ok", "1"), ("x", "abc")], ts()).unwrap_err();
        assert!(matches!(err, Error::InvalidSample(msg) if msg.contains("'x'")));
    }

    #[test]
    fn test_from_pairs_rejects_non_finite() {
        for raw in ["nan", "inf", "-infinity", "NaN"] {
            assert!(Sample::from_pairs([("x", raw)], ts()).is_err(), "{raw} accepted");
        }
    }

    #[test]
    fn test_from_pairs_first_value_wins_and_timestamp_ignored() {
        let sample = Sample::from_pairs(
            [("a", "1"), ("a", "2"), ("timestamp", "not-a-date")],
            ts(),
        )
        .unwrap();
        assert_eq!(sample.get("a"), Some(1.0));
        assert_eq!(sample.fields.len(), 1);
        assert_eq!(sample.timestamp, ts());
    }

    #[test]
    fn test_serialize_puts_timestamp_last() {
        let sample = Sample::from_pairs([("load", "0.42")], ts()).unwrap();
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"load":0.42,"timestamp":"2024-03-01T10:00:00.000000Z"}"#);
    }

    #[test]
    fn test_deserialize_accepts_legacy_timestamps() {
        let short: Sample =
            serde_json::from_str(r#"{"v": 1, "timestamp": "2024-03-01T10:00:00Z"}"#).unwrap();
        let naive: Sample =
            serde_json::from_str(r#"{"v": 1.5, "timestamp": "2024-03-01T10:00:00.250000"}"#)
                .unwrap();
        assert_eq!(short.timestamp, ts());
        assert_eq!(naive.timestamp, ts() + chrono::Duration::milliseconds(250));
        assert_eq!(short.get("v"), Some(1.0));
    }

    #[test]
    fn test_deserialize_rejects_missing_timestamp_and_strings() {
        assert!(serde_json::from_str::<Sample>(r#"{"v": 1}"#).is_err());
        assert!(
            serde_json::from_str::<Sample>(r#"{"v": "x", "timestamp": "2024-03-01T10:00:00Z"}"#)
                .is_err()
        );
    }

    #[test]
    fn test_format_is_lexically_ordered() {
        let a = format_timestamp(&ts());
        let b = format_timestamp(&(ts() + chrono::Duration::microseconds(5)));
        assert!(a < b);
        assert!(a.ends_with('Z'));
    }
}
