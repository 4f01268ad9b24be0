//! Lenient timestamp decoding for stored documents.
//!
//! Documents written by this server carry RFC 3339 strings. Documents carried
//! over from the legacy collections may instead hold a Firestore timestamp
//! object (`{ "seconds", "nanoseconds" }`, or the `_seconds`/`_nanoseconds`
//! export form) or epoch milliseconds. All of them decode to `DateTime<Utc>`;
//! serialization is left to chrono, so rewritten documents end up as RFC 3339.

use chrono::{DateTime, Utc};
use serde::de;
use std::fmt;

/// `deserialize_with` for `Option<DateTime<Utc>>` fields. Null and
/// unreadable values decode to `None`.
pub fn optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: de::Deserializer<'de>,
{
    deserializer.deserialize_any(TimestampVisitor)
}

/// `deserialize_with` for required timestamps. Null and unreadable values
/// decode to the epoch, which every expiry check treats as long past.
pub fn or_epoch<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: de::Deserializer<'de>,
{
    Ok(optional(deserializer)?.unwrap_or_default())
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

struct TimestampVisitor;

impl<'de> de::Visitor<'de> for TimestampVisitor {
    type Value = Option<DateTime<Utc>>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an RFC 3339 string, epoch milliseconds or a {seconds, nanoseconds} object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(DateTime::parse_from_rfc3339(v)
            .map(|dt| dt.with_timezone(&Utc))
            .ok())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(from_millis(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(i64::try_from(v).ok().and_then(from_millis))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() || v.abs() > i64::MAX as f64 {
            return Ok(None);
        }
        Ok(from_millis(v as i64))
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut seconds: Option<i64> = None;
        let mut nanos: u32 = 0;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "seconds" | "_seconds" => seconds = map.next_value::<Option<i64>>()?,
                "nanoseconds" | "_nanoseconds" => {
                    nanos = map
                        .next_value::<Option<i64>>()?
                        .and_then(|n| u32::try_from(n).ok())
                        .unwrap_or(0);
                }
                _ => {
                    map.next_value::<de::IgnoredAny>()?;
                }
            }
        }
        Ok(seconds.and_then(|secs| DateTime::from_timestamp(secs, nanos)))
    }
}
