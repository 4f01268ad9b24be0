//! Owner heuristics for legacy documents.
//!
//! Legacy documents carry no authoritative owner. The owner is taken from
//! `userId` if present, else from a `deviceId` other than the shared web
//! client id, else from a slug of the display name. Two different people
//! whose names slug the same end up with one owner.

use serde_json::{Map, Value};

/// Device id every browser session shared before per-device ids existed.
pub const WEB_CLIENT_DEVICE: &str = "web-client";

/// Display name used when a guest didn't enter one.
pub const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerSource {
    UserId,
    DeviceId,
    /// Derived from this display name.
    SlugifiedName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerResolution {
    pub owner: String,
    pub source: OwnerSource,
}

/// Lowercase, then every character outside `[a-z0-9]` becomes `-`.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Owner of a media item or story; falls back to `uploadedBy`.
pub fn resolve_media_owner(data: &Map<String, Value>) -> Option<OwnerResolution> {
    resolve(data, "uploadedBy")
}

/// Owner of a comment or like; falls back to `userName`.
pub fn resolve_comment_owner(data: &Map<String, Value>) -> Option<OwnerResolution> {
    resolve(data, "userName")
}

fn resolve(data: &Map<String, Value>, name_field: &str) -> Option<OwnerResolution> {
    if let Some(user_id) = data.get("userId").and_then(id_value) {
        return Some(OwnerResolution {
            owner: user_id,
            source: OwnerSource::UserId,
        });
    }

    if let Some(device_id) = non_empty_str(data, "deviceId") {
        if device_id != WEB_CLIENT_DEVICE {
            return Some(OwnerResolution {
                owner: device_id.to_string(),
                source: OwnerSource::DeviceId,
            });
        }
    }

    let name = non_empty_str(data, name_field)?;
    if name == ANONYMOUS {
        return None;
    }
    Some(OwnerResolution {
        owner: slugify(name),
        source: OwnerSource::SlugifiedName(name.to_string()),
    })
}

/// String ids verbatim, numeric ids rendered as written. Empty strings and
/// zero count as missing.
pub(crate) fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                (i != 0).then(|| i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().filter(|f| *f != 0.0).map(|f| f.to_string())
            }
        }
        _ => None,
    }
}

fn non_empty_str<'a>(data: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
