//! Lenient deserialisers for documents written by older parser releases.

use std::fmt;

use serde::de::{self, DeserializeOwned, Visitor};
use serde::Deserializer;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::detection::GmInfo;

/// `null`, `{}` and `[]` all read back as an empty list.
pub fn list_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(ref map) if map.is_empty() => Ok(Vec::new()),
        other => serde_json::from_value(other).map_err(de::Error::custom),
    }
}

/// `null` and `{}` read back as an empty [`GmInfo`]; unknown keys are kept
/// under `gm_info.extra`.
pub fn gm_info_lenient<'de, D>(deserializer: D) -> Result<GmInfo, D::Error>
where
    D: Deserializer<'de>,
{
    const KNOWN: [&str; 5] = ["pga_obs", "pgv_obs", "pgd_obs", "gmcontour_pred", "extra"];

    let mut map = match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        Value::Null => return Ok(GmInfo::default()),
        other => {
            return Err(de::Error::custom(format!("gm_info must be an object, got {other}")))
        }
    };

    let mut known = Map::new();
    for key in KNOWN {
        if let Some(v) = map.remove(key) {
            known.insert(key.to_string(), v);
        }
    }
    let mut gm: GmInfo = serde_json::from_value(Value::Object(known)).map_err(de::Error::custom)?;
    gm.extra.extend(map);
    Ok(gm)
}

/// Line numbers were once written as strings.
pub fn u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct LineVisitor;

    impl<'de> Visitor<'de> for LineVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a line number as integer or string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(E::custom)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.trim().parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(LineVisitor)
}
