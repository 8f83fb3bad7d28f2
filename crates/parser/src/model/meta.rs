use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Annotation, Detection};

pub const SCHEMA_VERSION: &str = "2025.0";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Run-level context of a document or stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub algo: String,
    pub dialect: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default, with = "crate::time::iso_z::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::iso_z::option")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::iso_z::option")]
    pub playback_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extras: Map<String, Value>,
    #[serde(default)]
    pub stats_total: BTreeMap<String, u64>,
}

impl Meta {
    pub fn new(algo: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self {
            algo: algo.into(),
            dialect: dialect.into(),
            schema_version: default_schema_version(),
            files: None,
            started_at: None,
            finished_at: None,
            playback_time: None,
            extras: Map::new(),
            stats_total: BTreeMap::new(),
        }
    }

    /// Widen `started_at` / `finished_at` to cover `ts`.
    pub fn observe(&mut self, ts: DateTime<Utc>) {
        self.started_at = Some(self.started_at.map_or(ts, |s| s.min(ts)));
        self.finished_at = Some(self.finished_at.map_or(ts, |f| f.max(ts)));
    }

    pub fn bump(&mut self, key: &str, by: u64) {
        *self.stats_total.entry(key.to_string()).or_insert(0) += by;
    }
}

/// Per-source summary kept in `meta.extras["files"]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file: String,
    #[serde(default, with = "crate::time::iso_z::option")]
    pub playback_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::iso_z::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::iso_z::option")]
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: BTreeMap<String, u64>,
}

/// Unified batch document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDoc {
    pub meta: Meta,
    pub annotations: BTreeMap<String, Vec<Annotation>>,
    pub detections: Vec<Detection>,
}

impl FinalDoc {
    /// Read a document, applying the back-compat defaults of older releases.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut doc: FinalDoc = serde_json::from_str(raw)?;
        for d in &mut doc.detections {
            d.inherit_obs_orig_sys();
        }
        Ok(doc)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.values().map(Vec::len).sum()
    }
}
