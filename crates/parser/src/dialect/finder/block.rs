//! Accumulation of one Finder detection block.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::patterns::*;
use crate::model::FaultVertex;

/// SOLUTION and finder-flag lines. They may arrive before the anchor of the
/// block they describe, so they are also collected while no block is open.
#[derive(Debug, Default, Clone)]
pub(crate) struct Solution {
    pub fields: BTreeMap<String, String>,
    pub flags: BTreeMap<String, String>,
    pub version: Option<i64>,
}

impl Solution {
    /// Returns true when the line carried solution content.
    pub fn apply(&mut self, line: &str) -> bool {
        if let Some(caps) = SOLUTION_RUPTURE.captures(line) {
            if let Some(v) = SOLUTION_VERSION.captures(line).and_then(|c| c[1].parse().ok()) {
                self.version = Some(v);
                self.fields.insert("Version".to_string(), v.to_string());
            }
            self.insert_pairs(&caps[1]);
            return true;
        }
        if let Some(caps) = SOLUTION_COORDS.captures(line) {
            self.insert_pairs(&caps[1]);
            return true;
        }
        if let Some(caps) = SOLUTION_TEMPLATE.captures(line) {
            self.fields.insert("Template file name".to_string(), caps[1].trim().to_string());
            return true;
        }
        if let Some(caps) = FINDER_FLAG.captures(line) {
            self.flags.insert(caps[1].to_string(), caps[2].trim().to_string());
            return true;
        }
        false
    }

    fn insert_pairs(&mut self, tail: &str) {
        for part in tail.split(',') {
            if let Some((k, v)) = part.split_once('=') {
                let key = k.trim();
                if !key.is_empty() {
                    self.fields.insert(key.to_string(), v.trim().to_string());
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FinderBlock {
    pub event_id: String,
    /// First wall-clock prefix timestamp seen inside the block.
    pub emission_ts: Option<DateTime<Utc>>,
    /// Legacy `Timestamp = <epoch>` anchor value.
    pub anchor_epoch: Option<DateTime<Utc>>,
    /// Legacy `timestamp in process function = <epoch>`.
    pub process_epoch: Option<DateTime<Utc>>,
    /// Validated numeric text keyed by metric name.
    pub metrics: BTreeMap<&'static str, String>,
    pub rupture: Vec<FaultVertex>,
    pub in_rupture: bool,
    pub solution: Solution,
    pub opened_at: u64,
}

impl FinderBlock {
    pub fn open(event_id: String, solution: Solution, opened_at: u64) -> Self {
        Self {
            event_id,
            emission_ts: None,
            anchor_epoch: None,
            process_epoch: None,
            metrics: BTreeMap::new(),
            rupture: Vec::new(),
            in_rupture: false,
            solution,
            opened_at,
        }
    }

    pub fn note_emission_ts(&mut self, ts: Option<DateTime<Utc>>) {
        if self.emission_ts.is_none() {
            self.emission_ts = ts;
        }
    }

    /// Apply a block body line: metrics, rupture vertices, solution fields.
    pub fn apply(&mut self, line: &str) {
        if self.in_rupture {
            if RUPTURE_LINE.is_match(line) {
                self.push_vertices(line);
                return;
            }
            self.in_rupture = false;
        }

        if let Some(caps) = RUPTURE_LIST.captures(line) {
            self.push_vertices(&caps[1]);
            self.in_rupture = true;
            return;
        }

        for (key, re) in METRICS.iter() {
            if let Some(caps) = re.captures(line) {
                let raw = caps[1].trim();
                if raw.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
                    self.metrics.insert(*key, raw.to_string());
                } else {
                    debug!(event_id = %self.event_id, field = *key, value = raw, "Dropping malformed Finder field");
                }
            }
        }

        self.solution.apply(line);
    }

    fn push_vertices(&mut self, text: &str) {
        for caps in RUPTURE_POINT.captures_iter(text) {
            let valid = (1..=3).all(|i| caps[i].parse::<f64>().is_ok());
            if !valid {
                continue;
            }
            self.rupture.push(FaultVertex {
                lat: caps[1].to_string(),
                lon: caps[2].to_string(),
                depth: Some(caps[3].to_string()),
            });
        }
    }

    pub fn metric(&self, key: &str) -> Option<&str> {
        self.metrics.get(key).map(String::as_str)
    }
}
