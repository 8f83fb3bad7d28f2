use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::serde_utils::{gm_info_lenient, list_or_empty};

pub type Extra = Map<String, Value>;

/// One algorithm decision or update. Identity is `(event_id, version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Emission time of this update.
    #[serde(with = "crate::time::iso_z")]
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
    pub category: String,
    pub instance: String,
    pub orig_sys: String,
    pub version: String,
    pub core_info: DetectionCore,
    #[serde(default, deserialize_with = "list_or_empty")]
    pub fault_info: Vec<FaultVertex>,
    #[serde(default, deserialize_with = "gm_info_lenient")]
    pub gm_info: GmInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finder_details: Option<FinderDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vs_details: Option<VsDetails>,
    #[serde(default)]
    pub extras: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionCore {
    pub id: String,
    pub mag: String,
    pub lat: String,
    pub lon: String,
    pub depth: String,
    #[serde(with = "crate::time::iso_z")]
    pub orig_time: DateTime<Utc>,
    #[serde(default)]
    pub likelihood: Option<String>,
    #[serde(default)]
    pub vs_median_single_station_mag: Option<String>,
}

/// Single-station ground-motion observation for one measure.
///
/// Algorithm-specific station metadata goes under a namespaced key in
/// `extra`, e.g. `extra["vs"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmObs {
    #[serde(default)]
    pub orig_sys: Option<String>,
    #[serde(rename = "SNCL")]
    pub sncl: String,
    pub value: String,
    pub lat: String,
    pub lon: String,
    #[serde(with = "crate::time::iso_z")]
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultVertex {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub depth: Option<String>,
}

/// Predicted MMI contour. The polygon is passed through as provided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmiContour {
    #[serde(rename = "MMI")]
    pub mmi: String,
    pub polygon: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmInfo {
    pub pga_obs: Vec<GmObs>,
    pub pgv_obs: Vec<GmObs>,
    pub pgd_obs: Vec<GmObs>,
    pub gmcontour_pred: Vec<MmiContour>,
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderDetails {
    pub solution_metrics: BTreeMap<String, String>,
    pub origin_time_epoch: Option<String>,
    pub solution: BTreeMap<String, String>,
    pub finder_flags: Option<BTreeMap<String, String>>,
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VsDetails {
    pub summary: BTreeMap<String, String>,
    pub stations_not_used: Vec<String>,
    pub extra: Extra,
}

/// A ground-motion value is reportable when it parses to a finite number that
/// is not the `-1` placeholder some algorithms print for missing readings.
pub fn is_reportable_value(raw: &str) -> bool {
    match raw.trim().parse::<f64>() {
        Ok(v) => v.is_finite() && v != -1.0,
        Err(_) => false,
    }
}

impl GmObs {
    pub fn is_reportable(&self) -> bool {
        is_reportable_value(&self.value)
    }
}

impl GmInfo {
    fn lists_mut(&mut self) -> [&mut Vec<GmObs>; 3] {
        [&mut self.pga_obs, &mut self.pgv_obs, &mut self.pgd_obs]
    }

    /// Remove non-finite and sentinel observations. Returns how many were dropped.
    pub fn retain_reportable(&mut self) -> usize {
        let mut dropped = 0;
        for list in self.lists_mut() {
            let before = list.len();
            list.retain(GmObs::is_reportable);
            dropped += before - list.len();
        }
        dropped
    }

    pub fn obs_count(&self) -> usize {
        self.pga_obs.len() + self.pgv_obs.len() + self.pgd_obs.len()
    }
}

impl Detection {
    pub fn identity(&self) -> (&str, &str) {
        (&self.event_id, &self.version)
    }

    /// Observations without a source system inherit the detection's.
    pub fn inherit_obs_orig_sys(&mut self) {
        let orig_sys = self.orig_sys.clone();
        for list in self.gm_info.lists_mut() {
            for obs in list.iter_mut().filter(|o| o.orig_sys.is_none()) {
                obs.orig_sys = Some(orig_sys.clone());
            }
        }
    }

    /// Apply the emission-time invariants: sentinel observations removed,
    /// observation source systems filled in.
    pub fn seal(mut self) -> Self {
        let dropped = self.gm_info.retain_reportable();
        if dropped > 0 {
            tracing::debug!(event_id = %self.event_id, dropped, "Dropped unreportable GM observations");
        }
        self.inherit_obs_orig_sys();
        self
    }
}
