//! ShakeAlert `<event_message>` payloads embedded in Finder logs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::xml::{parse_document, Element};
use crate::dialect::RecordDefaults;
use crate::model::{Detection, DetectionCore, FaultVertex, FinderDetails, GmInfo, GmObs};
use crate::state::StreamState;
use crate::time::{normalize_timestamp, unix_epoch};

pub(crate) const OPEN_MARKER: &str = "<event_message";
pub(crate) const CLOSE_MARKER: &str = "</event_message>";

/// Payload part of a ShakeAlert line: text after `… | … |`, else the line.
pub(crate) fn payload(line: &str) -> &str {
    if line.contains('|') {
        line.splitn(3, '|').last().unwrap_or(line).trim_start()
    } else {
        line
    }
}

/// XML being collected across lines until the close marker arrives.
#[derive(Debug, Clone)]
pub(crate) struct Capture {
    pub xml: String,
    pub started_line: u64,
    pub first_ts: Option<DateTime<Utc>>,
}

impl Capture {
    pub fn open(fragment: &str, started_line: u64, first_ts: Option<DateTime<Utc>>) -> Self {
        Self {
            xml: fragment.to_string(),
            started_line,
            first_ts,
        }
    }

    pub fn push(&mut self, fragment: &str) {
        self.xml.push('\n');
        self.xml.push_str(fragment);
    }

    pub fn is_complete(&self) -> bool {
        self.xml.contains(CLOSE_MARKER)
    }
}

fn numeric(text: Option<&str>) -> Option<String> {
    text.filter(|t| t.parse::<f64>().map(f64::is_finite).unwrap_or(false))
        .map(str::to_string)
}

/// Convert a complete capture into a detection. Malformed XML yields `None`.
pub(crate) fn to_detection(
    capture: &Capture,
    defaults: &RecordDefaults,
    state: &mut StreamState,
) -> Option<Detection> {
    let xml = capture.xml.find(OPEN_MARKER).map(|i| &capture.xml[i..])?;
    let end = xml.find(CLOSE_MARKER)? + CLOSE_MARKER.len();
    let Some(root) = parse_document(&xml[..end]) else {
        debug!(line = capture.started_line, "Skipping malformed event_message payload");
        return None;
    };

    let core_el = root.child("core_info");
    let field = |name: &str| numeric(core_el.and_then(|c| c.child_text(name)));
    let event_id = core_el
        .and_then(|c| c.attr("id"))
        .unwrap_or("0")
        .to_string();

    let attr_ts = root.attr("timestamp").and_then(normalize_timestamp);
    let orig_time = core_el
        .and_then(|c| c.child_text("orig_time"))
        .and_then(normalize_timestamp);
    let timestamp = attr_ts
        .or(orig_time)
        .or(capture.first_ts)
        .unwrap_or_else(unix_epoch);

    let explicit = root.attr("version").and_then(|v| v.parse::<i64>().ok());
    let version = state.next_version(&event_id, explicit);

    let mut metrics = BTreeMap::new();
    for (key, name) in [
        ("mag", "mag"),
        ("epicenter_lat", "lat"),
        ("epicenter_lon", "lon"),
        ("depth", "depth"),
        ("likelihood", "likelihood"),
    ] {
        if let Some(v) = field(name) {
            metrics.insert(key.to_string(), v);
        }
    }

    let core_info = DetectionCore {
        id: event_id.clone(),
        mag: field("mag").unwrap_or_else(|| "0.0".into()),
        lat: field("lat").unwrap_or_else(|| "0.0".into()),
        lon: field("lon").unwrap_or_else(|| "0.0".into()),
        depth: field("depth").unwrap_or_else(|| "0.0".into()),
        orig_time: orig_time.unwrap_or(timestamp),
        likelihood: field("likelihood"),
        vs_median_single_station_mag: None,
    };

    let gm_info = GmInfo {
        pga_obs: pga_obs(&root, timestamp),
        ..GmInfo::default()
    };

    let finder_details = (!metrics.is_empty()).then(|| FinderDetails {
        solution_metrics: metrics,
        ..FinderDetails::default()
    });

    Some(Detection {
        timestamp,
        event_id,
        category: root.attr("category").unwrap_or(defaults.category.as_str()).to_string(),
        instance: root.attr("instance").unwrap_or(defaults.instance.as_str()).to_string(),
        orig_sys: root.attr("orig_sys").unwrap_or("finder").to_string(),
        version: version.to_string(),
        core_info,
        fault_info: vertices(&root),
        gm_info,
        finder_details,
        vs_details: None,
        extras: Default::default(),
    })
}

fn vertices(root: &Element) -> Vec<FaultVertex> {
    root.find_all("fault_info/finite_fault/segment/vertices/vertex")
        .into_iter()
        .filter_map(|v| {
            Some(FaultVertex {
                lat: numeric(v.child_text("lat"))?,
                lon: numeric(v.child_text("lon"))?,
                depth: numeric(v.child_text("depth")),
            })
        })
        .collect()
}

fn pga_obs(root: &Element, fallback: DateTime<Utc>) -> Vec<GmObs> {
    let Some(list) = root.find("gm_info/gmpoint_obs/pga_obs") else {
        return Vec::new();
    };
    list.children
        .iter()
        .filter(|c| c.name == "obs")
        .filter_map(|obs| {
            Some(GmObs {
                orig_sys: Some("finder".to_string()),
                sncl: obs.child_text("SNCL").unwrap_or_default().to_string(),
                value: numeric(obs.child_text("value"))?,
                lat: numeric(obs.child_text("lat"))?,
                lon: numeric(obs.child_text("lon"))?,
                time: obs
                    .child_text("time")
                    .and_then(normalize_timestamp)
                    .unwrap_or(fallback),
                extra: Default::default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = r#"<event_message category="test" timestamp="2025-11-07T00:00:02.000Z" orig_sys="finder" version="3">
  <core_info id="1201">
    <mag units="Mw">4.8</mag><lat units="deg">34.1</lat><lon units="deg">-118.2</lon>
    <depth units="km">8.0</depth><likelihood>0.9</likelihood>
    <orig_time units="UTC">2025-11-07T00:00:00.000Z</orig_time>
  </core_info>
  <fault_info><finite_fault><segment><vertices>
    <vertex><lat>34.0</lat><lon>-118.1</lon><depth>0.0</depth></vertex>
    <vertex><lat>34.2</lat><lon>-118.3</lon><depth>0.0</depth></vertex>
  </vertices></segment></finite_fault></fault_info>
  <gm_info><gmpoint_obs><pga_obs>
    <obs><SNCL>CI.PASC.HNZ.--</SNCL><value>0.02</value><lat>34.17</lat><lon>-118.18</lon><time>2025-11-07T00:00:01Z</time></obs>
    <obs><SNCL>CI.BAD.HNZ.--</SNCL><value>oops</value><lat>34.1</lat><lon>-118.1</lon></obs>
  </pga_obs></gmpoint_obs></gm_info>
</event_message>"#;

    fn defaults() -> RecordDefaults {
        RecordDefaults {
            instance: "finder@sa".into(),
            category: "live".into(),
        }
    }

    #[test]
    fn test_payload_strips_elapsed_prefix() {
        assert_eq!(payload("00:00:01.2 | INFO | <event_message>"), "<event_message>");
        assert_eq!(payload("<event_message>"), "<event_message>");
    }

    #[test]
    fn test_full_message() {
        let mut state = StreamState::new("sa.log");
        let cap = Capture::open(MESSAGE, 1, None);
        let d = to_detection(&cap, &defaults(), &mut state).unwrap();

        assert_eq!(d.event_id, "1201");
        assert_eq!(d.version, "3");
        assert_eq!(d.category, "test");
        assert_eq!(d.instance, "finder@sa");
        assert_eq!(d.core_info.mag, "4.8");
        assert_eq!(d.core_info.likelihood.as_deref(), Some("0.9"));
        assert_eq!(d.core_info.orig_time.to_rfc3339(), "2025-11-07T00:00:00+00:00");
        assert_eq!(d.timestamp.to_rfc3339(), "2025-11-07T00:00:02+00:00");
        assert_eq!(d.fault_info.len(), 2);
        assert_eq!(d.gm_info.pga_obs.len(), 1);
        assert_eq!(d.gm_info.pga_obs[0].sncl, "CI.PASC.HNZ.--");
        let details = d.finder_details.unwrap();
        assert_eq!(details.solution_metrics["epicenter_lon"], "-118.2");
    }

    #[test]
    fn test_missing_version_uses_counter() {
        let mut state = StreamState::new("sa.log");
        let xml = r#"<event_message><core_info id="5"><mag>3.0</mag></core_info></event_message>"#;
        let cap = Capture::open(xml, 1, None);
        let first = to_detection(&cap, &defaults(), &mut state).unwrap();
        let second = to_detection(&cap, &defaults(), &mut state).unwrap();
        assert_eq!(first.version, "0");
        assert_eq!(second.version, "1");
        assert_eq!(first.core_info.lat, "0.0");
        assert_eq!(first.timestamp, unix_epoch());
    }

    #[test]
    fn test_malformed_payload_skipped() {
        let mut state = StreamState::new("sa.log");
        let cap = Capture::open("<event_message><core_info></event_message>", 1, None);
        assert!(to_detection(&cap, &defaults(), &mut state).is_none());
    }
}
