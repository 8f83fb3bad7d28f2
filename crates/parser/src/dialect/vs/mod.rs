//! VS (scvsmag) dialect.
//!
//! One event block spans `Start logging for event` to `End logging for
//! event`. A new `Start` while an event is open flushes the open one first.

mod event;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{trace, warn};

use self::event::{EventState, StationReading};
use super::{LineParser, RecordDefaults};
use crate::conf::DialectKind;
use crate::model::Detection;
use crate::state::StreamState;
use crate::time::normalize_timestamp;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex compiles")
}

static PREFIX: Lazy<Regex> = Lazy::new(|| {
    compile(r"^(\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})\s+\[processing/info/VsMagnitude\]\s*(.*)$")
});
static START: Lazy<Regex> = Lazy::new(|| compile(r"Start logging for event:\s*(\S+)"));
static END: Lazy<Regex> = Lazy::new(|| compile(r"End logging for event:\s*(\S+)"));
static UPDATE: Lazy<Regex> = Lazy::new(|| compile(r"update number:\s*(-?\d+)"));
static SENSOR: Lazy<Regex> = Lazy::new(|| {
    compile(r"Sensor:\s*([^;\s]+);\s*Wavetype:\s*([^;]+);\s*Soil class:\s*([^;]+);\s*Magnitude:\s*([^\s;]+)")
});
static STATION_LOC: Lazy<Regex> = Lazy::new(|| {
    compile(r"station lat:\s*([-\d.]+);\s*station lon:\s*([-\d.]+);\s*epicentral distance:\s*([-\d.]+);")
});
static PEAKS_Z: Lazy<Regex> = Lazy::new(|| {
    compile(r"PGA\(Z\):\s*([-\w.+]+);\s*PGV\(Z\):\s*([-\w.+]+);\s*PGD\(Z\):\s*([-\w.+]+)")
});
static PEAKS_H: Lazy<Regex> = Lazy::new(|| {
    compile(r"PGA\(H\):\s*([-\w.+]+);\s*PGV\(H\):\s*([-\w.+]+);\s*PGD\(H\):\s*([-\w.+]+)")
});
static VS_MAG: Lazy<Regex> = Lazy::new(|| {
    compile(concat!(
        r"(?i)VS-mag:\s*([-\d.e+]+|nan)\s*;",
        r"\s*median single-station-mag:\s*([-\d.e+]+|nan)\s*;",
        r"\s*lat:\s*([-\d.e+]+)\s*;",
        r"\s*lon:\s*([-\d.e+]+)\s*;",
        r"\s*depth\s*:\s*([-\d.e+]+)",
    ))
});
static TIMES: Lazy<Regex> = Lazy::new(|| compile(r"creation time:\s*([^;]+);\s*origin time:\s*([^;]+);"));
static LIKELIHOOD: Lazy<Regex> = Lazy::new(|| compile(r"likelihood:\s*([-\d.eE+]+)"));
static UNUSED: Lazy<Regex> = Lazy::new(|| compile(r"Stations not used for VS-mag:\s*(.+)$"));

/// Source text of a finite number, else `None`.
fn finite(raw: &str) -> Option<String> {
    let raw = raw.trim();
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|_| raw.to_string())
}

#[derive(Debug, Default)]
pub struct VsState {
    event: Option<EventState>,
}

impl VsState {
    pub fn active_event(&self) -> Option<&str> {
        self.event.as_ref().map(|e| e.event_id.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct VsDialect {
    defaults: RecordDefaults,
}

impl VsDialect {
    pub fn new(defaults: RecordDefaults) -> Self {
        Self { defaults }
    }

    fn close(&self, state: &mut StreamState, out: &mut Vec<Detection>) {
        if let Some(event) = state.vs.event.take() {
            trace!(event_id = %event.event_id, stations = event.station_count(), "VS event closed");
            out.push(event.into_detection(&self.defaults, state));
        }
    }

    fn apply(event: &mut EventState, message: &str) {
        if let Some(n) = UPDATE.captures(message).and_then(|c| c[1].parse::<i64>().ok()) {
            event.update_number = Some(n);
        }

        if let Some(caps) = SENSOR.captures(message) {
            event.start_station(StationReading {
                sncl: caps[1].to_string(),
                wavetype: caps[2].trim().to_string(),
                soil_class: caps[3].trim().to_string(),
                magnitude: caps[4].to_string(),
                ..StationReading::default()
            });
        }

        if let Some(station) = event.current.as_mut() {
            if let Some(caps) = STATION_LOC.captures(message) {
                station.lat = finite(&caps[1]);
                station.lon = finite(&caps[2]);
                station.epi_dist_km = finite(&caps[3]);
            }
            if let Some(caps) = PEAKS_Z.captures(message) {
                station.z = Some([caps[1].to_string(), caps[2].to_string(), caps[3].to_string()]);
            }
            if let Some(caps) = PEAKS_H.captures(message) {
                station.h = Some([caps[1].to_string(), caps[2].to_string(), caps[3].to_string()]);
            }
        }

        if let Some(caps) = VS_MAG.captures(message) {
            event.vs_mag = finite(&caps[1]);
            event.median_mag = finite(&caps[2]);
            event.lat = finite(&caps[3]);
            event.lon = finite(&caps[4]);
            event.depth = finite(&caps[5]);
        }

        if let Some(caps) = TIMES.captures(message) {
            event.creation_time = normalize_timestamp(&caps[1]);
            event.origin_time = normalize_timestamp(&caps[2]).or(event.creation_time);
        }

        if let Some(caps) = LIKELIHOOD.captures(message) {
            event.likelihood = finite(&caps[1]);
        }

        if let Some(caps) = UNUSED.captures(message) {
            event
                .stations_not_used
                .extend(caps[1].split_whitespace().map(str::to_string));
        }
    }
}

impl LineParser for VsDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::ScVsMag
    }

    fn line_timestamp(&self, line: &str, _state: &mut StreamState) -> Option<DateTime<Utc>> {
        PREFIX.captures(line).and_then(|c| normalize_timestamp(&c[1]))
    }

    fn on_line(
        &self,
        line: &str,
        ts: Option<DateTime<Utc>>,
        state: &mut StreamState,
        out: &mut Vec<Detection>,
    ) {
        let Some(caps) = PREFIX.captures(line) else {
            return;
        };
        let message = caps.get(2).map_or("", |m| m.as_str());

        if let Some(start) = START.captures(message) {
            if let Some(stale) = state.vs.active_event() {
                warn!(source = state.source(), event_id = stale, line = state.line_no(), "VS event restarted before End; flushing");
                self.close(state, out);
            }
            trace!(event_id = &start[1], "VS event opened");
            state.vs.event = Some(EventState::start(&start[1], ts));
            return;
        }

        if END.is_match(message) {
            if let Some(event) = state.vs.event.as_mut() {
                if ts.is_some() {
                    event.last_ts = ts;
                }
            }
            self.close(state, out);
            return;
        }

        let Some(event) = state.vs.event.as_mut() else {
            return;
        };
        if ts.is_some() {
            event.last_ts = ts;
        }
        Self::apply(event, message);
    }

    fn finish(&self, state: &mut StreamState, out: &mut Vec<Detection>) {
        if let Some(id) = state.vs.active_event() {
            trace!(event_id = id, "Flushing open VS event");
        }
        self.close(state, out);
    }
}
