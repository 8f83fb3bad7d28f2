//! In-flight VS event and its conversion to a detection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::dialect::RecordDefaults;
use crate::model::{is_reportable_value, Detection, DetectionCore, Extra, GmInfo, GmObs, VsDetails};
use crate::state::StreamState;
use crate::time::unix_epoch;

/// Peak values of one component, in PGA, PGV, PGD order.
pub(crate) type Peaks = [String; 3];

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StationReading {
    pub sncl: String,
    pub wavetype: String,
    pub soil_class: String,
    pub magnitude: String,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub epi_dist_km: Option<String>,
    pub z: Option<Peaks>,
    pub h: Option<Peaks>,
}

impl StationReading {
    /// Magnitudes printed as NaN or the `-1` placeholder disqualify the station.
    fn has_valid_magnitude(&self) -> bool {
        is_reportable_value(&self.magnitude)
    }

    fn vs_extra(&self, component: &str) -> Value {
        json!({
            "component": component,
            "station_magnitude": self.has_valid_magnitude().then(|| self.magnitude.clone()),
            "wavetype": self.wavetype,
            "soil_class": self.soil_class,
            "epi_dist_km": self.epi_dist_km,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct EventState {
    pub event_id: String,
    pub update_number: Option<i64>,
    pub vs_mag: Option<String>,
    pub median_mag: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub depth: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub origin_time: Option<DateTime<Utc>>,
    pub likelihood: Option<String>,
    pub last_ts: Option<DateTime<Utc>>,
    pub stations: Vec<StationReading>,
    pub current: Option<StationReading>,
    pub stations_not_used: Vec<String>,
}

impl EventState {
    pub fn start(event_id: &str, ts: Option<DateTime<Utc>>) -> Self {
        Self {
            event_id: event_id.to_string(),
            last_ts: ts,
            ..Self::default()
        }
    }

    pub fn start_station(&mut self, reading: StationReading) {
        self.flush_station();
        self.current = Some(reading);
    }

    pub fn flush_station(&mut self) {
        if let Some(station) = self.current.take() {
            self.stations.push(station);
        }
    }

    pub fn station_count(&self) -> usize {
        self.stations.len() + usize::from(self.current.is_some())
    }

    /// Close the event into exactly one detection.
    pub fn into_detection(mut self, defaults: &RecordDefaults, state: &mut StreamState) -> Detection {
        self.flush_station();

        let version = state.next_version(&self.event_id, self.update_number);
        let orig_time = self
            .origin_time
            .or(self.creation_time)
            .or(self.last_ts)
            .unwrap_or_else(unix_epoch);
        let timestamp = self.creation_time.or(self.last_ts).unwrap_or(orig_time);

        let (gm_info, dropped) = self.ground_motion(timestamp);

        let mut summary = BTreeMap::new();
        let entries = [
            ("update_number", self.update_number.map(|n| n.to_string())),
            ("likelihood", self.likelihood.clone()),
            ("vs_mag", self.vs_mag.clone()),
            ("median_single_station_mag", self.median_mag.clone()),
        ];
        for (key, value) in entries {
            if let Some(v) = value {
                summary.entry(key.to_string()).or_insert(v);
            }
        }

        let mut extra = Extra::new();
        extra.insert("sentinel_obs_dropped".to_string(), json!(dropped));

        let zero = || "0.0".to_string();
        Detection {
            timestamp,
            event_id: self.event_id.clone(),
            category: defaults.category.clone(),
            instance: defaults.instance.clone(),
            orig_sys: "vs".to_string(),
            version: version.to_string(),
            core_info: DetectionCore {
                id: self.event_id,
                mag: self.vs_mag.unwrap_or_else(zero),
                lat: self.lat.unwrap_or_else(zero),
                lon: self.lon.unwrap_or_else(zero),
                depth: self.depth.unwrap_or_else(zero),
                orig_time,
                likelihood: self.likelihood,
                vs_median_single_station_mag: self.median_mag,
            },
            fault_info: Vec::new(),
            gm_info,
            finder_details: None,
            vs_details: Some(VsDetails {
                summary,
                stations_not_used: self.stations_not_used,
                extra,
            }),
            extras: Extra::new(),
        }
    }

    /// Observations per measure, Z before H for each station. Returns the
    /// number of readings dropped as non-finite or sentinel.
    fn ground_motion(&self, time: DateTime<Utc>) -> (GmInfo, u64) {
        let mut info = GmInfo::default();
        let mut dropped = 0u64;

        for station in &self.stations {
            let (Some(lat), Some(lon)) = (&station.lat, &station.lon) else {
                continue;
            };
            let valid_station = station.has_valid_magnitude();

            for (idx, list) in [&mut info.pga_obs, &mut info.pgv_obs, &mut info.pgd_obs]
                .into_iter()
                .enumerate()
            {
                for (component, peaks) in [("Z", &station.z), ("H", &station.h)] {
                    let Some(peaks) = peaks else { continue };
                    let value = &peaks[idx];
                    if !valid_station || !is_reportable_value(value) {
                        dropped += 1;
                        continue;
                    }
                    let mut extra = Extra::new();
                    extra.insert("vs".to_string(), station.vs_extra(component));
                    list.push(GmObs {
                        orig_sys: Some("vs".to_string()),
                        sncl: station.sncl.clone(),
                        value: value.clone(),
                        lat: lat.clone(),
                        lon: lon.clone(),
                        time,
                        extra,
                    });
                }
            }
        }
        (info, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::Algo;
    use crate::time::normalize_timestamp;

    fn station(sncl: &str, mag: &str, z: [&str; 3], h: [&str; 3]) -> StationReading {
        StationReading {
            sncl: sncl.into(),
            wavetype: "S-wave".into(),
            soil_class: "rock".into(),
            magnitude: mag.into(),
            lat: Some("46.1".into()),
            lon: Some("7.1".into()),
            epi_dist_km: Some("12.5".into()),
            z: Some(z.map(String::from)),
            h: Some(h.map(String::from)),
        }
    }

    #[test]
    fn test_obs_order_and_extra() {
        let mut ev = EventState::start("E1", normalize_timestamp("2024-01-01 00:00:05"));
        ev.start_station(station("CH.A.HGZ", "4.0", ["0.1", "0.2", "0.3"], ["1.1", "1.2", "1.3"]));
        let mut st = StreamState::new("vs.log");
        let d = ev.into_detection(&RecordDefaults::for_algo(Algo::Vs), &mut st);

        let pga: Vec<_> = d.gm_info.pga_obs.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(pga, vec!["0.1", "1.1"]);
        assert_eq!(d.gm_info.pgd_obs[1].value, "1.3");
        assert_eq!(d.gm_info.pga_obs[1].extra["vs"]["component"], "H");
        assert_eq!(d.gm_info.pga_obs[0].extra["vs"]["epi_dist_km"], "12.5");
        assert_eq!(d.instance, "vs@unknown");
        assert!(d.fault_info.is_empty());
    }

    #[test]
    fn test_sentinels_and_invalid_station_dropped() {
        let mut ev = EventState::start("E1", None);
        ev.start_station(station("CH.A.HGZ", "4.0", ["-1.00e+00", "0.2", "nan"], ["0.5", "0.6", "0.7"]));
        ev.start_station(station("CH.B.HGZ", "nan", ["0.1", "0.2", "0.3"], ["0.1", "0.2", "0.3"]));
        ev.start_station(station("CH.C.HGZ", "-1.00e+00", ["0.1", "0.2", "0.3"], ["0.1", "0.2", "0.3"]));
        let mut st = StreamState::new("vs.log");
        let d = ev.into_detection(&RecordDefaults::for_algo(Algo::Vs), &mut st);

        assert_eq!(d.gm_info.pga_obs.len(), 1);
        assert_eq!(d.gm_info.pga_obs[0].sncl, "CH.A.HGZ");
        assert_eq!(d.gm_info.obs_count(), 4);
        let details = d.vs_details.unwrap();
        assert_eq!(details.extra["sentinel_obs_dropped"], 14);
    }

    #[test]
    fn test_station_without_coordinates_skipped() {
        let mut ev = EventState::start("E1", None);
        let mut s = station("CH.A.HGZ", "4.0", ["0.1", "0.2", "0.3"], ["0.1", "0.2", "0.3"]);
        s.lat = None;
        ev.start_station(s);
        assert_eq!(ev.station_count(), 1);
        let mut st = StreamState::new("vs.log");
        let d = ev.into_detection(&RecordDefaults::for_algo(Algo::Vs), &mut st);
        assert_eq!(d.gm_info.obs_count(), 0);
    }

    #[test]
    fn test_defaults_and_time_fallbacks() {
        let last = normalize_timestamp("2024-01-01 00:00:09").unwrap();
        let ev = EventState::start("E9", Some(last));
        let mut st = StreamState::new("vs.log");
        let d = ev.into_detection(&RecordDefaults::for_algo(Algo::Vs), &mut st);
        assert_eq!(d.core_info.mag, "0.0");
        assert_eq!(d.core_info.depth, "0.0");
        assert!(d.core_info.likelihood.is_none());
        assert_eq!(d.core_info.orig_time, last);
        assert_eq!(d.timestamp, last);
        assert_eq!(d.version, "0");
    }
}
