//! Finder family: scfinder, ShakeAlert, native Finder and legacy native Finder.
//!
//! Blocks open on an anchor line and close on the next anchor, a station table
//! header, or finalize. Station tables are held in the single pending slot of
//! [`StreamState`] and attach to whichever detection is emitted next.

mod block;
mod patterns;
mod shakealert;
mod stations;
mod xml;

use chrono::{DateTime, Utc};
use tracing::{trace, warn};

use self::block::{FinderBlock, Solution};
use self::patterns::*;
use self::shakealert::Capture;
use super::{LineParser, RecordDefaults};
use crate::conf::DialectKind;
use crate::model::{Detection, DetectionCore, FinderDetails, GmInfo, GmObs};
use crate::state::StreamState;
use crate::time::{epoch_to_utc, find_inline, split_prefix, unix_epoch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderVariant {
    ScFinder,
    ShakeAlert,
    Native,
    Legacy,
}

impl FinderVariant {
    pub fn from_kind(kind: DialectKind) -> Option<Self> {
        match kind {
            DialectKind::ScFinder => Some(Self::ScFinder),
            DialectKind::ShakeAlert => Some(Self::ShakeAlert),
            DialectKind::NativeFinder => Some(Self::Native),
            DialectKind::NativeFinderLegacy => Some(Self::Legacy),
            DialectKind::ScVsMag => None,
        }
    }

    pub fn kind(self) -> DialectKind {
        match self {
            Self::ScFinder => DialectKind::ScFinder,
            Self::ShakeAlert => DialectKind::ShakeAlert,
            Self::Native => DialectKind::NativeFinder,
            Self::Legacy => DialectKind::NativeFinderLegacy,
        }
    }

    fn has_playback_marker(self) -> bool {
        matches!(self, Self::ScFinder | Self::ShakeAlert)
    }
}

/// Finder progress for one source.
#[derive(Debug, Default)]
pub struct FinderState {
    block: Option<FinderBlock>,
    /// Solution lines seen since the last anchor; seeds the next block.
    preamble: Solution,
    /// Station rows captured after a header, until a non-row line.
    table: Option<Vec<GmObs>>,
    capture: Option<Capture>,
    legacy_event_id: Option<String>,
    last_epoch: Option<DateTime<Utc>>,
}

impl FinderState {
    pub fn has_open_block(&self) -> bool {
        self.block.is_some() || self.capture.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct FinderDialect {
    variant: FinderVariant,
    defaults: RecordDefaults,
}

impl FinderDialect {
    pub fn new(variant: FinderVariant, defaults: RecordDefaults) -> Self {
        Self { variant, defaults }
    }

    pub fn variant(&self) -> FinderVariant {
        self.variant
    }

    fn is_legacy(&self) -> bool {
        self.variant == FinderVariant::Legacy
    }

    fn note_playback(&self, line: &str, state: &mut StreamState) {
        if self.variant.has_playback_marker() && PLAYBACK_START.is_match(line) {
            if let Some((ts, _)) = split_prefix(line) {
                state.set_playback_time(ts);
            }
        }
    }

    fn on_block_line(
        &self,
        line: &str,
        ts: Option<DateTime<Utc>>,
        state: &mut StreamState,
        out: &mut Vec<Detection>,
    ) {
        let fallback = ts.unwrap_or_else(unix_epoch);

        if state.finder.table.is_some() {
            if let Some(rows) = stations::included(line, fallback) {
                if let Some(table) = state.finder.table.as_mut() {
                    table.extend(rows);
                }
                return;
            }
            if let Some(rows) = state.finder.table.take() {
                trace!(rows = rows.len(), "Station table closed");
                state.set_pending_table(rows);
            }
        }

        if STATION_HEADER.is_match(line) {
            if self.is_legacy() {
                return;
            }
            self.close_block(state, out);
            state.finder.table = Some(Vec::new());
            return;
        }

        if self.is_legacy() {
            if let Some(rows) = stations::included(line, fallback) {
                state.extend_pending_table(rows);
                return;
            }
        }

        if let Some(event_id) = self.anchor(line, state) {
            self.close_block(state, out);
            let preamble = std::mem::take(&mut state.finder.preamble);
            let mut block = FinderBlock::open(event_id, preamble, state.line_no());
            if self.is_legacy() {
                block.anchor_epoch = LEGACY_TIMESTAMP
                    .captures(line)
                    .and_then(|c| epoch_to_utc(&c[1]));
            } else {
                block.note_emission_ts(ts);
            }
            trace!(event_id = %block.event_id, line = block.opened_at, "Finder block opened");
            state.finder.block = Some(block);
            return;
        }

        if self.is_legacy() {
            if let Some(caps) = EVENT_ID.captures(line) {
                let id = caps[1].to_string();
                if let Some(block) = state.finder.block.as_mut() {
                    block.event_id = id.clone();
                }
                state.finder.legacy_event_id = Some(id);
                return;
            }
            if let Some(epoch) = LEGACY_PROCESS_TS.captures(line).and_then(|c| epoch_to_utc(&c[1])) {
                if let Some(block) = state.finder.block.as_mut() {
                    block.process_epoch.get_or_insert(epoch);
                }
                return;
            }
        }

        // Solution lines usually precede the anchor they describe, so they
        // also seed the next block.
        state.finder.preamble.apply(line);
        if let Some(block) = state.finder.block.as_mut() {
            if !self.is_legacy() {
                block.note_emission_ts(ts);
            }
            block.apply(line);
        }
    }

    /// Event id when `line` starts a new block.
    fn anchor(&self, line: &str, state: &StreamState) -> Option<String> {
        if self.is_legacy() {
            LEGACY_TIMESTAMP.is_match(line).then(|| {
                state
                    .finder
                    .legacy_event_id
                    .clone()
                    .unwrap_or_else(|| "0".to_string())
            })
        } else {
            EVENT_ID.captures(line).map(|c| c[1].to_string())
        }
    }

    fn close_block(&self, state: &mut StreamState, out: &mut Vec<Detection>) {
        if let Some(block) = state.finder.block.take() {
            trace!(event_id = %block.event_id, opened_at = block.opened_at, "Finder block closed");
            out.push(self.build(block, state));
        }
    }

    fn build(&self, block: FinderBlock, state: &mut StreamState) -> Detection {
        let origin_epoch = block.metric("origin_time").map(str::to_string);
        let orig_time = origin_epoch
            .as_deref()
            .and_then(epoch_to_utc)
            .or(block.emission_ts)
            .unwrap_or_else(unix_epoch);

        let timestamp = if self.is_legacy() {
            block.anchor_epoch.or(block.process_epoch).unwrap_or(orig_time)
        } else {
            block.emission_ts.unwrap_or(orig_time)
        };

        let version = state.next_version(&block.event_id, block.solution.version);
        let pga_obs = state.take_pending_table();

        let metric = |key: &str| block.metric(key).unwrap_or("0.0").to_string();
        let core_info = DetectionCore {
            id: block.event_id.clone(),
            mag: metric("mag"),
            lat: metric("epicenter_lat"),
            lon: metric("epicenter_lon"),
            depth: metric("depth"),
            orig_time,
            likelihood: block.metric("likelihood").map(str::to_string),
            vs_median_single_station_mag: None,
        };

        let solution_metrics = block
            .metrics
            .iter()
            .filter(|(k, _)| **k != "origin_time")
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let details = FinderDetails {
            solution_metrics,
            origin_time_epoch: origin_epoch,
            solution: block.solution.fields.clone(),
            finder_flags: (!block.solution.flags.is_empty()).then(|| block.solution.flags.clone()),
            extra: Default::default(),
        };
        let finder_details = (details != FinderDetails::default()).then_some(details);

        Detection {
            timestamp,
            event_id: block.event_id,
            category: self.defaults.category.clone(),
            instance: self.defaults.instance.clone(),
            orig_sys: "finder".to_string(),
            version: version.to_string(),
            core_info,
            fault_info: block.rupture,
            gm_info: GmInfo {
                pga_obs,
                ..GmInfo::default()
            },
            finder_details,
            vs_details: None,
            extras: Default::default(),
        }
    }

    fn on_shakealert_line(
        &self,
        line: &str,
        ts: Option<DateTime<Utc>>,
        state: &mut StreamState,
        out: &mut Vec<Detection>,
    ) {
        let payload = shakealert::payload(line);
        match state.finder.capture.as_mut() {
            Some(capture) => capture.push(payload),
            None => match payload.find(shakealert::OPEN_MARKER) {
                Some(start) => {
                    state.finder.capture = Some(Capture::open(&payload[start..], state.line_no(), ts));
                }
                None => return,
            },
        }

        let complete = state.finder.capture.as_ref().is_some_and(Capture::is_complete);
        if !complete {
            return;
        }
        if let Some(capture) = state.finder.capture.take() {
            if let Some(mut d) = shakealert::to_detection(&capture, &self.defaults, state) {
                d.gm_info.pga_obs.extend(state.take_pending_table());
                out.push(d);
            }
        }
    }
}

impl LineParser for FinderDialect {
    fn kind(&self) -> DialectKind {
        self.variant.kind()
    }

    fn line_timestamp(&self, line: &str, state: &mut StreamState) -> Option<DateTime<Utc>> {
        match self.variant {
            FinderVariant::ShakeAlert => find_inline(line).map(|(ts, _)| ts),
            FinderVariant::Legacy => {
                let epoch = LEGACY_TIMESTAMP
                    .captures(line)
                    .or_else(|| LEGACY_PROCESS_TS.captures(line))
                    .and_then(|c| epoch_to_utc(&c[1]));
                if epoch.is_some() {
                    state.finder.last_epoch = epoch;
                }
                state.finder.last_epoch
            }
            FinderVariant::ScFinder | FinderVariant::Native => split_prefix(line).map(|(ts, _)| ts),
        }
    }

    fn on_line(
        &self,
        line: &str,
        ts: Option<DateTime<Utc>>,
        state: &mut StreamState,
        out: &mut Vec<Detection>,
    ) {
        self.note_playback(line, state);
        match self.variant {
            FinderVariant::ShakeAlert => self.on_shakealert_line(line, ts, state, out),
            _ => self.on_block_line(line, ts, state, out),
        }
    }

    fn finish(&self, state: &mut StreamState, out: &mut Vec<Detection>) {
        if let Some(capture) = state.finder.capture.take() {
            warn!(
                source = state.source(),
                line = capture.started_line,
                "Dropping unterminated event_message payload"
            );
        }
        if let Some(rows) = state.finder.table.take() {
            state.set_pending_table(rows);
        }
        self.close_block(state, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect(variant: FinderVariant) -> FinderDialect {
        FinderDialect::new(variant, RecordDefaults::for_algo(crate::conf::Algo::Finder))
    }

    fn run(variant: FinderVariant, text: &str) -> (Vec<Detection>, StreamState) {
        let d = dialect(variant);
        let mut state = StreamState::new("finder.log");
        let mut out = Vec::new();
        for line in text.lines() {
            state.advance(line);
            let ts = d.line_timestamp(line, &mut state);
            d.on_line(line, ts, &mut state, &mut out);
        }
        d.finish(&mut state, &mut out);
        (out, state)
    }

    // ── scfinder ────────────────────────────────────────────────

    const SCFINDER: &str = "\
2020/10/25 19:35:49 [notice/Application] Starting scfinder
2020/10/25 19:35:50 [info/Finder] SOLUTION RUPTURE:  Version 2 Time since = 1.0, Thresh = 4.6, Length = 10.1
2020/10/25 19:35:50 [info/Finder] process: initial finder_flags_new.event_continue = 1
2020/10/25 19:35:51 [info/Finder] event_id = 1603654550
2020/10/25 19:35:51 [info/Finder] -> get_mag = 4.50
2020/10/25 19:35:51 [info/Finder] -> get_mag_uncer = 0.30
2020/10/25 19:35:51 [info/Finder] -> get_epicenter_lat = 46.30
2020/10/25 19:35:51 [info/Finder] -> get_epicenter_lon = 7.60
2020/10/25 19:35:51 [info/Finder] -> get_depth = bad
2020/10/25 19:35:51 [info/Finder] -> get_origin_time = 1603654545.5
2020/10/25 19:35:51 [info/Finder] -> get_rupture_list = 46.2/7.5/0.0 46.4/7.7/0.0
46.5/7.8/10.0
2020/10/25 19:35:52 [info/Finder] The stations that exceeded the minimum threshold
CH.SIMPL.HGZ.-- 46.25/8.03 -- 0.0457 1603654548.0 include = 1
CH.DAVOX.HGZ.-- 46.78/9.88 -- 0.0012 1603654549.0 include = 0
2020/10/25 19:35:53 [info/Finder] event_id = 1603654550
2020/10/25 19:35:53 [info/Finder] -> get_mag = 4.70
";

    #[test]
    fn test_scfinder_blocks() {
        let (dets, state) = run(FinderVariant::ScFinder, SCFINDER);
        assert_eq!(dets.len(), 2);

        let first = &dets[0];
        assert_eq!(first.event_id, "1603654550");
        assert_eq!(first.version, "2");
        assert_eq!(first.core_info.mag, "4.50");
        assert_eq!(first.core_info.depth, "0.0");
        assert_eq!(crate::time::format_iso_z(&first.timestamp), "2020-10-25T19:35:51Z");
        assert_eq!(
            crate::time::format_iso_z(&first.core_info.orig_time),
            "2020-10-25T19:35:45.500000Z"
        );
        assert_eq!(first.fault_info.len(), 3);
        assert!(first.gm_info.pga_obs.is_empty());

        let details = first.finder_details.as_ref().unwrap();
        assert_eq!(details.solution_metrics["mag_uncer"], "0.30");
        assert!(!details.solution_metrics.contains_key("origin_time"));
        assert_eq!(details.origin_time_epoch.as_deref(), Some("1603654545.5"));
        assert_eq!(details.solution["Thresh"], "4.6");
        assert_eq!(details.finder_flags.as_ref().unwrap()["event_continue"], "1");

        // The table preceding the second anchor attaches to the second detection.
        let second = &dets[1];
        assert_eq!(second.version, "3");
        assert_eq!(second.gm_info.pga_obs.len(), 1);
        assert_eq!(second.gm_info.pga_obs[0].sncl, "CH.SIMPL.HGZ.--");
        assert!(!state.has_pending_table());
        assert!(state.playback_time().is_some());
    }

    #[test]
    fn test_version_counter_without_solution() {
        let text = "\
2024-01-01 00:00:01:000| INFO | event_id = 9
2024-01-01 00:00:02:000| INFO | event_id = 9
2024-01-01 00:00:03:000| INFO | event_id = 10
";
        let (dets, _) = run(FinderVariant::Native, text);
        let ids: Vec<_> = dets.iter().map(|d| (d.event_id.as_str(), d.version.as_str())).collect();
        assert_eq!(ids, vec![("9", "0"), ("9", "1"), ("10", "0")]);
        assert!(dets[0].finder_details.is_none());
        assert_eq!(crate::time::format_iso_z(&dets[0].core_info.orig_time), "2024-01-01T00:00:01Z");
    }

    #[test]
    fn test_anchor_prefix_stamps_block() {
        let text = "\
2020/10/25 19:35:51 [info/Finder] event_id = 5
-> get_mag = 3.9
";
        let (dets, _) = run(FinderVariant::ScFinder, text);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].core_info.mag, "3.9");
        assert_eq!(crate::time::format_iso_z(&dets[0].timestamp), "2020-10-25T19:35:51Z");
        assert_eq!(crate::time::format_iso_z(&dets[0].core_info.orig_time), "2020-10-25T19:35:51Z");
    }

    #[test]
    fn test_unparseable_lines_do_not_break_block() {
        let text = "\
2024-01-01 00:00:01 [info] event_id = 4
garbage \u{1F600} ###
2024-01-01 00:00:02 [info] -> get_mag = 3.3
";
        let (dets, _) = run(FinderVariant::ScFinder, text);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].core_info.mag, "3.3");
    }

    #[test]
    fn test_native_has_no_playback_marker() {
        let (_, state) = run(FinderVariant::Native, SCFINDER);
        assert!(state.playback_time().is_none());
    }

    // ── legacy ──────────────────────────────────────────────────

    #[test]
    fn test_legacy_blocks_use_epoch() {
        let text = "\
Timestamp = 1408872923
event_id = 77
-> get_mag = 5.9
SY.A.HNZ.-- 38.2/-122.3 -- 0.31 1408872920.0 include = 1
process: timestamp in process function = 1408872925
Timestamp = 1408872924
-> get_mag = 6.0
";
        let (dets, _) = run(FinderVariant::Legacy, text);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].event_id, "77");
        assert_eq!(dets[0].timestamp.timestamp(), 1408872923);
        assert_eq!(dets[0].gm_info.pga_obs.len(), 1);
        assert_eq!(dets[1].event_id, "77");
        assert_eq!(dets[1].timestamp.timestamp(), 1408872924);
        assert_eq!(dets[1].core_info.mag, "6.0");
    }

    #[test]
    fn test_legacy_default_event_id() {
        let (dets, _) = run(FinderVariant::Legacy, "Timestamp = 1408872923\n-> get_mag = 2.0\n");
        assert_eq!(dets[0].event_id, "0");
    }

    // ── ShakeAlert ──────────────────────────────────────────────

    #[test]
    fn test_shakealert_multiline_payload() {
        let text = "\
00:00:01.100 | INFO | 2025-11-07 00:00:01:076 sending message
00:00:01.200 | INFO | <event_message timestamp=\"2025-11-07T00:00:01.2Z\" version=\"1\">
00:00:01.200 | INFO |   <core_info id=\"42\"><mag>4.1</mag><lat>34.0</lat><lon>-118.0</lon></core_info>
00:00:01.200 | INFO | </event_message>
00:00:02.000 | INFO | <event_message timestamp=\"2025-11-07T00:00:02Z\"><core_info id=\"42\">
";
        let (dets, state) = run(FinderVariant::ShakeAlert, text);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].event_id, "42");
        assert_eq!(dets[0].version, "1");
        assert_eq!(dets[0].core_info.lat, "34.0");
        assert!(!state.finder.has_open_block());
    }

    #[test]
    fn test_shakealert_line_timestamp_is_inline() {
        let d = dialect(FinderVariant::ShakeAlert);
        let mut state = StreamState::new("sa.log");
        let ts = d
            .line_timestamp("00:00:01.100 | INFO | 2025/11/07,00:00:00.0795 tick", &mut state)
            .unwrap();
        assert_eq!(crate::time::format_iso_z(&ts), "2025-11-07T00:00:00.079500Z");
    }
}
