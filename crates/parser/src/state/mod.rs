//! State: per-source parse progress, owned by the caller and threaded
//! through every feed call.

mod recent;

pub use recent::{RecentLines, RECENT_LINES_CAPACITY};

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::dialect::finder::FinderState;
use crate::dialect::vs::VsState;
use crate::model::{FileSummary, GmObs};

/// First and last timestamp seen in one source, in arrival order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeBounds {
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl TimeBounds {
    pub fn observe(&mut self, ts: DateTime<Utc>) {
        if self.first.is_none() {
            self.first = Some(ts);
        }
        self.last = Some(ts);
    }
}

#[derive(Debug, Default)]
pub struct StreamState {
    source: String,
    partial: String,
    line_no: u64,
    finalized: bool,
    pending_table: Option<Vec<GmObs>>,
    versions: HashMap<String, i64>,
    bounds: TimeBounds,
    playback_time: Option<DateTime<Utc>>,
    last_event_id: Option<String>,
    recent: RecentLines,
    detections: u64,
    annotations: u64,
    pub(crate) finder: FinderState,
    pub(crate) vs: VsState,
}

impl StreamState {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    // ── Line intake ─────────────────────────────────────────────

    /// Append raw text and return every line it completes, terminators
    /// stripped. Incomplete trailing text is kept for the next call.
    pub(crate) fn push_chunk(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);
        let Some(last_nl) = self.partial.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_nl + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete
            .split_terminator('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect()
    }

    /// Unterminated trailing text, consumed at finalize.
    pub(crate) fn take_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.partial);
        Some(line.strip_suffix('\r').map(str::to_string).unwrap_or(line))
    }

    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Count a complete line and remember it. Returns its 1-based number.
    pub(crate) fn advance(&mut self, line: &str) -> u64 {
        self.line_no += 1;
        self.recent.push(self.line_no, line);
        self.line_no
    }

    pub fn line_no(&self) -> u64 {
        self.line_no
    }

    pub fn recent(&self) -> &RecentLines {
        &self.recent
    }

    pub(crate) fn mark_finalized(&mut self) -> bool {
        !std::mem::replace(&mut self.finalized, true)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    // ── Auxiliary tables ────────────────────────────────────────

    /// Replace the pending table. Rows are not keyed to any event.
    pub(crate) fn set_pending_table(&mut self, rows: Vec<GmObs>) {
        self.pending_table = Some(rows);
    }

    pub(crate) fn extend_pending_table(&mut self, rows: Vec<GmObs>) {
        self.pending_table.get_or_insert_with(Vec::new).extend(rows);
    }

    pub(crate) fn take_pending_table(&mut self) -> Vec<GmObs> {
        self.pending_table.take().unwrap_or_default()
    }

    pub fn has_pending_table(&self) -> bool {
        self.pending_table.is_some()
    }

    // ── Versions ────────────────────────────────────────────────

    /// Version for the next update of `event_id`. An explicit version wins;
    /// otherwise the first update is 0 and each later one is previous + 1.
    pub(crate) fn next_version(&mut self, event_id: &str, explicit: Option<i64>) -> i64 {
        let version = match (explicit, self.versions.get(event_id)) {
            (Some(v), _) => v,
            (None, Some(prev)) => prev.saturating_add(1),
            (None, None) => 0,
        };
        self.versions.insert(event_id.to_string(), version);
        version
    }

    // ── Time ────────────────────────────────────────────────────

    pub(crate) fn observe_ts(&mut self, ts: DateTime<Utc>) {
        self.bounds.observe(ts);
    }

    pub fn bounds(&self) -> TimeBounds {
        self.bounds
    }

    pub(crate) fn set_playback_time(&mut self, ts: DateTime<Utc>) {
        if self.playback_time.is_none() {
            self.playback_time = Some(ts);
        }
    }

    pub fn playback_time(&self) -> Option<DateTime<Utc>> {
        self.playback_time
    }

    // ── Emission bookkeeping ────────────────────────────────────

    pub(crate) fn record_emitted(&mut self, detections: &[crate::model::Detection], annotations: usize) {
        self.detections += detections.len() as u64;
        self.annotations += annotations as u64;
        if let Some(last) = detections.last() {
            self.last_event_id = Some(last.event_id.clone());
        }
    }

    /// Event id of the most recently emitted detection.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            file: self.source.clone(),
            playback_time: self.playback_time,
            started_at: self.bounds.first,
            finished_at: self.bounds.last,
            stats: BTreeMap::from([
                ("detections".to_string(), self.detections),
                ("annotations".to_string(), self.annotations),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::normalize_timestamp;

    #[test]
    fn test_push_chunk_keeps_partial() {
        let mut st = StreamState::new("a.log");
        assert!(st.push_chunk("first li").is_empty());
        assert!(st.has_partial());
        assert_eq!(st.push_chunk("ne\r\nsecond\nthi"), vec!["first line", "second"]);
        assert_eq!(st.take_partial().as_deref(), Some("thi"));
        assert!(st.take_partial().is_none());
    }

    #[test]
    fn test_push_chunk_empty_lines() {
        let mut st = StreamState::new("a.log");
        assert_eq!(st.push_chunk("\n\nx\n"), vec!["", "", "x"]);
    }

    #[test]
    fn test_advance_counts_absolute_lines() {
        let mut st = StreamState::new("a.log");
        assert_eq!(st.advance("a"), 1);
        assert_eq!(st.advance("b"), 2);
        assert_eq!(st.recent().get(1), Some("a"));
        assert_eq!(st.line_no(), 2);
    }

    #[test]
    fn test_version_counter() {
        let mut st = StreamState::new("a.log");
        assert_eq!(st.next_version("E1", None), 0);
        assert_eq!(st.next_version("E1", None), 1);
        assert_eq!(st.next_version("E2", None), 0);
        assert_eq!(st.next_version("E1", Some(7)), 7);
        assert_eq!(st.next_version("E1", None), 8);
        assert_eq!(st.next_version("E3", Some(-1)), -1);
        assert_eq!(st.next_version("E3", None), 0);
    }

    #[test]
    fn test_pending_table_single_slot() {
        let mut st = StreamState::new("a.log");
        assert!(st.take_pending_table().is_empty());
        st.set_pending_table(Vec::new());
        assert!(st.has_pending_table());
        st.take_pending_table();
        assert!(!st.has_pending_table());
    }

    #[test]
    fn test_bounds_and_playback() {
        let mut st = StreamState::new("a.log");
        let t1 = normalize_timestamp("2024-01-01 00:00:01").unwrap();
        let t2 = normalize_timestamp("2024-01-01 00:00:09").unwrap();
        st.observe_ts(t1);
        st.observe_ts(t2);
        st.set_playback_time(t1);
        st.set_playback_time(t2);

        let summary = st.summary();
        assert_eq!(summary.file, "a.log");
        assert_eq!(summary.started_at, Some(t1));
        assert_eq!(summary.finished_at, Some(t2));
        assert_eq!(summary.playback_time, Some(t1));
        assert_eq!(summary.stats["detections"], 0);
    }

    #[test]
    fn test_finalize_flag_once() {
        let mut st = StreamState::new("a.log");
        assert!(st.mark_finalized());
        assert!(!st.mark_finalized());
        assert!(st.is_finalized());
    }
}
