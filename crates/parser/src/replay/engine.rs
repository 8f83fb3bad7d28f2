use std::borrow::Cow;
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::ReplayError;
use crate::conf::{normalize_speed, ReplayConfig, TimeMode};
use crate::time::{line_timestamp, render_like};

/// One source line with its timestamp, if it carries one.
#[derive(Debug, Clone)]
pub(crate) struct RawLine {
    text: String,
    stamp: Option<(DateTime<Utc>, Range<usize>)>,
}

impl RawLine {
    fn new(text: String) -> Self {
        let stamp = line_timestamp(&text);
        Self { text, stamp }
    }

    fn ts(&self) -> Option<DateTime<Utc>> {
        self.stamp.as_ref().map(|(ts, _)| *ts)
    }
}

/// Split raw bytes into lines, terminators kept. Invalid UTF-8 is replaced.
fn split_lines(bytes: &[u8]) -> Vec<RawLine> {
    bytes
        .split_inclusive(|b| *b == b'\n')
        .map(|l| RawLine::new(String::from_utf8_lossy(l).into_owned()))
        .collect()
}

// ── Timeline ────────────────────────────────────────────────────

/// Shared time reference of one replay run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    /// Earliest original timestamp across all sources.
    pub origin: Option<DateTime<Utc>>,
    /// Latest minus earliest original timestamp; the per-cycle offset.
    pub span: chrono::Duration,
    /// Wall-clock instant the origin maps to in realtime mode.
    pub sim_origin: DateTime<Utc>,
    pub speed: f64,
    pub mode: TimeMode,
}

/// What to write and when, relative to the replay start.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step<'a> {
    pub at: Option<Duration>,
    pub text: Cow<'a, str>,
}

impl Timeline {
    /// Shift applied to every line of `cycle`. `None` once the repeated
    /// timeline leaves the representable date range.
    pub fn cycle_offset(&self, cycle: u32) -> Option<chrono::Duration> {
        let offset = self.span.checked_mul(i32::try_from(cycle).ok()?)?;
        let end = offset.checked_add(&self.span)?;
        self.sim_origin.checked_add_signed(end)?;
        Some(offset)
    }

    fn original_offset(&self, ts: DateTime<Utc>, cycle: u32) -> Option<chrono::Duration> {
        let origin = self.origin?;
        (ts - origin).checked_add(&self.cycle_offset(cycle)?)
    }

    /// Delay from the replay start at which a line stamped `ts` is due.
    pub fn due(&self, ts: DateTime<Utc>, cycle: u32) -> Option<Duration> {
        let offset = self.original_offset(ts, cycle)?.to_std().unwrap_or(Duration::ZERO);
        Some(offset.div_f64(self.speed))
    }

    /// Timestamp written for a line stamped `ts` in realtime mode.
    pub fn effective(&self, ts: DateTime<Utc>, cycle: u32) -> DateTime<Utc> {
        match self.original_offset(ts, cycle) {
            Some(offset) => self.sim_origin.checked_add_signed(offset).unwrap_or(ts),
            None => ts,
        }
    }

    /// Schedule one line. Lines without a timestamp reuse `prev`, the last
    /// timestamp seen; with neither they are due immediately.
    pub(crate) fn step<'a>(
        &self,
        line: &'a RawLine,
        cycle: u32,
        prev: &mut Option<(DateTime<Utc>, u32)>,
    ) -> Step<'a> {
        let Some((ts, range)) = &line.stamp else {
            return Step {
                at: prev.and_then(|(ts, c)| self.due(ts, c)),
                text: Cow::Borrowed(&line.text),
            };
        };
        *prev = Some((*ts, cycle));

        let text = match self.mode {
            TimeMode::Original => Cow::Borrowed(line.text.as_str()),
            TimeMode::Realtime => {
                let rendered = render_like(&line.text[range.clone()], &self.effective(*ts, cycle));
                let mut text = String::with_capacity(line.text.len());
                text.push_str(&line.text[..range.start]);
                text.push_str(&rendered);
                text.push_str(&line.text[range.end..]);
                Cow::Owned(text)
            }
        };
        Step {
            at: self.due(*ts, cycle),
            text,
        }
    }
}

// ── Reports ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub lines_written: u64,
    pub cancelled: bool,
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: &Path, destination: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            lines_written: 0,
            cancelled: false,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// In input order.
    pub sources: Vec<SourceReport>,
    pub timeline: Timeline,
}

impl ReplayReport {
    /// True when every source was replayed without an I/O failure.
    pub fn succeeded(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(SourceReport::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| !s.is_ok())
    }

    pub fn lines_written(&self) -> u64 {
        self.sources.iter().map(|s| s.lines_written).sum()
    }
}

// ── Engine ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReplayEngine {
    speed: f64,
    repeat: u32,
    mode: TimeMode,
    work_dir: PathBuf,
    file_prefix: String,
}

impl ReplayEngine {
    pub fn new(cfg: &ReplayConfig) -> Self {
        Self {
            speed: normalize_speed(cfg.speed),
            repeat: cfg.repeat.max(1),
            mode: cfg.time_mode,
            work_dir: cfg.work_dir.clone(),
            file_prefix: cfg.file_prefix.clone(),
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Output path for `source`: always inside the working directory.
    pub fn destination(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source.log".to_string());
        self.work_dir.join(format!("{}{}", self.file_prefix, name))
    }

    /// Replay every source concurrently against one shared start. A source
    /// that cannot be read or written fails alone; only a missing working
    /// directory aborts the run.
    pub async fn run(&self, sources: &[PathBuf], cancel: CancellationToken) -> Result<ReplayReport, ReplayError> {
        if sources.is_empty() {
            return Err(ReplayError::NoInputs);
        }
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| ReplayError::io(&self.work_dir, e))?;

        let mut reports: Vec<SourceReport> = Vec::with_capacity(sources.len());
        let mut loaded: Vec<Option<Vec<RawLine>>> = Vec::with_capacity(sources.len());
        let mut destinations = HashSet::new();
        for source in sources {
            let dest = self.destination(source);
            if !destinations.insert(dest.clone()) {
                warn!(source = %source.display(), dest = %dest.display(), "Sources share a destination; later writes interleave");
            }
            let mut report = SourceReport::new(source, &dest);
            match tokio::fs::read(source).await {
                Ok(bytes) => loaded.push(Some(split_lines(&bytes))),
                Err(e) => {
                    error!(source = %source.display(), error = %e, "Cannot read replay source");
                    report.error = Some(e.to_string());
                    loaded.push(None);
                }
            }
            reports.push(report);
        }

        let timeline = self.timeline(loaded.iter().flatten(), Utc::now());
        info!(
            sources = sources.len(),
            speed = self.speed,
            repeat = self.repeat,
            mode = ?self.mode,
            origin = ?timeline.origin,
            "Starting replay"
        );

        let start = Instant::now();
        let mut tasks = JoinSet::new();
        for (idx, lines) in loaded.into_iter().enumerate() {
            let Some(lines) = lines else { continue };
            let report = reports[idx].clone();
            let repeat = self.repeat;
            let cancel = cancel.clone();
            tasks.spawn(async move {
                (idx, play_source(report, lines, timeline, repeat, start, cancel).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, report)) => reports[idx] = report,
                Err(e) => error!(error = %e, "Replay task aborted"),
            }
        }

        let report = ReplayReport { sources: reports, timeline };
        info!(
            lines = report.lines_written(),
            failed = report.failures().count(),
            "Replay finished"
        );
        Ok(report)
    }

    fn timeline<'a>(&self, sources: impl Iterator<Item = &'a Vec<RawLine>>, now: DateTime<Utc>) -> Timeline {
        let mut bounds: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        for ts in sources.flat_map(|lines| lines.iter().filter_map(RawLine::ts)) {
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(ts), hi.max(ts)),
                None => (ts, ts),
            });
        }
        Timeline {
            origin: bounds.map(|(lo, _)| lo),
            span: bounds.map_or(chrono::Duration::zero(), |(lo, hi)| hi - lo),
            sim_origin: now,
            speed: self.speed,
            mode: self.mode,
        }
    }
}

async fn play_source(
    mut report: SourceReport,
    lines: Vec<RawLine>,
    timeline: Timeline,
    repeat: u32,
    start: Instant,
    cancel: CancellationToken,
) -> SourceReport {
    let mut out = match tokio::fs::File::create(&report.destination).await {
        Ok(f) => f,
        Err(e) => {
            error!(dest = %report.destination.display(), error = %e, "Cannot create replay destination");
            report.error = Some(e.to_string());
            return report;
        }
    };

    let mut prev = None;
    'cycles: for cycle in 0..repeat {
        if timeline.cycle_offset(cycle).is_none() {
            warn!(source = %report.source.display(), cycle, "Repeated timeline out of range; stopping source");
            report.error = Some(format!("replay timeline overflows at cycle {cycle}"));
            break;
        }
        for line in lines.iter() {
            let step = timeline.step(line, cycle, &mut prev);
            if let Some(at) = step.at {
                let Some(deadline) = start.checked_add(at) else {
                    // Beyond the clock range: only cancellation ends the wait.
                    cancel.cancelled().await;
                    report.cancelled = true;
                    break 'cycles;
                };
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break 'cycles;
                    }
                }
            }
            let written = async {
                out.write_all(step.text.as_bytes()).await?;
                out.flush().await
            }
            .await;
            if let Err(e) = written {
                error!(dest = %report.destination.display(), error = %e, "Replay write failed");
                report.error = Some(e.to_string());
                return report;
            }
            report.lines_written += 1;
            trace!(source = %report.source.display(), cycle, line = report.lines_written, "Replayed line");
        }
        debug!(source = %report.source.display(), cycle, "Replay cycle done");
    }

    info!(
        source = %report.source.display(),
        dest = %report.destination.display(),
        lines = report.lines_written,
        cancelled = report.cancelled,
        "Replayed source"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::normalize_timestamp;
    use tempfile::TempDir;

    fn ts(s: &str) -> DateTime<Utc> {
        normalize_timestamp(s).unwrap()
    }

    fn engine(dir: &TempDir, speed: f64, repeat: u32, mode: TimeMode) -> ReplayEngine {
        ReplayEngine::new(&ReplayConfig {
            speed,
            repeat,
            time_mode: mode,
            work_dir: dir.path().join("work"),
            file_prefix: "fake_".to_string(),
        })
    }

    fn timeline(mode: TimeMode, speed: f64, sim: &str) -> Timeline {
        Timeline {
            origin: Some(ts("2020-10-25 19:35:00")),
            span: chrono::Duration::seconds(10),
            sim_origin: ts(sim),
            speed,
            mode,
        }
    }

    // ── Scheduling ──────────────────────────────────────────────

    #[test]
    fn test_original_mode_scaled_delay_and_verbatim_text() {
        let tl = timeline(TimeMode::Original, 10.0, "2026-01-01 00:00:00");
        let line = RawLine::new("2020/10/25 19:35:10 [info/Finder] event_id = 1\n".into());
        let mut prev = None;
        let step = tl.step(&line, 0, &mut prev);
        assert_eq!(step.at, Some(Duration::from_secs(1)));
        assert_eq!(step.text, line.text);
    }

    #[test]
    fn test_untimestamped_lines_reuse_previous() {
        let tl = timeline(TimeMode::Original, 1.0, "2026-01-01 00:00:00");
        let bare = RawLine::new("46.5/7.8/10.0\n".into());
        let mut prev = None;
        assert_eq!(tl.step(&bare, 0, &mut prev).at, None);

        let stamped = RawLine::new("2020/10/25 19:35:04 x\n".into());
        tl.step(&stamped, 0, &mut prev);
        assert_eq!(tl.step(&bare, 0, &mut prev).at, Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_realtime_rewrites_timestamp_shape() {
        let tl = timeline(TimeMode::Realtime, 1.0, "2026-03-02 08:00:00");
        let line = RawLine::new("2020/10/25 19:35:03 [info/Finder] event_id = 1\n".into());
        let mut prev = None;
        let step = tl.step(&line, 0, &mut prev);
        assert_eq!(step.text, "2026/03/02 08:00:03 [info/Finder] event_id = 1\n");

        let frac = RawLine::new("VS 2020-10-25 19:35:02.250000 update\n".into());
        let step = tl.step(&frac, 0, &mut prev);
        assert_eq!(step.text, "VS 2026-03-02 08:00:02.250000 update\n");
    }

    #[test]
    fn test_repeat_cycles_offset_by_span() {
        let tl = timeline(TimeMode::Realtime, 1.0, "2026-03-02 08:00:00");
        let line = RawLine::new("2020/10/25 19:35:00 x\n".into());
        let mut prev = None;
        for k in 0..3u32 {
            let step = tl.step(&line, k, &mut prev);
            assert_eq!(step.at, Some(Duration::from_secs(10 * k as u64)));
            assert_eq!(
                tl.effective(ts("2020-10-25 19:35:00"), k),
                ts("2026-03-02 08:00:00") + chrono::Duration::seconds(10 * k as i64)
            );
        }
    }

    #[test]
    fn test_cycle_offset_out_of_range() {
        let tl = timeline(TimeMode::Realtime, 1.0, "2026-03-02 08:00:00");
        assert_eq!(tl.cycle_offset(3), Some(chrono::Duration::seconds(30)));
        assert_eq!(tl.cycle_offset(u32::MAX), None);

        let wide = Timeline {
            span: chrono::Duration::days(365 * 100_000),
            ..tl
        };
        assert!(wide.cycle_offset(1).is_some());
        assert_eq!(wide.cycle_offset(2), None);
    }

    #[tokio::test]
    async fn test_overflowing_cycle_stops_source() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.log");
        let tl = Timeline {
            origin: None,
            span: chrono::Duration::days(365 * 100_000),
            sim_origin: ts("2026-01-01 00:00:00"),
            speed: 1.0,
            mode: TimeMode::Original,
        };
        let report = SourceReport::new(Path::new("in.log"), &dest);
        let report = play_source(report, split_lines(b"no stamp\n"), tl, 5, Instant::now(), CancellationToken::new()).await;

        assert_eq!(report.lines_written, 2);
        assert!(report.error.as_deref().unwrap().contains("cycle 2"));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "no stamp\nno stamp\n");
    }

    #[test]
    fn test_destination_inside_work_dir() {
        let dir = TempDir::new().unwrap();
        let eng = engine(&dir, 1.0, 1, TimeMode::Original);
        let dest = eng.destination(Path::new("/var/log/finder/scfinder.log"));
        assert_eq!(dest, dir.path().join("work").join("fake_scfinder.log"));
    }

    // ── Runs ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_run_paces_across_sources() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        std::fs::write(&a, "2020/10/25 19:35:00 first\n2020/10/25 19:35:10 second\n").unwrap();
        std::fs::write(&b, "2020/10/25 19:35:05 middle\n").unwrap();

        let eng = engine(&dir, 10.0, 1, TimeMode::Original);
        let started = Instant::now();
        let report = eng.run(&[a.clone(), b.clone()], CancellationToken::new()).await.unwrap();
        let elapsed = started.elapsed();

        assert!(report.succeeded());
        assert_eq!(report.lines_written(), 3);
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1100));
        let out = std::fs::read_to_string(eng.destination(&a)).unwrap();
        assert_eq!(out, "2020/10/25 19:35:00 first\n2020/10/25 19:35:10 second\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_source_isolated() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.log");
        std::fs::write(&good, "2020/10/25 19:35:00 only\n").unwrap();
        let missing = dir.path().join("missing.log");

        let eng = engine(&dir, 1.0, 1, TimeMode::Original);
        let report = eng.run(&[missing, good.clone()], CancellationToken::new()).await.unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.failures().count(), 1);
        assert!(report.sources[1].is_ok());
        assert_eq!(report.sources[1].lines_written, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_writes_every_cycle_and_truncates() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("vs.log");
        std::fs::write(&src, "2020/10/25 19:35:00 a\n2020/10/25 19:35:02 b\n").unwrap();
        let eng = engine(&dir, 1.0, 3, TimeMode::Realtime);
        std::fs::create_dir_all(dir.path().join("work")).unwrap();
        std::fs::write(eng.destination(&src), "stale\n").unwrap();

        let report = eng.run(&[src.clone()], CancellationToken::new()).await.unwrap();
        assert_eq!(report.lines_written(), 6);
        let out = std::fs::read_to_string(eng.destination(&src)).unwrap();
        assert!(!out.contains("stale"));

        let stamps: Vec<_> = out.lines().map(|l| line_timestamp(l).unwrap().0).collect();
        // Rendered without fractions, so compare against the first stamp.
        assert!((stamps[0] - report.timeline.sim_origin).num_seconds().abs() <= 1);
        let offsets: Vec<i64> = stamps.iter().map(|s| (*s - stamps[0]).num_seconds()).collect();
        assert_eq!(offsets, vec![0, 2, 2, 4, 4, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_pending_lines() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("slow.log");
        std::fs::write(&src, "2020/10/25 19:35:00 a\n2020/10/25 20:35:00 b\n").unwrap();
        let eng = engine(&dir, 1.0, 1, TimeMode::Original);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let report = eng.run(&[src], cancel).await.unwrap();
        assert!(report.succeeded());
        assert!(report.sources[0].cancelled);
        assert_eq!(report.sources[0].lines_written, 1);
    }
}
