use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use super::AppendLocks;
use crate::model::{Annotation, Detection, Envelope, Meta, RecordType};
use crate::sink::{Phase, Sink, SinkError};

/// `<data_root>/live/raw/<algo>/<YYYY-MM-DD>_<algo>.jsonl`
pub fn daily_path(data_root: &Path, algo: &str, date: NaiveDate) -> PathBuf {
    data_root
        .join("live")
        .join("raw")
        .join(algo)
        .join(format!("{}_{algo}.jsonl", date.format("%Y-%m-%d")))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyReport {
    pub records: u64,
    /// Every file appended to, in rollover order.
    pub paths: Vec<PathBuf>,
}

#[derive(Debug)]
struct OpenDay {
    date: NaiveDate,
    path: PathBuf,
    file: File,
}

/// Appends envelopes to the file of the record's UTC date.
///
/// The active date only moves forward: a record stamped before the current
/// day still lands in the current file, so nothing is appended to a day
/// that has already rolled over. Annotations are routed with the event id
/// of the most recent detection.
#[derive(Debug)]
pub struct DailyWriter {
    data_root: PathBuf,
    algo: String,
    dialect: String,
    instance: String,
    locks: AppendLocks,
    phase: Phase,
    current: Option<OpenDay>,
    last_event_id: Option<String>,
    report: DailyReport,
}

impl DailyWriter {
    pub fn new(data_root: impl Into<PathBuf>, algo: &str, dialect: &str, instance: &str, locks: AppendLocks) -> Self {
        Self {
            data_root: data_root.into(),
            algo: algo.to_string(),
            dialect: dialect.to_string(),
            instance: instance.to_string(),
            locks,
            phase: Phase::default(),
            current: None,
            last_event_id: None,
            report: DailyReport::default(),
        }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|d| d.path.as_path())
    }

    /// Make sure the open file covers `date`, rolling forward if needed.
    fn roll_to(&mut self, date: NaiveDate) -> Result<(), SinkError> {
        if matches!(&self.current, Some(day) if date <= day.date) {
            return Ok(());
        }
        let path = daily_path(&self.data_root, &self.algo, date);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        match &self.current {
            Some(prev) => info!(from = %prev.path.display(), to = %path.display(), "Daily file rolled over"),
            None => info!(path = %path.display(), "Opened daily file"),
        }
        self.report.paths.push(path.clone());
        self.current = Some(OpenDay { date, path, file });
        Ok(())
    }

    fn append(&mut self, ts: DateTime<Utc>, envelope: Envelope) -> Result<(), SinkError> {
        let line = envelope.to_line()?;
        self.roll_to(ts.date_naive())?;
        if let Some(day) = self.current.as_mut() {
            let file = &mut day.file;
            self.locks.with_lock(&day.path, || -> std::io::Result<()> {
                file.write_all(line.as_bytes())?;
                file.flush()
            })?;
            self.report.records += 1;
        }
        Ok(())
    }

    fn envelope(&self, record_type: RecordType, payload: serde_json::Value) -> Envelope {
        Envelope::new(record_type, &self.algo, &self.dialect, &self.instance, payload)
    }
}

impl Sink for DailyWriter {
    type Output = DailyReport;

    fn start_run(&mut self, _meta: &Meta) -> Result<(), SinkError> {
        self.phase.start()
    }

    fn emit_detection(&mut self, detection: &Detection) -> Result<(), SinkError> {
        self.phase.ensure_running("emit_detection")?;
        self.last_event_id = Some(detection.event_id.clone());
        let env = self
            .envelope(RecordType::Detection, serde_json::to_value(detection)?)
            .with_routing(Some(detection.event_id.clone()), detection.timestamp);
        self.append(detection.timestamp, env)
    }

    fn emit_annotation(&mut self, profile: &str, annotation: &Annotation) -> Result<(), SinkError> {
        self.phase.ensure_running("emit_annotation")?;
        let env = self
            .envelope(RecordType::Annotation, serde_json::to_value(annotation)?)
            .with_profile(profile)
            .with_routing(self.last_event_id.clone(), annotation.timestamp);
        self.append(annotation.timestamp, env)
    }

    /// Writes the one trailing meta record into the open file, or into the
    /// file for the run start when nothing was written.
    fn finalize(&mut self, meta: Meta) -> Result<DailyReport, SinkError> {
        self.phase.finish()?;
        let ts = self
            .current
            .as_ref()
            .map(|d| d.date)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
            .or(meta.started_at)
            .unwrap_or_else(Utc::now);
        let stamp = meta.finished_at.unwrap_or(ts);
        let env = self
            .envelope(RecordType::Meta, serde_json::to_value(&meta)?)
            .with_routing(None, stamp);
        self.append(ts, env)?;
        debug!(records = self.report.records, files = self.report.paths.len(), "Daily writer closed");
        self.current = None;
        Ok(std::mem::take(&mut self.report))
    }
}
