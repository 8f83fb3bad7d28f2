//! Orchestrator: drives one dialect over a set of sources and hands every
//! record to a sink.
//!
//! Each source gets its own [`StreamState`] and is read line by line, so the
//! sink sees records in the order they are produced. Run metadata is
//! accumulated as sources complete and handed to the sink exactly once.

mod merge;

pub use merge::{fill_bounds, merge_detections};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::annotate::AnnotationProfile;
use crate::conf::{ConfigError, DialectKind, ParserConfig};
use crate::dialect::{DialectEngine, Emitted};
use crate::error::Result;
use crate::model::{FileSummary, FinalDoc, Meta};
use crate::sink::{BatchSink, Sink, SinkError};
use crate::state::StreamState;

#[derive(Debug)]
pub struct Orchestrator {
    engine: DialectEngine,
    instance: String,
    profile_key: String,
}

impl Orchestrator {
    /// Fails on an invalid configuration before any source is touched.
    pub fn new(cfg: &ParserConfig, profile: Arc<AnnotationProfile>) -> std::result::Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            engine: DialectEngine::from_config(cfg, profile)?,
            instance: cfg.instance_or_default()?,
            profile_key: cfg.annotation_profile.clone(),
        })
    }

    pub fn engine(&self) -> &DialectEngine {
        &self.engine
    }

    pub fn kind(&self) -> DialectKind {
        self.engine.kind()
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Key annotations are grouped under.
    pub fn profile_key(&self) -> &str {
        &self.profile_key
    }

    pub fn new_meta(&self) -> Meta {
        let kind = self.kind();
        Meta::new(kind.algo().as_str(), kind.as_str())
    }

    /// Parse files into one merged document.
    pub fn parse_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<FinalDoc> {
        self.run(paths, BatchSink::new(&self.profile_key))
    }

    /// Parse files, streaming every record into `sink`.
    pub fn run<P: AsRef<Path>, S: Sink>(&self, paths: &[P], sink: S) -> Result<S::Output> {
        let mut readers = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let file = File::open(path).map_err(|e| {
                error!(path = %path.display(), error = %e, "Cannot open source");
                e
            })?;
            readers.push((path.display().to_string(), BufReader::new(file)));
        }
        self.run_readers(readers, sink)
    }

    /// Parse already-open sources, in order.
    pub fn run_readers<R, I, S>(&self, sources: I, mut sink: S) -> Result<S::Output>
    where
        R: BufRead,
        I: IntoIterator<Item = (String, R)>,
        S: Sink,
    {
        let mut run = RunMeta::new(self.new_meta());
        sink.start_run(run.meta())?;

        for (name, reader) in sources {
            let mut state = StreamState::new(name);
            self.drain(reader, &mut state, &mut sink, &mut run)?;
            let tail = self.engine.finalize(&mut state);
            self.forward(&tail, &mut sink, &mut run)?;
            let summary = state.summary();
            info!(
                source = %summary.file,
                lines = state.line_no(),
                detections = summary.stats.get("detections").copied().unwrap_or(0),
                "Parsed source"
            );
            run.absorb(summary);
        }

        let meta = run.finish();
        Ok(sink.finalize(meta)?)
    }

    fn drain<R: BufRead, S: Sink>(
        &self,
        mut reader: R,
        state: &mut StreamState,
        sink: &mut S,
        run: &mut RunMeta,
    ) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            let chunk = String::from_utf8_lossy(&buf);
            let emitted = self.engine.feed(state, &chunk);
            self.forward(&emitted, sink, run)?;
        }
    }

    /// Hand emitted records to the sink, detections first.
    pub fn forward<S: Sink>(
        &self,
        emitted: &Emitted,
        sink: &mut S,
        run: &mut RunMeta,
    ) -> std::result::Result<(), SinkError> {
        for d in &emitted.detections {
            debug!(event_id = %d.event_id, version = %d.version, "Detection emitted");
            sink.emit_detection(d)?;
        }
        for a in &emitted.annotations {
            sink.emit_annotation(&self.profile_key, a)?;
        }
        run.record(emitted);
        Ok(())
    }
}

// ── Run metadata ────────────────────────────────────────────────

/// Meta under construction for one run.
#[derive(Debug)]
pub struct RunMeta {
    meta: Meta,
    files: Vec<FileSummary>,
}

impl RunMeta {
    pub fn new(meta: Meta) -> Self {
        Self { meta, files: Vec::new() }
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    pub fn record(&mut self, emitted: &Emitted) {
        self.meta.bump("detections", emitted.detections.len() as u64);
        self.meta.bump("annotations", emitted.annotations.len() as u64);
    }

    /// Fold a finished source into the run bounds.
    pub fn absorb(&mut self, summary: FileSummary) {
        if let Some(first) = summary.started_at {
            self.meta.started_at = Some(self.meta.started_at.map_or(first, |s| s.min(first)));
        }
        if let Some(last) = summary.finished_at {
            self.meta.finished_at = Some(self.meta.finished_at.map_or(last, |f| f.max(last)));
        }
        if self.meta.playback_time.is_none() {
            self.meta.playback_time = summary.playback_time;
        }
        self.files.push(summary);
    }

    pub fn finish(mut self) -> Meta {
        self.meta.stats_total.entry("detections".into()).or_insert(0);
        self.meta.stats_total.entry("annotations".into()).or_insert(0);
        self.meta
            .stats_total
            .insert("files".to_string(), self.files.len() as u64);
        self.meta.files = Some(self.files.iter().map(|f| f.file.clone()).collect());
        match serde_json::to_value(&self.files) {
            Ok(files) => {
                self.meta.extras.insert("files".to_string(), files);
            }
            Err(e) => error!(error = %e, "Cannot serialize per-source summaries"),
        }
        self.meta
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::conf::Algo;
    use crate::model::{Annotation, Detection, DetectionCore, Extra, GmInfo};
    use crate::sink::JsonlSink;
    use crate::time::normalize_timestamp;

    pub(crate) fn detection_at(event_id: &str, version: &str, ts: &str, mag: &str) -> Detection {
        let timestamp = normalize_timestamp(ts).unwrap();
        Detection {
            timestamp,
            event_id: event_id.to_string(),
            category: "live".to_string(),
            instance: "finder@test".to_string(),
            orig_sys: "finder".to_string(),
            version: version.to_string(),
            core_info: DetectionCore {
                id: event_id.to_string(),
                mag: mag.to_string(),
                lat: "46.0".to_string(),
                lon: "7.0".to_string(),
                depth: "10.0".to_string(),
                orig_time: timestamp,
                likelihood: None,
                vs_median_single_station_mag: None,
            },
            fault_info: Vec::new(),
            gm_info: GmInfo::default(),
            finder_details: None,
            vs_details: None,
            extras: Extra::new(),
        }
    }

    pub(crate) fn annotation_at(ts: &str) -> Annotation {
        Annotation {
            timestamp: normalize_timestamp(ts).unwrap(),
            pattern: r"get_mag\s*=".to_string(),
            pattern_id: "finder/scfinder:mag".to_string(),
            line: 1,
            text: "-> get_mag = 4.1".to_string(),
            matched: "get_mag =".to_string(),
        }
    }

    fn orchestrator(algo: Algo, dialect: &str) -> Orchestrator {
        let cfg = ParserConfig {
            dialect: Some(dialect.to_string()),
            instance: Some(format!("{algo}@test")),
            ..ParserConfig::for_algo(algo)
        };
        let profile = AnnotationProfile::from_patterns(
            "time_vs_magnitude",
            [("mag", r"get_mag\s*="), ("vsmag", r"VS-mag:")],
        )
        .unwrap();
        Orchestrator::new(&cfg, Arc::new(profile)).unwrap()
    }

    const FIRST: &str = "\
2020/10/25 19:35:49 [notice/Application] Starting scfinder
2020/10/25 19:35:50 [info/Finder] event_id = 11
2020/10/25 19:35:50 [info/Finder] -> get_mag = 4.1
2020/10/25 19:35:53 [info/Finder] event_id = 12
2020/10/25 19:35:53 [info/Finder] -> get_mag = 5.0
";

    const SECOND: &str = "\
2020/10/25 19:35:40 [info/Finder] SOLUTION RUPTURE:  Version 0 Time since = 1.0
2020/10/25 19:35:40 [info/Finder] event_id = 11
2020/10/25 19:35:41 [info/Finder] -> get_mag = 4.3
2020/10/25 19:35:42 [info/Finder] unrelated chatter
";

    fn sources() -> Vec<(String, &'static [u8])> {
        vec![
            ("first.log".to_string(), FIRST.as_bytes()),
            ("second.log".to_string(), SECOND.as_bytes()),
        ]
    }

    #[test]
    fn test_invalid_config_fails_before_parsing() {
        let cfg = ParserConfig {
            dialect: Some("scvsmag".into()),
            ..ParserConfig::for_algo(Algo::Finder)
        };
        let err = Orchestrator::new(&cfg, Arc::new(AnnotationProfile::empty("p"))).unwrap_err();
        assert!(matches!(err, ConfigError::DialectMismatch { .. }));
    }

    #[test]
    fn test_batch_merges_sources() {
        let orch = orchestrator(Algo::Finder, "scfinder");
        let doc = orch
            .run_readers(sources(), BatchSink::new(orch.profile_key()))
            .unwrap();

        // Event 11 version 0 appears in both files; the second file wins.
        let ids: Vec<_> = doc
            .detections
            .iter()
            .map(|d| (d.event_id.as_str(), d.version.as_str(), d.core_info.mag.as_str()))
            .collect();
        assert_eq!(ids, vec![("11", "0", "4.3"), ("12", "0", "5.0")]);
        assert!(doc.detections.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let meta = &doc.meta;
        assert_eq!(meta.algo, "finder");
        assert_eq!(meta.dialect, "scfinder");
        assert_eq!(meta.stats_total["files"], 2);
        assert_eq!(meta.stats_total["detections"], 3);
        assert_eq!(meta.stats_total["duplicates_removed"], 1);
        assert_eq!(meta.files.as_deref(), Some(&["first.log".to_string(), "second.log".to_string()][..]));
        assert_eq!(crate::time::format_iso_z(&meta.started_at.unwrap()), "2020-10-25T19:35:40Z");
        assert_eq!(crate::time::format_iso_z(&meta.finished_at.unwrap()), "2020-10-25T19:35:53Z");
        assert_eq!(
            crate::time::format_iso_z(&meta.playback_time.unwrap()),
            "2020-10-25T19:35:49Z"
        );
        assert_eq!(meta.extras["files"][1]["file"], "second.log");

        let anns = &doc.annotations["time_vs_magnitude"];
        assert_eq!(anns.len(), 3);
        assert_eq!(doc.annotation_count(), meta.stats_total["annotations"] as usize);
    }

    #[test]
    fn test_stream_keeps_encounter_order() {
        let orch = orchestrator(Algo::Finder, "scfinder");
        let mut sink = JsonlSink::new(Vec::new(), "finder", "scfinder", orch.instance());
        let written = orch.run_readers(sources(), &mut sink).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(written as usize, lines.len());
        // 3 detections, 3 annotations, 1 meta; no dedup in streams.
        assert_eq!(lines.len(), 7);
        assert!(lines.last().unwrap().contains(r#""record_type":"meta""#));
        assert_eq!(lines.iter().filter(|l| l.contains(r#""record_type":"meta""#)).count(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let orch = orchestrator(Algo::Vs, "scvsmag");
        let err = orch.parse_files(&["/definitely/not/here.log"]).unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }

    #[test]
    fn test_parse_files_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("vs.log");
        std::fs::write(
            &path,
            "2024/08/14 06:29:20 [processing/info/VsMagnitude] Start logging for event: E1\n\
             2024/08/14 06:29:21 [processing/info/VsMagnitude] update number: 1\n\
             2024/08/14 06:29:22 [processing/info/VsMagnitude] VS-mag: 4.35; median single-station-mag: 4.20; lat: 46.32; lon: 7.61; depth : 8.0\n",
        )
        .unwrap();
        let orch = orchestrator(Algo::Vs, "scvsmag");
        let doc = orch.parse_files(&[&path]).unwrap();
        assert_eq!(doc.detections.len(), 1);
        assert_eq!(doc.detections[0].event_id, "E1");
        assert_eq!(doc.detections[0].version, "1");
        assert_eq!(doc.detections[0].instance, "vs@test");
        assert_eq!(doc.annotations["time_vs_magnitude"].len(), 1);
    }
}
