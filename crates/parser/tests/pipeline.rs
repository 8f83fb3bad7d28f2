//! End-to-end runs across the orchestrator, sinks, replay and live tail.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eewpw_parser::annotate::AnnotationProfile;
use eewpw_parser::conf::{Algo, ParserConfig};
use eewpw_parser::live::{daily_path, LiveEngine};
use eewpw_parser::model::{Envelope, RecordType};
use eewpw_parser::orchestrator::Orchestrator;
use eewpw_parser::replay::ReplayEngine;
use eewpw_parser::sink::JsonlSink;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SCFINDER_A: &str = "\
2020/10/25 19:35:49 [notice/Application] Starting scfinder
2020/10/25 19:35:50 [info/Finder] event_id = 11
2020/10/25 19:35:50 [info/Finder] -> get_mag = 4.1
2020/10/25 19:35:51 [info/Finder] event_id = 11
2020/10/25 19:35:51 [info/Finder] -> get_mag = 4.4
";

const SCFINDER_B: &str = "\
2020/10/25 19:35:48 [info/Finder] event_id = 12
2020/10/25 19:35:48 [info/Finder] -> get_mag = 3.0
2020/10/25 19:35:52 [info/Finder] event_id = 11
2020/10/25 19:35:52 [info/Finder] -> get_mag = 4.6
";

const VS_EVENT: &str = "\
2024/08/14 06:29:20 [processing/info/VsMagnitude] Start logging for event: E1
2024/08/14 06:29:21 [processing/info/VsMagnitude] update number: 3
2024/08/14 06:29:22 [processing/info/VsMagnitude] VS-mag: 4.35; median single-station-mag: 4.20; lat: 46.32; lon: 7.61; depth : 8.0
";

fn profile() -> Arc<AnnotationProfile> {
    Arc::new(AnnotationProfile::from_patterns("time_vs_magnitude", [("mag", r"get_mag\s*="), ("vsmag", r"VS-mag:")]).unwrap())
}

fn write(dir: &TempDir, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn envelopes(text: &str) -> Vec<Envelope> {
    text.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
}

fn read_envelopes(path: &Path) -> Vec<Envelope> {
    envelopes(&std::fs::read_to_string(path).unwrap())
}

/// Poll `path` until it contains `needle`, failing after a generous deadline.
async fn wait_for(path: &Path, needle: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !std::fs::read_to_string(path).is_ok_and(|text| text.contains(needle)) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {needle} in {}",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── Batch / stream parity ───────────────────────────────────────

#[test]
fn test_batch_and_stream_see_the_same_records() {
    let dir = TempDir::new().unwrap();
    let inputs = [write(&dir, "a.log", SCFINDER_A), write(&dir, "b.log", SCFINDER_B)];
    let mut cfg = ParserConfig::for_algo(Algo::Finder);
    cfg.instance = Some("finder@parity".into());
    let orchestrator = Orchestrator::new(&cfg, profile()).unwrap();

    let doc = orchestrator.parse_files(&inputs[..]).unwrap();

    let mut out = Vec::new();
    let written = orchestrator
        .run(&inputs[..], JsonlSink::new(&mut out, "finder", "scfinder", "finder@parity"))
        .unwrap();
    let stream = envelopes(std::str::from_utf8(&out).unwrap());
    assert_eq!(written as usize, stream.len());

    // Stream keeps every record in encounter order with one trailing meta.
    let kinds: Vec<_> = stream.iter().map(|e| e.record_type).collect();
    assert_eq!(kinds.iter().filter(|k| **k == RecordType::Meta).count(), 1);
    assert_eq!(kinds.last(), Some(&RecordType::Meta));

    let streamed_ids: BTreeSet<(String, String)> = stream
        .iter()
        .filter(|e| e.record_type == RecordType::Detection)
        .map(|e| {
            (
                e.payload["event_id"].as_str().unwrap().to_string(),
                e.payload["version"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    let batch_ids: BTreeSet<(String, String)> = doc
        .detections
        .iter()
        .map(|d| (d.event_id.clone(), d.version.clone()))
        .collect();
    assert_eq!(streamed_ids, batch_ids);

    let streamed_detections = kinds.iter().filter(|k| **k == RecordType::Detection).count();
    assert_eq!(streamed_detections, doc.detections.len() + doc.meta.stats_total["duplicates_removed"] as usize);

    // Batch output is time ordered.
    let stamps: Vec<_> = doc.detections.iter().map(|d| d.timestamp).collect();
    let mut sorted = stamps.clone();
    sorted.sort();
    assert_eq!(stamps, sorted);
    assert_eq!(doc.detections[0].event_id, "12");

    let streamed_annotations = kinds.iter().filter(|k| **k == RecordType::Annotation).count();
    assert_eq!(streamed_annotations, doc.annotation_count());

    let meta = &stream.last().unwrap().payload;
    assert_eq!(meta["started_at"], "2020-10-25T19:35:48Z");
    assert_eq!(meta["finished_at"], "2020-10-25T19:35:52Z");
}

// ── Replay into a live tail ─────────────────────────────────────

#[tokio::test]
async fn test_replayed_log_reaches_daily_storage() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "vs.log", VS_EVENT);

    let mut cfg = ParserConfig::for_algo(Algo::Vs);
    cfg.instance = Some("vs@sim".into());
    cfg.replay.speed = 100.0;
    cfg.replay.work_dir = dir.path().join("work");
    cfg.live.data_root = dir.path().join("data");
    cfg.live.poll_interval_ms = 10;
    cfg.live.from_start = true;
    cfg.live.shutdown_grace_ms = 0;

    let replay = ReplayEngine::new(&cfg.replay);
    let target = replay.destination(&source);
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    std::fs::write(&target, "").unwrap();

    let live = LiveEngine::new(&cfg, profile(), &target).unwrap();
    let cancel = CancellationToken::new();

    let day = chrono::NaiveDate::from_ymd_opt(2024, 8, 14).unwrap();
    let daily = daily_path(&cfg.live.data_root, "vs", day);

    // The tail reads from the start, so the replay may begin at once.
    let consumer = live.run(JsonlSink::new(Vec::new(), "vs", "scvsmag", "vs@sim"), cancel.clone());
    let producer = async {
        let report = replay.run(&[source.clone()], CancellationToken::new()).await;
        wait_for(&daily, r#""record_type":"annotation""#).await;
        cancel.cancel();
        report
    };
    let (live_report, replay_report) = tokio::join!(consumer, producer);

    let replay_report = replay_report.unwrap();
    assert!(replay_report.succeeded());
    assert_eq!(replay_report.lines_written(), 3);

    let live_report = live_report.unwrap();
    assert_eq!(live_report.lines, 3);

    let stored = read_envelopes(&daily);
    let kinds: Vec<_> = stored.iter().map(|e| e.record_type).collect();
    assert_eq!(kinds, vec![RecordType::Annotation, RecordType::Detection, RecordType::Meta]);
    assert_eq!(stored[1].event_id.as_deref(), Some("E1"));
    assert_eq!(stored[1].instance, "vs@sim");
    assert_eq!(stored[1].payload["core_info"]["mag"], "4.35");
    assert_eq!(stored[2].payload["stats_total"]["detections"], 1);
}
