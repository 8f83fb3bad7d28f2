use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use super::{Sink, SinkError};
use crate::conf::normalize_speed;
use crate::model::{Annotation, Detection, Meta};

/// Blocks the caller for a computed delay.
pub trait Pacer {
    fn pause(&mut self, delay: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Delays each record by the gap to the previous record's timestamp divided
/// by `speed`, then forwards it unchanged. Out-of-order timestamps are not
/// delayed.
#[derive(Debug)]
pub struct PacingSink<S, P = ThreadPacer> {
    inner: S,
    pacer: P,
    speed: f64,
    last: Option<DateTime<Utc>>,
    paused: Duration,
}

impl<S: Sink> PacingSink<S, ThreadPacer> {
    pub fn new(inner: S, speed: f64) -> Self {
        Self::with_pacer(inner, speed, ThreadPacer)
    }
}

impl<S: Sink, P: Pacer> PacingSink<S, P> {
    pub fn with_pacer(inner: S, speed: f64, pacer: P) -> Self {
        Self {
            inner,
            pacer,
            speed: normalize_speed(speed),
            last: None,
            paused: Duration::ZERO,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn pace(&mut self, ts: DateTime<Utc>) {
        if let Some(prev) = self.last {
            if let Ok(gap) = (ts - prev).to_std() {
                let delay = gap.div_f64(self.speed);
                if !delay.is_zero() {
                    self.pacer.pause(delay);
                    self.paused += delay;
                }
            }
        }
        self.last = Some(self.last.map_or(ts, |prev| prev.max(ts)));
    }
}

impl<S: Sink, P: Pacer> Sink for PacingSink<S, P> {
    type Output = S::Output;

    fn start_run(&mut self, meta: &Meta) -> Result<(), SinkError> {
        self.last = None;
        self.inner.start_run(meta)
    }

    fn emit_detection(&mut self, detection: &Detection) -> Result<(), SinkError> {
        self.pace(detection.timestamp);
        self.inner.emit_detection(detection)
    }

    fn emit_annotation(&mut self, profile: &str, annotation: &Annotation) -> Result<(), SinkError> {
        self.pace(annotation.timestamp);
        self.inner.emit_annotation(profile, annotation)
    }

    fn finalize(&mut self, mut meta: Meta) -> Result<S::Output, SinkError> {
        meta.extras.insert(
            "replay".to_string(),
            json!({
                "speed": self.speed,
                "paused_ms": self.paused.as_millis() as u64,
                "note": "records were paced by their timestamps",
            }),
        );
        self.inner.finalize(meta)
    }
}
