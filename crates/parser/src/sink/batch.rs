use std::collections::BTreeMap;

use super::{Phase, Sink, SinkError};
use crate::model::{Annotation, Detection, FinalDoc, Meta, SCHEMA_VERSION};
use crate::orchestrator::{fill_bounds, merge_detections};

/// Buffers a whole run and assembles one document on finalize.
#[derive(Debug, Default)]
pub struct BatchSink {
    phase: Phase,
    detections: Vec<Detection>,
    annotations: BTreeMap<String, Vec<Annotation>>,
}

impl BatchSink {
    /// `profile` is always present in the document, even without matches.
    pub fn new(profile: &str) -> Self {
        Self {
            annotations: BTreeMap::from([(profile.to_string(), Vec::new())]),
            ..Self::default()
        }
    }
}

impl Sink for BatchSink {
    type Output = FinalDoc;

    fn start_run(&mut self, _meta: &Meta) -> Result<(), SinkError> {
        self.phase.start()
    }

    fn emit_detection(&mut self, detection: &Detection) -> Result<(), SinkError> {
        self.phase.ensure_running("emit_detection")?;
        self.detections.push(detection.clone());
        Ok(())
    }

    fn emit_annotation(&mut self, profile: &str, annotation: &Annotation) -> Result<(), SinkError> {
        self.phase.ensure_running("emit_annotation")?;
        self.annotations
            .entry(profile.to_string())
            .or_default()
            .push(annotation.clone());
        Ok(())
    }

    fn finalize(&mut self, mut meta: Meta) -> Result<FinalDoc, SinkError> {
        self.phase.finish()?;
        let (detections, removed) = merge_detections(std::mem::take(&mut self.detections));
        meta.schema_version = SCHEMA_VERSION.to_string();
        meta.stats_total
            .insert("duplicates_removed".to_string(), removed as u64);
        fill_bounds(&mut meta, &detections);
        Ok(FinalDoc {
            meta,
            annotations: std::mem::take(&mut self.annotations),
            detections,
        })
    }
}
