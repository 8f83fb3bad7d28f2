use std::io::Write;

use super::{Phase, Sink, SinkError};
use crate::model::{Annotation, Detection, Envelope, Meta, RecordType};

/// Writes one envelope per record as it arrives. No buffering, no dedup;
/// `finalize` appends exactly one meta envelope.
#[derive(Debug)]
pub struct JsonlSink<W: Write> {
    writer: W,
    algo: String,
    dialect: String,
    instance: String,
    phase: Phase,
    records: u64,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W, algo: &str, dialect: &str, instance: &str) -> Self {
        Self {
            writer,
            algo: algo.to_string(),
            dialect: dialect.to_string(),
            instance: instance.to_string(),
            phase: Phase::default(),
            records: 0,
        }
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn envelope(&self, record_type: RecordType, payload: serde_json::Value) -> Envelope {
        Envelope::new(record_type, &self.algo, &self.dialect, &self.instance, payload)
    }

    fn write(&mut self, envelope: &Envelope) -> Result<(), SinkError> {
        self.writer.write_all(envelope.to_line()?.as_bytes())?;
        self.records += 1;
        Ok(())
    }
}

impl<W: Write> Sink for JsonlSink<W> {
    /// Number of envelopes written, meta included.
    type Output = u64;

    fn start_run(&mut self, _meta: &Meta) -> Result<(), SinkError> {
        self.phase.start()
    }

    fn emit_detection(&mut self, detection: &Detection) -> Result<(), SinkError> {
        self.phase.ensure_running("emit_detection")?;
        let env = self.envelope(RecordType::Detection, serde_json::to_value(detection)?);
        self.write(&env)
    }

    fn emit_annotation(&mut self, profile: &str, annotation: &Annotation) -> Result<(), SinkError> {
        self.phase.ensure_running("emit_annotation")?;
        let env = self
            .envelope(RecordType::Annotation, serde_json::to_value(annotation)?)
            .with_profile(profile);
        self.write(&env)
    }

    fn finalize(&mut self, meta: Meta) -> Result<u64, SinkError> {
        self.phase.finish()?;
        let env = self.envelope(RecordType::Meta, serde_json::to_value(&meta)?);
        self.write(&env)?;
        self.writer.flush()?;
        Ok(self.records)
    }
}
