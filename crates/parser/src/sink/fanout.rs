use super::{Sink, SinkError};
use crate::model::{Annotation, Detection, Meta};

/// Forwards every call to two sinks, first `A` then `B`.
#[derive(Debug)]
pub struct Fanout<A, B> {
    pub first: A,
    pub second: B,
}

impl<A: Sink, B: Sink> Fanout<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Sink, B: Sink> Sink for Fanout<A, B> {
    type Output = (A::Output, B::Output);

    fn start_run(&mut self, meta: &Meta) -> Result<(), SinkError> {
        self.first.start_run(meta)?;
        self.second.start_run(meta)
    }

    fn emit_detection(&mut self, detection: &Detection) -> Result<(), SinkError> {
        self.first.emit_detection(detection)?;
        self.second.emit_detection(detection)
    }

    fn emit_annotation(&mut self, profile: &str, annotation: &Annotation) -> Result<(), SinkError> {
        self.first.emit_annotation(profile, annotation)?;
        self.second.emit_annotation(profile, annotation)
    }

    fn finalize(&mut self, meta: Meta) -> Result<Self::Output, SinkError> {
        let a = self.first.finalize(meta.clone())?;
        let b = self.second.finalize(meta)?;
        Ok((a, b))
    }
}
