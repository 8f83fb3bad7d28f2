//! Sink: where parsed records go.
//!
//! Every sink follows the same lifecycle: `start_run` once, any number of
//! `emit_*` calls, then `finalize` once. Calls out of order fail with
//! [`SinkError::Lifecycle`].

mod batch;
mod fanout;
mod pacing;
mod stream;

pub use batch::BatchSink;
pub use fanout::Fanout;
pub use pacing::{Pacer, PacingSink, ThreadPacer};
pub use stream::JsonlSink;

use crate::model::{Annotation, Detection, Meta};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{op} is not valid while the sink is {phase}")]
    Lifecycle { op: &'static str, phase: Phase },
}

/// Capability shared by every output.
pub trait Sink {
    type Output;

    fn start_run(&mut self, meta: &Meta) -> Result<(), SinkError>;

    fn emit_detection(&mut self, detection: &Detection) -> Result<(), SinkError>;

    fn emit_annotation(&mut self, profile: &str, annotation: &Annotation) -> Result<(), SinkError>;

    fn finalize(&mut self, meta: Meta) -> Result<Self::Output, SinkError>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    type Output = S::Output;

    fn start_run(&mut self, meta: &Meta) -> Result<(), SinkError> {
        (**self).start_run(meta)
    }

    fn emit_detection(&mut self, detection: &Detection) -> Result<(), SinkError> {
        (**self).emit_detection(detection)
    }

    fn emit_annotation(&mut self, profile: &str, annotation: &Annotation) -> Result<(), SinkError> {
        (**self).emit_annotation(profile, annotation)
    }

    fn finalize(&mut self, meta: Meta) -> Result<Self::Output, SinkError> {
        (**self).finalize(meta)
    }
}

/// Lifecycle position of a sink.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Finalized,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Finalized => "finalized",
        })
    }
}

impl Phase {
    pub fn start(&mut self) -> Result<(), SinkError> {
        self.transition("start_run", Phase::Idle, Phase::Running)
    }

    pub fn ensure_running(&self, op: &'static str) -> Result<(), SinkError> {
        match self {
            Phase::Running => Ok(()),
            phase => Err(SinkError::Lifecycle { op, phase: *phase }),
        }
    }

    pub fn finish(&mut self) -> Result<(), SinkError> {
        self.transition("finalize", Phase::Running, Phase::Finalized)
    }

    fn transition(&mut self, op: &'static str, from: Phase, to: Phase) -> Result<(), SinkError> {
        if *self != from {
            return Err(SinkError::Lifecycle { op, phase: *self });
        }
        *self = to;
        Ok(())
    }
}
