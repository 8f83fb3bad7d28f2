//! Dialect: line-by-line state machines turning raw algorithm logs into
//! detections, plus the block-independent annotation pass.
//!
//! A [`DialectEngine`] is immutable and shareable. All progress lives in the
//! caller-owned [`StreamState`], so the same engine can drive any number of
//! sources, one state per source.

pub mod finder;
pub mod vs;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::annotate::{AnnotationProfile, Annotator};
use crate::conf::{Algo, ConfigError, DialectKind, ParserConfig};
use crate::model::{Annotation, Detection};
use crate::state::StreamState;

pub use finder::{FinderDialect, FinderVariant};
pub use vs::VsDialect;

/// Fields stamped on records whose log format does not carry them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDefaults {
    pub instance: String,
    pub category: String,
}

impl RecordDefaults {
    pub fn for_algo(algo: Algo) -> Self {
        Self {
            instance: format!("{algo}@unknown"),
            category: "live".to_string(),
        }
    }

    pub fn from_config(cfg: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            instance: cfg.instance_or_default()?,
            category: cfg.category.clone(),
        })
    }
}

/// Records produced by one feed or finalize call, in line order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Emitted {
    pub detections: Vec<Detection>,
    pub annotations: Vec<Annotation>,
}

impl Emitted {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.annotations.is_empty()
    }

    pub fn extend(&mut self, other: Emitted) {
        self.detections.extend(other.detections);
        self.annotations.extend(other.annotations);
    }
}

/// Capability every dialect implements. Implementations keep no state of
/// their own; everything mutable goes through `state`.
pub trait LineParser {
    fn kind(&self) -> DialectKind;

    /// Timestamp attributed to `line` for annotations and time bounds.
    fn line_timestamp(&self, line: &str, state: &mut StreamState) -> Option<DateTime<Utc>>;

    /// Advance the state machine by one complete line.
    fn on_line(
        &self,
        line: &str,
        ts: Option<DateTime<Utc>>,
        state: &mut StreamState,
        out: &mut Vec<Detection>,
    );

    /// Flush whatever block is still open.
    fn finish(&self, state: &mut StreamState, out: &mut Vec<Detection>);
}

/// The closed set of supported dialects.
#[derive(Debug, Clone)]
pub enum Dialect {
    Finder(FinderDialect),
    Vs(VsDialect),
}

impl Dialect {
    pub fn new(kind: DialectKind, defaults: RecordDefaults) -> Self {
        match FinderVariant::from_kind(kind) {
            Some(variant) => Dialect::Finder(FinderDialect::new(variant, defaults)),
            None => Dialect::Vs(VsDialect::new(defaults)),
        }
    }
}

impl LineParser for Dialect {
    fn kind(&self) -> DialectKind {
        match self {
            Dialect::Finder(d) => d.kind(),
            Dialect::Vs(d) => d.kind(),
        }
    }

    fn line_timestamp(&self, line: &str, state: &mut StreamState) -> Option<DateTime<Utc>> {
        match self {
            Dialect::Finder(d) => d.line_timestamp(line, state),
            Dialect::Vs(d) => d.line_timestamp(line, state),
        }
    }

    fn on_line(
        &self,
        line: &str,
        ts: Option<DateTime<Utc>>,
        state: &mut StreamState,
        out: &mut Vec<Detection>,
    ) {
        match self {
            Dialect::Finder(d) => d.on_line(line, ts, state, out),
            Dialect::Vs(d) => d.on_line(line, ts, state, out),
        }
    }

    fn finish(&self, state: &mut StreamState, out: &mut Vec<Detection>) {
        match self {
            Dialect::Finder(d) => d.finish(state, out),
            Dialect::Vs(d) => d.finish(state, out),
        }
    }
}

/// A dialect paired with its annotation pass.
#[derive(Debug)]
pub struct DialectEngine {
    dialect: Dialect,
    annotator: Annotator,
}

impl DialectEngine {
    pub fn new(kind: DialectKind, defaults: RecordDefaults, profile: Arc<AnnotationProfile>) -> Self {
        Self {
            dialect: Dialect::new(kind, defaults),
            annotator: Annotator::new(profile, kind),
        }
    }

    pub fn from_config(cfg: &ParserConfig, profile: Arc<AnnotationProfile>) -> Result<Self, ConfigError> {
        let kind = cfg.dialect_kind()?;
        Ok(Self::new(kind, RecordDefaults::from_config(cfg)?, profile))
    }

    pub fn kind(&self) -> DialectKind {
        self.dialect.kind()
    }

    pub fn profile_name(&self) -> &str {
        self.annotator.profile_name()
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Feed raw text. Only complete lines are processed; the unterminated
    /// tail stays in `state` until more text or [`finalize`](Self::finalize).
    pub fn feed(&self, state: &mut StreamState, chunk: &str) -> Emitted {
        let mut out = Emitted::default();
        if self.rejects_input(state) {
            return out;
        }
        for line in state.push_chunk(chunk) {
            self.process_line(state, &line, &mut out);
        }
        state.record_emitted(&out.detections, out.annotations.len());
        out
    }

    /// Feed one complete line, terminator already stripped.
    pub fn feed_line(&self, state: &mut StreamState, line: &str) -> Emitted {
        let mut out = Emitted::default();
        if self.rejects_input(state) {
            return out;
        }
        self.process_line(state, line, &mut out);
        state.record_emitted(&out.detections, out.annotations.len());
        out
    }

    /// Process any unterminated tail as a final line and flush open blocks.
    /// A second call returns nothing.
    pub fn finalize(&self, state: &mut StreamState) -> Emitted {
        let mut out = Emitted::default();
        if !state.mark_finalized() {
            return out;
        }
        if let Some(line) = state.take_partial() {
            self.process_line(state, &line, &mut out);
        }
        let mut flushed = Vec::new();
        self.dialect.finish(state, &mut flushed);
        out.detections.extend(flushed.into_iter().map(Detection::seal));
        state.record_emitted(&out.detections, out.annotations.len());
        debug!(
            source = state.source(),
            lines = state.line_no(),
            detections = out.detections.len(),
            "Finalized source"
        );
        out
    }

    /// Parse a complete text in one go.
    pub fn parse_all(&self, state: &mut StreamState, text: &str) -> Emitted {
        let mut out = self.feed(state, text);
        out.extend(self.finalize(state));
        out
    }

    fn rejects_input(&self, state: &StreamState) -> bool {
        if state.is_finalized() {
            debug!(source = state.source(), "Ignoring input after finalize");
            return true;
        }
        false
    }

    fn process_line(&self, state: &mut StreamState, line: &str, out: &mut Emitted) {
        let line_no = state.advance(line);
        let ts = self.dialect.line_timestamp(line, state);
        if let Some(ts) = ts {
            state.observe_ts(ts);
        }

        let mut detections = Vec::new();
        self.dialect.on_line(line, ts, state, &mut detections);
        for d in detections {
            trace!(event_id = %d.event_id, version = %d.version, line = line_no, "Detection emitted");
            out.detections.push(d.seal());
        }

        if let Some(ts) = ts {
            out.annotations.extend(self.annotator.annotate(line, line_no, ts));
        }
    }
}
