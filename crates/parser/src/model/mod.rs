//! Model: the structured output schema shared by every dialect and sink.

pub mod annotation;
pub mod detection;
pub mod envelope;
pub mod meta;
pub mod serde_utils;

pub use annotation::Annotation;
pub use detection::{
    is_reportable_value, Detection, DetectionCore, Extra, FaultVertex, FinderDetails, GmInfo,
    GmObs, MmiContour, VsDetails,
};
pub use envelope::{Envelope, RecordType};
pub use meta::{FileSummary, FinalDoc, Meta, SCHEMA_VERSION};
