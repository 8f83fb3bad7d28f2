//! Annotate: regex profiles matched against every line, independent of
//! detection block state.

mod engine;
mod profile;

pub use engine::Annotator;
pub use profile::{AnnotationProfile, AnnotationRule};
