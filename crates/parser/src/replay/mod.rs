//! Replay: writes historical log lines into fresh files at their original
//! pace, to simulate a live producer for the tail.
//!
//! Lines are copied verbatim (original mode) or with their timestamp text
//! rebased onto the current clock (realtime mode). Nothing is parsed into
//! the record schema here.

mod engine;
mod inputs;

pub use engine::{ReplayEngine, ReplayReport, SourceReport, Timeline};
pub use inputs::{collect_inputs, read_path_list};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("No input log paths provided")]
    NoInputs,

    #[error("Input path is not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReplayError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReplayError::Io {
            path: path.into(),
            source,
        }
    }
}
