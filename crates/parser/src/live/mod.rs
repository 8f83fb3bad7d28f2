//! Live: follow a growing log file, parse it incrementally and append the
//! records to date-rotated JSONL storage.

mod daily;
mod engine;
mod locks;
mod retention;
mod tail;

pub use daily::{daily_path, DailyReport, DailyWriter};
pub use engine::{LiveEngine, LiveReport};
pub use locks::AppendLocks;
pub use retention::sweep_daily_files;
pub use tail::TailSource;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TailError {
    #[error("Log file not found: {0}")]
    Missing(PathBuf),

    #[error("Tail I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TailError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return TailError::Missing(path.into());
        }
        TailError::Io {
            path: path.into(),
            source,
        }
    }
}
