use thiserror::Error;

pub use crate::conf::ConfigError;
pub use crate::live::TailError;
pub use crate::replay::ReplayError;
pub use crate::sink::SinkError;

/// Crate-wide error. Line-level parse problems never surface here; they are
/// dropped inside the dialect state machines.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Tail(#[from] TailError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
