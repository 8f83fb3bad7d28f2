//! Conf: the resolved, immutable run configuration.
//!
//! The core never looks at files or environment variables; a loader outside
//! the library builds a [`ParserConfig`] and hands it down.

mod dialect;
mod model;

pub use dialect::{Algo, DialectKind};
pub use model::{LiveConfig, OutputConfig, ParserConfig, ReplayConfig, TimeMode};
pub(crate) use model::normalize_speed;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown algorithm: {0}")]
    UnknownAlgo(String),

    #[error("Unsupported {algo} dialect: {dialect}")]
    UnknownDialect { algo: Algo, dialect: String },

    #[error("Dialect {dialect} does not belong to algorithm {algo}")]
    DialectMismatch { algo: Algo, dialect: DialectKind },

    #[error("Invalid regex pattern for rule {rule}: {reason}")]
    InvalidRegex { rule: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
