//! EEWPW parser core.
//!
//! Turns Finder and VS earthquake-early-warning logs into one structured
//! schema, either as a merged batch document, an envelope stream, or
//! date-rotated live storage. Also hosts the raw log replay pacer used to
//! simulate live production.

pub mod annotate;
pub mod conf;
pub mod dialect;
pub mod error;
pub mod live;
pub mod model;
pub mod orchestrator;
pub mod replay;
pub mod sink;
pub mod state;
pub mod time;

pub use conf::{Algo, DialectKind, ParserConfig};
pub use error::{Error, Result};
pub use model::{Annotation, Detection, FinalDoc, Meta};
