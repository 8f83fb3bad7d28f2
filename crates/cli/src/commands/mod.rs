use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use eewpw_parser::ParserConfig;

pub(crate) mod cleanup;
pub(crate) mod live;
pub(crate) mod parse;
pub(crate) mod replay;

pub(crate) use cleanup::CleanupArgs;
pub(crate) use live::LiveArgs;
pub(crate) use parse::ParseArgs;
pub(crate) use replay::ReplayArgs;

/// Algorithm, dialect and instance flags shared by `parse` and `live`.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct IdentityArgs {
    /// Algorithm: finder | vs
    #[arg(long)]
    pub algo: Option<String>,

    /// Log dialect (default depends on the algorithm)
    #[arg(long)]
    pub dialect: Option<String>,

    /// Instance id stamped on every record (default: <algo>@unknown)
    #[arg(long)]
    pub instance: Option<String>,
}

impl IdentityArgs {
    /// Flags win over the loaded configuration. Switching the algorithm
    /// drops a configured dialect that was meant for the old one.
    pub fn apply(&self, cfg: &mut ParserConfig) {
        if let Some(algo) = &self.algo {
            if !algo.eq_ignore_ascii_case(&cfg.algo) {
                cfg.dialect = None;
            }
            cfg.algo = algo.clone();
        }
        if let Some(dialect) = &self.dialect {
            cfg.dialect = Some(dialect.clone());
        }
        if let Some(instance) = &self.instance {
            cfg.instance = Some(instance.clone());
        }
    }
}

/// Buffered writer for `path`, or stdout when no path is given.
pub(crate) fn open_output(path: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    match path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
            }
            let file = File::create(path).with_context(|| format!("Failed to create output {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(std::io::stdout())),
    }
}

pub(crate) fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
