use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use eewpw_parser::live::sweep_daily_files;
use tracing::info;

use crate::config::Settings;

#[derive(Parser, Debug, Clone)]
pub(crate) struct CleanupArgs {
    /// Root of the daily storage tree (default: live.data_root)
    #[arg(long, alias = "output-dir", value_name = "DIR")]
    pub data_root: Option<PathBuf>,

    /// Days to keep, today included (minimum 1)
    #[arg(long, value_name = "DAYS")]
    pub retention_days: Option<u32>,
}

pub(crate) fn run(args: CleanupArgs, settings: Settings) -> Result<()> {
    let data_root = args.data_root.unwrap_or(settings.parser.live.data_root);
    let days = args.retention_days.unwrap_or(settings.retention_days);
    let removed = sweep_daily_files(&data_root, days, Utc::now().date_naive())
        .with_context(|| format!("Retention sweep under {} failed", data_root.display()))?;
    for path in &removed {
        info!(path = %path.display(), "Removed");
    }
    Ok(())
}
