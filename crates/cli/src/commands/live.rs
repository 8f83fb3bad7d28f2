use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use eewpw_parser::conf::LiveConfig;
use eewpw_parser::live::LiveEngine;
use eewpw_parser::sink::JsonlSink;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::IdentityArgs;
use crate::config::Settings;
use crate::profile::load_profile;

#[derive(Parser, Debug, Clone)]
pub(crate) struct LiveArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Log file to follow
    #[arg(long, value_name = "PATH")]
    pub logfile: PathBuf,

    /// Root of the daily storage tree
    #[arg(long, alias = "output-dir", value_name = "DIR")]
    pub data_root: Option<PathBuf>,

    /// Seconds between polls
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval: Option<f64>,

    /// Read the file from the beginning instead of its current end
    #[arg(long)]
    pub from_start: bool,

    /// Also print every envelope on stdout
    #[arg(long)]
    pub stream: bool,
}

impl LiveArgs {
    fn apply(&self, cfg: &mut LiveConfig) {
        if let Some(root) = &self.data_root {
            cfg.data_root = root.clone();
        }
        if let Some(secs) = self.poll_interval {
            // Negative or NaN saturate to 0 and fail validation.
            cfg.poll_interval_ms = (secs * 1000.0).round() as u64;
        }
        if self.from_start {
            cfg.from_start = true;
        }
    }
}

pub(crate) async fn run(args: LiveArgs, settings: Settings, cancel: CancellationToken) -> Result<()> {
    let mut cfg = settings.parser;
    args.identity.apply(&mut cfg);
    args.apply(&mut cfg.live);
    cfg.validate().context("Invalid configuration")?;

    let kind = cfg.dialect_kind()?;
    let instance = cfg.instance_or_default()?;
    let profile = load_profile(&settings.profile_dir, kind.algo().as_str(), &cfg.annotation_profile)?;
    let engine = LiveEngine::new(&cfg, Arc::new(profile), &args.logfile)?;

    let out: Box<dyn Write + Send> = if args.stream {
        Box::new(std::io::stdout())
    } else {
        Box::new(std::io::sink())
    };
    let sink = JsonlSink::new(out, kind.algo().as_str(), kind.as_str(), &instance);

    let report = engine
        .run(sink, cancel)
        .await
        .with_context(|| format!("Live session on {} failed", args.logfile.display()))?;
    info!(
        lines = report.lines,
        records = report.daily.records,
        streamed = report.sink,
        files = report.daily.paths.len(),
        "Live session finished"
    );
    Ok(())
}
