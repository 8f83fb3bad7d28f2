use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use eewpw_parser::conf::{ReplayConfig, TimeMode};
use eewpw_parser::replay::{collect_inputs, ReplayEngine};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum TimeModeArg {
    /// Keep the original timestamps
    Original,
    /// Rewrite timestamps onto the replay clock
    Realtime,
}

impl From<TimeModeArg> for TimeMode {
    fn from(arg: TimeModeArg) -> Self {
        match arg {
            TimeModeArg::Original => TimeMode::Original,
            TimeModeArg::Realtime => TimeMode::Realtime,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub(crate) struct ReplayArgs {
    /// Playback speed multiplier (values <= 0 mean real speed)
    #[arg(long)]
    pub speed: Option<f64>,

    /// Number of passes over every source
    #[arg(long)]
    pub repeat: Option<u32>,

    #[arg(long, value_enum)]
    pub time_mode: Option<TimeModeArg>,

    /// File with one log path per line (`#` starts a comment)
    #[arg(long, value_name = "PATH")]
    pub file_list: Option<PathBuf>,

    /// Directory receiving the replayed files
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Prefix for replayed file names
    #[arg(long)]
    pub prefix: Option<String>,

    /// Raw log files. When absent, paths are read from --file-list or a piped stdin.
    #[arg(value_name = "LOG")]
    pub inputs: Vec<PathBuf>,
}

impl ReplayArgs {
    fn apply(&self, cfg: &mut ReplayConfig) {
        if let Some(speed) = self.speed {
            cfg.speed = speed;
        }
        if let Some(repeat) = self.repeat {
            cfg.repeat = repeat;
        }
        if let Some(mode) = self.time_mode {
            cfg.time_mode = mode.into();
        }
        if let Some(dir) = &self.work_dir {
            cfg.work_dir = dir.clone();
        }
        if let Some(prefix) = &self.prefix {
            cfg.file_prefix = prefix.clone();
        }
    }
}

pub(crate) async fn run(args: ReplayArgs, settings: Settings, cancel: CancellationToken) -> Result<()> {
    let mut cfg = settings.parser.replay;
    args.apply(&mut cfg);
    cfg.validate().context("Invalid replay configuration")?;

    let stdin = std::io::stdin();
    let piped = args.inputs.is_empty() && args.file_list.is_none() && !stdin.is_terminal();
    let sources = collect_inputs(&args.inputs, args.file_list.as_deref(), piped.then(|| stdin.lock()))?;

    let engine = ReplayEngine::new(&cfg);
    info!(
        sources = sources.len(),
        speed = engine.speed(),
        repeat = cfg.repeat,
        time_mode = ?cfg.time_mode,
        work_dir = %cfg.work_dir.display(),
        "Starting replay"
    );
    let report = engine.run(&sources, cancel).await?;

    for failed in report.failures() {
        error!(
            source = %failed.source.display(),
            error = failed.error.as_deref().unwrap_or_default(),
            "Replay source failed"
        );
    }
    info!(
        lines = report.lines_written(),
        cancelled = report.sources.iter().any(|s| s.cancelled),
        "Replay finished"
    );

    if !report.succeeded() {
        bail!("{} of {} replay sources failed", report.failures().count(), report.sources.len());
    }
    Ok(())
}
