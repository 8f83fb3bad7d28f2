use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use eewpw_parser::orchestrator::Orchestrator;
use eewpw_parser::sink::{JsonlSink, PacingSink};
use tracing::{info, warn};

use super::{display_paths, open_output, IdentityArgs};
use crate::config::Settings;
use crate::profile::load_profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputMode {
    /// One merged, deduplicated and sorted document
    Batch,
    /// One JSON envelope per record in encounter order, meta last
    StreamJsonl,
}

#[derive(Parser, Debug, Clone)]
pub(crate) struct ParseArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    #[arg(long, value_enum, default_value_t = OutputMode::Batch)]
    pub mode: OutputMode,

    /// Output path (default: stdout)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write the batch document without indentation
    #[arg(long)]
    pub compact: bool,

    /// Stream mode: delay records by their timestamp spacing divided by SPEED
    #[arg(long, value_name = "SPEED")]
    pub pace: Option<f64>,

    /// Log files, processed in the given order
    #[arg(required = true, value_name = "LOG")]
    pub inputs: Vec<PathBuf>,
}

pub(crate) async fn run(args: ParseArgs, settings: Settings) -> Result<()> {
    // Parsing and pacing are blocking work.
    tokio::task::spawn_blocking(move || parse(args, settings))
        .await
        .context("Parse task failed")?
}

fn parse(args: ParseArgs, settings: Settings) -> Result<()> {
    let mut cfg = settings.parser;
    args.identity.apply(&mut cfg);
    if args.compact {
        cfg.output.pretty = false;
    }
    cfg.validate().context("Invalid configuration")?;

    let algo = cfg.algo()?;
    let profile = load_profile(&settings.profile_dir, algo.as_str(), &cfg.annotation_profile)?;
    let orchestrator = Orchestrator::new(&cfg, Arc::new(profile))?;
    info!(
        dialect = %orchestrator.kind(),
        instance = orchestrator.instance(),
        inputs = %display_paths(&args.inputs),
        mode = ?args.mode,
        "Parsing"
    );

    match args.mode {
        OutputMode::Batch => {
            if args.pace.is_some() {
                warn!("--pace only applies to stream-jsonl output; ignoring");
            }
            let doc = orchestrator.parse_files(&args.inputs)?;
            let json = doc.to_json(cfg.output.pretty)?;
            let mut out = open_output(args.output.as_deref())?;
            out.write_all(json.as_bytes())?;
            out.write_all(b"\n")?;
            out.flush().context("Failed to flush output")?;
            info!(
                detections = doc.detections.len(),
                annotations = doc.annotation_count(),
                "Batch document written"
            );
        }
        OutputMode::StreamJsonl => {
            let kind = orchestrator.kind();
            let sink = JsonlSink::new(
                open_output(args.output.as_deref())?,
                kind.algo().as_str(),
                kind.as_str(),
                orchestrator.instance(),
            );
            let records = match args.pace {
                Some(speed) => orchestrator.run(&args.inputs, PacingSink::new(sink, speed))?,
                None => orchestrator.run(&args.inputs, sink)?,
            };
            info!(records, "Envelope stream written");
        }
    }
    Ok(())
}
