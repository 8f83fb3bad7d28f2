use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{AppendLocks, DailyReport, DailyWriter, TailSource};
use crate::annotate::AnnotationProfile;
use crate::conf::{ConfigError, ParserConfig};
use crate::dialect::Emitted;
use crate::error::Result;
use crate::orchestrator::{Orchestrator, RunMeta};
use crate::sink::{Fanout, Sink};
use crate::state::StreamState;

/// Outcome of one live session.
#[derive(Debug)]
pub struct LiveReport<T> {
    /// What the caller's sink returned on finalize.
    pub sink: T,
    pub daily: DailyReport,
    pub lines: u64,
}

/// Follows one log file, feeds the dialect and writes every record both to
/// a caller sink and to the daily storage.
#[derive(Debug)]
pub struct LiveEngine {
    orchestrator: Orchestrator,
    tail: TailSource,
    data_root: PathBuf,
    shutdown_grace: Duration,
    locks: AppendLocks,
}

impl LiveEngine {
    pub fn new(
        cfg: &ParserConfig,
        profile: Arc<AnnotationProfile>,
        logfile: impl Into<PathBuf>,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            orchestrator: Orchestrator::new(cfg, profile)?,
            tail: TailSource::new(logfile, &cfg.live),
            data_root: cfg.live.data_root.clone(),
            shutdown_grace: cfg.live.shutdown_grace(),
            locks: AppendLocks::new(),
        })
    }

    /// Share append locks with other writers in the process.
    pub fn with_locks(mut self, locks: AppendLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn daily_writer(&self) -> DailyWriter {
        let kind = self.orchestrator.kind();
        DailyWriter::new(
            &self.data_root,
            kind.algo().as_str(),
            kind.as_str(),
            self.orchestrator.instance(),
            self.locks.clone(),
        )
    }

    /// Run until `cancel` fires. On shutdown the tail is drained, the dialect
    /// flushed, and exactly one meta record written; then the engine waits
    /// out the grace period before returning.
    pub async fn run<S: Sink>(&self, sink: S, cancel: CancellationToken) -> Result<LiveReport<S::Output>> {
        self.tail.check().await?;

        let engine = self.orchestrator.engine();
        let mut state = StreamState::new(self.tail.path().display().to_string());
        let mut run = RunMeta::new(self.orchestrator.new_meta());
        let mut out = Fanout::new(sink, self.daily_writer());
        out.start_run(run.meta())?;
        info!(
            path = %self.tail.path().display(),
            dialect = %self.orchestrator.kind(),
            data_root = %self.data_root.display(),
            "Live session started"
        );

        let mut chunks = self.tail.clone().follow(cancel.clone());
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Tail failed; shutting down");
                    break;
                }
            };
            let emitted = engine.feed(&mut state, &String::from_utf8_lossy(&chunk));
            self.forward(&emitted, &mut out, &mut run)?;
        }

        let tail = engine.finalize(&mut state);
        self.forward(&tail, &mut out, &mut run)?;
        let lines = state.line_no();
        run.absorb(state.summary());
        let (sink, daily) = out.finalize(run.finish())?;
        info!(lines, records = daily.records, files = daily.paths.len(), "Live session stopped");

        if !self.shutdown_grace.is_zero() {
            tokio::time::sleep(self.shutdown_grace).await;
        }
        Ok(LiveReport { sink, daily, lines })
    }

    fn forward<S: Sink>(&self, emitted: &Emitted, out: &mut S, run: &mut RunMeta) -> Result<()> {
        let meta = run.meta_mut();
        for ts in emitted
            .detections
            .iter()
            .map(|d| d.timestamp)
            .chain(emitted.annotations.iter().map(|a| a.timestamp))
        {
            meta.observe(ts);
        }
        self.orchestrator.forward(emitted, out, run)?;
        Ok(())
    }
}
