use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TailError;
use crate::conf::LiveConfig;

pub type TailStream = Pin<Box<dyn Stream<Item = Result<Bytes, TailError>> + Send>>;

/// Polls one file for appended text.
///
/// Every yielded chunk ends on a line terminator, except the last one of a
/// cancelled stream, which carries whatever unterminated text was left.
#[derive(Debug, Clone)]
pub struct TailSource {
    path: PathBuf,
    poll_interval: Duration,
    from_start: bool,
    read_chunk_bytes: usize,
}

impl TailSource {
    pub fn new(path: impl Into<PathBuf>, cfg: &LiveConfig) -> Self {
        Self {
            path: path.into(),
            poll_interval: cfg.poll_interval(),
            from_start: cfg.from_start,
            read_chunk_bytes: cfg.read_chunk_bytes.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fails when the file does not exist yet.
    pub async fn check(&self) -> Result<(), TailError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| TailError::io(&self.path, e))?;
        if !meta.is_file() {
            return Err(TailError::Missing(self.path.clone()));
        }
        Ok(())
    }

    /// Follow the file until `cancel` fires, then drain once and end.
    pub fn follow(self, cancel: CancellationToken) -> TailStream {
        Box::pin(self.chunks(cancel))
    }

    fn chunks(self, cancel: CancellationToken) -> impl Stream<Item = Result<Bytes, TailError>> + Send {
        async_stream::try_stream! {
            let path = self.path;
            let mut file = File::open(&path).await.map_err(|e| TailError::io(&path, e))?;
            let mut offset = if self.from_start {
                0
            } else {
                file.metadata().await.map_err(|e| TailError::io(&path, e))?.len()
            };
            file.seek(SeekFrom::Start(offset)).await.map_err(|e| TailError::io(&path, e))?;
            info!(path = %path.display(), offset, "Tailing log file");

            let mut pending = BytesMut::new();
            let mut buf = vec![0u8; self.read_chunk_bytes];
            let mut draining = false;

            loop {
                let len = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(offset);
                if len < offset {
                    warn!(path = %path.display(), offset, len, "Log file shrank; restarting from the beginning");
                    file = File::open(&path).await.map_err(|e| TailError::io(&path, e))?;
                    offset = 0;
                    pending.clear();
                }

                let n = file.read(&mut buf).await.map_err(|e| TailError::io(&path, e))?;
                if n > 0 {
                    offset += n as u64;
                    pending.extend_from_slice(&buf[..n]);
                    if let Some(last_nl) = pending.iter().rposition(|b| *b == b'\n') {
                        yield pending.split_to(last_nl + 1).freeze();
                    }
                    if draining {
                        continue;
                    }
                } else if draining {
                    if !pending.is_empty() {
                        debug!(path = %path.display(), bytes = pending.len(), "Flushing unterminated tail");
                        yield pending.split().freeze();
                    }
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = cancel.cancelled() => {
                        debug!(path = %path.display(), "Tail cancelled; draining");
                        draining = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::io::Write;
    use tempfile::TempDir;

    fn cfg(from_start: bool, chunk: usize) -> LiveConfig {
        LiveConfig {
            poll_interval_ms: 10,
            from_start,
            read_chunk_bytes: chunk,
            ..LiveConfig::default()
        }
    }

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    async fn collect(stream: TailStream) -> String {
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        chunks.iter().map(|c| String::from_utf8_lossy(c).into_owned()).collect()
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let src = TailSource::new(dir.path().join("nope.log"), &cfg(true, 64));
        assert!(matches!(src.check().await, Err(TailError::Missing(_))));
    }

    #[tokio::test]
    async fn test_from_start_reads_existing_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "one\ntwo\n").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let text = collect(TailSource::new(&path, &cfg(true, 3)).follow(cancel)).await;
        assert_eq!(text, "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_default_skips_existing_and_keeps_partial() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "old line\n").unwrap();
        let cancel = CancellationToken::new();
        let mut stream = TailSource::new(&path, &cfg(false, 1024)).follow(cancel.clone());

        // The stream only opens the file once polled; append after that.
        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                append(&path, "new 1\nnew 2 partial");
            })
        };
        let first = stream.next().await.unwrap().unwrap();
        writer.await.unwrap();
        assert_eq!(&first[..], b"new 1\n");

        append(&path, " done\ntrailing");
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(&second[..], b"new 2 partial done\n");

        cancel.cancel();
        let rest = collect(stream).await;
        assert_eq!(rest, "trailing");
    }

    #[tokio::test]
    async fn test_truncation_restarts_at_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "first line that is long\n").unwrap();
        let cancel = CancellationToken::new();
        let mut stream = TailSource::new(&path, &cfg(true, 1024)).follow(cancel.clone());
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"first line that is long\n");

        std::fs::write(&path, "short\n").unwrap();
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"short\n");
        cancel.cancel();
        assert_eq!(collect(stream).await, "");
    }
}
