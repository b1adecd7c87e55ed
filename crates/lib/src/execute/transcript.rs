//! The build transcript: every byte goes live to the client and to `build.log`.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

/// Anything a transcript can be streamed to: ordered writes plus an explicit flush.
///
/// HTTP response pipes, in-memory buffers and files all qualify.
pub trait TranscriptSink: AsyncWrite + Unpin + Send {}

impl<T: AsyncWrite + Unpin + Send + ?Sized> TranscriptSink for T {}

/// Writes to a live response sink and a buffered log file.
///
/// The response is flushed after every write so the client sees output as it
/// happens. The log is only flushed by [`Transcript::finish`]. Response writes
/// are best-effort: once the client goes away the build carries on and only
/// the log is written.
pub struct Transcript<W> {
  response: W,
  response_open: bool,
  log: BufWriter<File>,
  at_line_start: bool,
}

impl<W: TranscriptSink> Transcript<W> {
  pub fn new(log: File, response: W) -> Self {
    Self {
      response,
      response_open: true,
      log: BufWriter::new(log),
      at_line_start: true,
    }
  }

  pub async fn create(log_path: &Path, response: W) -> io::Result<Self> {
    let log = File::create(log_path).await?;
    Ok(Self::new(log, response))
  }

  /// Forward `bytes` to both sinks. Only log failures are reported.
  pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
    if bytes.is_empty() {
      return Ok(());
    }

    self.send(bytes).await;
    self.log.write_all(bytes).await?;
    self.at_line_start = bytes.ends_with(b"\n");
    Ok(())
  }

  /// Append `error: <message>` on a line of its own.
  pub async fn write_error(&mut self, message: &str) -> io::Result<()> {
    let prefix = if self.at_line_start { "" } else { "\n" };
    self
      .write(format!("{}error: {}\n", prefix, message).as_bytes())
      .await
  }

  pub fn response_open(&self) -> bool {
    self.response_open
  }

  /// Write buffered log content through to disk.
  pub async fn flush_log(&mut self) -> io::Result<()> {
    self.log.flush().await?;
    self.log.get_ref().sync_all().await
  }

  /// Flush the log, close the response and hand it back.
  pub async fn finish(mut self) -> io::Result<W> {
    self.flush_log().await?;
    if self.response_open {
      if let Err(e) = self.response.shutdown().await {
        debug!(error = %e, "response already closed");
      }
    }
    Ok(self.response)
  }

  async fn send(&mut self, bytes: &[u8]) {
    if !self.response_open {
      return;
    }

    let sent = async {
      self.response.write_all(bytes).await?;
      self.response.flush().await
    }
    .await;

    if let Err(e) = sent {
      debug!(error = %e, "client stopped reading, transcript continues in the log only");
      self.response_open = false;
    }
  }
}
