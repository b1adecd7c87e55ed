//! One build, from request body to result marker.

use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::SyncIoBridge;
use tracing::{error, info, warn};

use crate::admission::{Admission, DirectoryAdmission};
use crate::archive::{IngestError, IngestedBuild, ingest_archive};
use crate::config::Config;
use crate::consts::LOG_FILENAME;
use crate::execute::{ExecuteError, Transcript, TranscriptSink, execute_build};
use crate::result::{BuildResult, record_result};

/// Accepts build requests and runs the single admitted build.
pub struct BuildService {
  config: Arc<Config>,
  admission: Arc<dyn Admission>,
}

impl BuildService {
  /// A service whose admission is the build directory under `config.build_dir_base`.
  pub fn new(config: Config) -> Self {
    let admission = Arc::new(DirectoryAdmission::new(config.build_dir_base.clone()));
    Self::with_admission(config, admission)
  }

  pub fn with_admission(config: Config, admission: Arc<dyn Admission>) -> Self {
    Self {
      config: Arc::new(config),
      admission,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Unpack a request body into the build directory.
  ///
  /// The tar stream is parsed on a blocking thread. Failures after admission
  /// are recorded as a failed build, since the slot is spent.
  pub async fn ingest<R>(&self, body: R) -> Result<IngestedBuild, IngestError>
  where
    R: AsyncRead + Unpin + Send + 'static,
  {
    let reader = SyncIoBridge::new(body);
    let admission = Arc::clone(&self.admission);
    let outcome = tokio::task::spawn_blocking(move || ingest_archive(reader, admission.as_ref())).await?;

    if let Err(e) = &outcome {
      warn!(error = %e, "build request rejected");
      if e.is_admitted() {
        record_result(&self.config.result_path(), &BuildResult::failure(e.to_string())).await;
      }
    }
    outcome
  }

  /// Run an ingested build, streaming the transcript to `response`.
  ///
  /// Errors are reported on the transcript and in the result marker. The
  /// marker is written before `response` is closed, so a client that saw
  /// the stream end can immediately query the result.
  pub async fn run<W: TranscriptSink>(&self, build: IngestedBuild, mut response: W) {
    let result_path = self.config.result_path();
    let log_path = build.build_dir.join(LOG_FILENAME);

    let log = match File::create(&log_path).await {
      Ok(log) => log,
      Err(e) => {
        let err = ExecuteError::LogFile(e);
        error!(log = %log_path.display(), error = %err, "build aborted");
        record_result(&result_path, &BuildResult::failure(err.to_string())).await;
        let line = format!("error: {}\n", err);
        if response.write_all(line.as_bytes()).await.is_ok() {
          let _ = response.shutdown().await;
        }
        return;
      }
    };

    let mut transcript = Transcript::new(log, response);
    let result = match execute_build(&self.config.tool, &build, &mut transcript).await {
      Ok(artifact) => {
        info!(artifact = %artifact.display(), "build succeeded");
        BuildResult::success()
      }
      Err(e) => {
        error!(build_dir = %build.build_dir.display(), error = %e, "build failed");
        if let Err(log_err) = transcript.write_error(&e.to_string()).await {
          error!(error = %log_err, "cannot write error to build log");
        }
        BuildResult::failure(e.to_string())
      }
    };

    if let Err(e) = transcript.flush_log().await {
      error!(log = %log_path.display(), error = %e, "cannot flush build log");
    }
    record_result(&result_path, &result).await;
    if let Err(e) = transcript.finish().await {
      warn!(error = %e, "cannot close transcript");
    }
  }
}
