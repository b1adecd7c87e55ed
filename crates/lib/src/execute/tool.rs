//! Running the external build tool.
//!
//! The tool is started with the accepted control values and its stdout and
//! stderr are merged line by line into the transcript while it runs.

use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::consts::{MANIFEST_FILENAME, OUTPUT_DIR, STORE_DIR};
use crate::control::BuildControl;
use crate::execute::transcript::{Transcript, TranscriptSink};
use crate::execute::types::ExecuteError;

/// Build the tool invocation for `build_dir`.
///
/// Arguments are `--export <name>` per export, then `--output-dir`, `--store`
/// and finally the manifest path. Control environments are added on top of
/// the inherited environment.
pub fn build_command(tool: &Path, build_dir: &Path, control: &BuildControl) -> Command {
  let mut command = Command::new(tool);
  for export in &control.exports {
    command.arg("--export").arg(export);
  }
  command
    .arg("--output-dir")
    .arg(build_dir.join(OUTPUT_DIR))
    .arg("--store")
    .arg(build_dir.join(STORE_DIR))
    .arg(build_dir.join(MANIFEST_FILENAME))
    .envs(control.env_pairs())
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
  command
}

/// Run the build tool to completion, streaming its output into `transcript`.
///
/// The banner `starting <build_dir> build` is written before the tool starts.
/// The exit status is always collected, even if reading the output failed.
pub async fn run_tool<W: TranscriptSink>(
  tool: &Path,
  build_dir: &Path,
  control: &BuildControl,
  transcript: &mut Transcript<W>,
) -> Result<(), ExecuteError> {
  let tool_name = tool.display().to_string();

  transcript
    .write(format!("starting {} build\n", build_dir.display()).as_bytes())
    .await
    .map_err(ExecuteError::Log)?;

  tokio::fs::create_dir_all(build_dir.join(OUTPUT_DIR))
    .await
    .map_err(ExecuteError::OutputDir)?;

  info!(tool = %tool_name, exports = ?control.exports, "starting build tool");
  let mut child = build_command(tool, build_dir, control)
    .spawn()
    .map_err(|source| ExecuteError::Spawn {
      tool: tool_name.clone(),
      source,
    })?;

  let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
    return Err(ExecuteError::Spawn {
      tool: tool_name,
      source: io::Error::other("output pipes not captured"),
    });
  };

  let shared = Mutex::new(&mut *transcript);
  let (out, err) = tokio::join!(
    follow_lines(stdout, "stdout", &tool_name, &shared),
    follow_lines(stderr, "stderr", &tool_name, &shared),
  );
  drop(shared);

  let status = child.wait().await.map_err(|source| ExecuteError::Wait {
    tool: tool_name.clone(),
    source,
  })?;
  out?;
  err?;

  if !status.success() {
    return Err(ExecuteError::ToolFailed {
      tool: tool_name,
      status,
    });
  }

  info!(tool = %tool_name, "build tool finished");
  Ok(())
}

/// Copy `stream` into the shared transcript one line at a time.
///
/// A trailing partial line is forwarded as-is, including the bytes read
/// before a read error.
async fn follow_lines<R, W>(
  stream: R,
  label: &'static str,
  tool: &str,
  transcript: &Mutex<&mut Transcript<W>>,
) -> Result<(), ExecuteError>
where
  R: AsyncRead + Unpin,
  W: TranscriptSink,
{
  let mut reader = BufReader::new(stream);
  let mut line = Vec::new();
  loop {
    line.clear();
    let read = reader.read_until(b'\n', &mut line).await;
    if !line.is_empty() {
      transcript.lock().await.write(&line).await.map_err(ExecuteError::Log)?;
    }
    match read {
      Ok(0) => {
        debug!(stream = label, "tool output closed");
        return Ok(());
      }
      Ok(_) => {}
      Err(source) => {
        return Err(ExecuteError::Pipe {
          tool: tool.to_string(),
          stream: label,
          source,
        });
      }
    }
  }
}
