//! Packaging the output directory into a single tar archive.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::consts::{ARTIFACT_NAME, OUTPUT_DIR};
use crate::execute::types::ExecuteError;

const TAR_BINARY: &str = "tar";

/// Archive `<build_dir>/output` into `<build_dir>/output/output.tar`.
///
/// The archive is first written next to the output directory with a
/// `.partial` suffix and only renamed into place once tar succeeded, so a
/// half-written artifact is never served. Holes in sparse files are kept.
pub async fn package_output(build_dir: &Path) -> Result<PathBuf, ExecuteError> {
  let output_dir = build_dir.join(OUTPUT_DIR);
  let partial = build_dir.join(format!("{}.partial", ARTIFACT_NAME));

  debug!(output_dir = %output_dir.display(), "packaging build output");
  let output = Command::new(TAR_BINARY)
    .arg("--sparse")
    .arg("-C")
    .arg(&output_dir)
    .arg("-cf")
    .arg(&partial)
    .arg(".")
    .stdin(Stdio::null())
    .output()
    .await
    .map_err(ExecuteError::Package)?;

  if !output.status.success() {
    let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
    diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
    return Err(ExecuteError::PackageFailed {
      status: output.status,
      output: diagnostics.trim_end().to_string(),
    });
  }

  let artifact = output_dir.join(ARTIFACT_NAME);
  tokio::fs::rename(&partial, &artifact)
    .await
    .map_err(ExecuteError::Package)?;

  info!(artifact = %artifact.display(), "build output packaged");
  Ok(artifact)
}
