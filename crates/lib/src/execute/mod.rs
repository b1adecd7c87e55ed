//! Build execution: run the tool, then package what it produced.

pub mod package;
pub mod tool;
pub mod transcript;
pub mod types;

use std::path::{Path, PathBuf};

pub use package::package_output;
pub use tool::run_tool;
pub use transcript::{Transcript, TranscriptSink};
pub use types::ExecuteError;

use crate::archive::IngestedBuild;

/// Run the tool for an ingested build and package its output on success.
///
/// Returns the path of the packaged artifact.
pub async fn execute_build<W: TranscriptSink>(
  tool: &Path,
  build: &IngestedBuild,
  transcript: &mut Transcript<W>,
) -> Result<PathBuf, ExecuteError> {
  run_tool(tool, &build.build_dir, &build.control, transcript).await?;
  package_output(&build.build_dir).await
}
