//! Status command implementation.
//!
//! Reports the recorded outcome of the build, if any.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use buildslot_lib::config::Config;
use buildslot_lib::consts::{ARTIFACT_NAME, OUTPUT_DIR};
use buildslot_lib::result::read_result;

use crate::output::{OutputFormat, format_age, print_error, print_info, print_json, print_stat, print_success};

pub fn cmd_status(config_path: Option<&Path>, build_dir_base: Option<PathBuf>, output: OutputFormat) -> Result<()> {
  let mut config = Config::load(config_path).context("Failed to load configuration")?;
  if let Some(base) = build_dir_base {
    config.build_dir_base = base;
  }

  let result_path = config.result_path();
  let result = read_result(&result_path).with_context(|| format!("Failed to read {}", result_path.display()))?;

  let Some(result) = result else {
    if output.is_json() {
      print_json(&serde_json::json!({ "status": null }))?;
    } else {
      print_info("No build result");
    }
    return Ok(());
  };

  if output.is_json() {
    return print_json(&result);
  }

  if result.is_success() {
    print_success("Build succeeded");
  } else {
    print_error("Build failed");
  }
  print_stat(
    "Finished",
    &format!(
      "{} ({})",
      humantime::format_rfc3339_seconds(result.finished_at()),
      format_age(result.finished_at())
    ),
  );
  if let Some(error) = &result.error {
    print_stat("Error", error);
  }
  print_stat("Build dir", &config.build_dir().display().to_string());
  if result.is_success() {
    let artifact = config.build_dir().join(OUTPUT_DIR).join(ARTIFACT_NAME);
    print_stat("Artifact", &artifact.display().to_string());
  }

  Ok(())
}
