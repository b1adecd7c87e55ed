//! Serve command implementation.
//!
//! Loads configuration, binds the listener and serves until interrupted.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use buildslot_lib::config::Config;
use buildslot_lib::server::{bind, serve_until};
use buildslot_lib::service::BuildService;

use crate::output::{print_info, print_stat};

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Default)]
pub struct ServeOverrides {
  pub listen: Option<SocketAddr>,
  pub build_dir_base: Option<PathBuf>,
  pub tool: Option<PathBuf>,
}

impl ServeOverrides {
  pub fn apply(self, config: &mut Config) {
    if let Some(listen) = self.listen {
      config.listen = listen;
    }
    if let Some(base) = self.build_dir_base {
      config.build_dir_base = base;
    }
    if let Some(tool) = self.tool {
      config.tool = tool;
    }
  }
}

pub fn cmd_serve(config_path: Option<&Path>, overrides: ServeOverrides) -> Result<()> {
  let mut config = Config::load(config_path).context("Failed to load configuration")?;
  overrides.apply(&mut config);

  let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  runtime.block_on(async move {
    let listener = bind(config.listen).await?;
    let addr = listener.local_addr().context("Failed to read listener address")?;

    print_info(&format!("Listening on http://{}", addr));
    print_stat("Build dir", &config.build_dir().display().to_string());
    print_stat("Tool", &config.tool.display().to_string());

    let service = Arc::new(BuildService::new(config));
    serve_until(listener, service, shutdown_signal()).await;
    Ok::<_, anyhow::Error>(())
  })
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(error = %e, "cannot listen for ctrl-c, serving until killed");
    std::future::pending::<()>().await;
  }
}
