mod cmd;
mod output;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{ServeOverrides, cmd_serve, cmd_status};
use output::OutputFormat;

/// buildslot - run exactly one build from a tar request
#[derive(Parser)]
#[command(name = "buildslot")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Accept one build over HTTP and serve its results
  Serve {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Directory holding the build directory and result marker
    #[arg(long)]
    build_dir_base: Option<PathBuf>,

    /// Build tool executable
    #[arg(long)]
    tool: Option<PathBuf>,
  },

  /// Show the recorded build result
  Status {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the build directory and result marker
    #[arg(long)]
    build_dir_base: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Serve {
      config,
      listen,
      build_dir_base,
      tool,
    } => cmd_serve(
      config.as_deref(),
      ServeOverrides {
        listen,
        build_dir_base,
        tool,
      },
    ),
    Commands::Status {
      config,
      build_dir_base,
      output,
    } => cmd_status(config.as_deref(), build_dir_base, output),
  }
}
