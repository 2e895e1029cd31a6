//! tether - command-line client for MCP servers.
//!
//! Main entry point for the tether CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

use commands::{call, list, read, resources, test, tools, validate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// tether - talk to MCP servers over stdio, SSE or WebSocket
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to servers.toml (default: $XDG_CONFIG_HOME/tether/servers.toml)
    #[arg(long, global = true, env = "TETHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write JSON logs to a daily-rotated file in this directory
    #[arg(long, global = true, env = "TETHER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured servers
    List(list::ListArgs),

    /// Check server configurations without connecting
    Validate(validate::ValidateArgs),

    /// Connect to a server, list its capabilities, and disconnect
    Test(test::TestArgs),

    /// List tools from all enabled servers
    Tools(tools::ToolsArgs),

    /// List resources from all enabled servers
    Resources(resources::ResourcesArgs),

    /// Call a tool
    Call(call::CallArgs),

    /// Read a resource
    Read(read::ReadArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "tether=debug,tether_mcp=debug,info"
    } else {
        "tether=info,tether_mcp=warn,warn"
    };

    // Held until exit so buffered file logs are flushed.
    let _guard = init_tracing(filter, cli.log_dir.as_deref());

    let config = config::load_config(cli.config.as_deref())?;

    let ctx = commands::Context {
        config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::List(args) => list::run(args, &ctx).await,
        Commands::Validate(args) => validate::run(args, &ctx).await,
        Commands::Test(args) => test::run(args, &ctx).await,
        Commands::Tools(args) => tools::run(args, &ctx).await,
        Commands::Resources(args) => resources::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
        Commands::Read(args) => read::run(args, &ctx).await,
    }
}

/// Console logging on stderr, plus a JSON file layer when `log_dir` is set.
fn init_tracing(
    filter: &str,
    log_dir: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::new(filter));

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "tether.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_filter(tracing_subscriber::EnvFilter::new(
                            "tether=trace,tether_mcp=trace,info",
                        )),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(console).init();
            None
        }
    }
}
