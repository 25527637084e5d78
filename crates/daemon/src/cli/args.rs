pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "swarm")]
#[command(about = "Inspect and edit a swarm node's replicated state")]
pub struct Args {
    /// Path to the swarm config directory (defaults to ~/.swarm)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level for this invocation (RUST_LOG still wins)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: crate::Command,
}
