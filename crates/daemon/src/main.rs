// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{
    args::Args, op::Op, Cleanup, Dismiss, Init, Messages, Propose, Query, Summary, Version,
};
use swarm_daemon::{process, AppState, ServiceConfig};

command_enum! {
    (Cleanup, Cleanup),
    (Dismiss, Dismiss),
    (Init, Init),
    (Messages, Messages),
    (Propose, Propose),
    (Query, Query),
    (Summary, Summary),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // log to the configured directory too, if there is one
    let mut service_config = AppState::load(args.config_path.clone())
        .ok()
        .and_then(|state| ServiceConfig::from_app_state(&state).ok())
        .unwrap_or_default();
    service_config.log_level = args.log_level;
    let guards = process::init_logging(&service_config);

    let ctx = cli::op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            drop(guards);
            std::process::exit(1);
        }
    }
}
