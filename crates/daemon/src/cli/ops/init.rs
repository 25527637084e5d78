use clap::Args;

use common::prelude::AccessMode;
use swarm_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Name this node announces itself with
    #[arg(long)]
    pub node_name: Option<String>,

    /// Channel to gossip on (repeatable)
    #[arg(long = "channel")]
    pub channels: Vec<String>,

    /// Match bucket access lists against resolved roles
    ///  instead of raw signer identities
    #[arg(long)]
    pub resolved_roles: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();
        if let Some(name) = &self.node_name {
            config.node_name = name.clone();
        }
        config.channels = self.channels.clone();
        if self.resolved_roles {
            config.access_mode = AccessMode::ResolvedRoles;
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        Ok(format!(
            "Initialized swarm directory at {}",
            state.swarm_dir.display()
        ))
    }
}
