use clap::Args;

use swarm_daemon::state::StateError;

/// Dump the minimal set of wire messages that rebuilds the active
///  state, one per line
#[derive(Args, Debug, Clone)]
pub struct Messages;

#[derive(Debug, thiserror::Error)]
pub enum MessagesError {
    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Messages {
    type Error = MessagesError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let repo = state.open_repo()?;
        Ok(repo.summary_messages().join("\n"))
    }
}
