use clap::Args;

use swarm_daemon::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Summary {
    /// Print active data as a nested JSON tree instead
    #[arg(long)]
    pub tree: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("failed to encode tree: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Summary {
    type Error = SummaryError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let repo = state.open_repo()?;

        if self.tree {
            return Ok(serde_json::to_string_pretty(&repo.summary_tree())?);
        }
        Ok(repo.summary())
    }
}
