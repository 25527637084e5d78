use clap::Args;

use swarm_daemon::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Cleanup;

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cleanup {
    type Error = CleanupError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let removed = ctx.with_repo(|repo| repo.cleanup())?;
        Ok(format!("removed {} expired item(s)", removed))
    }
}
