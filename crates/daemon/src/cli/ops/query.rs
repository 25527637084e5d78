use clap::Args;

use common::prelude::{Address, AddressError, BucketError};
use swarm_daemon::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Query {
    /// Bucket address, e.g. `peer` or `pri/QmAlice/addresses`
    pub bucket: String,

    /// Unix time to evaluate validity windows at (defaults to now)
    #[arg(long)]
    pub at: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid bucket address: {0}")]
    Address(#[from] AddressError),
    #[error("{0}")]
    Bucket(#[from] BucketError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Query {
    type Error = QueryError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let address: Address = self.bucket.parse()?;
        let state = ctx.load_state()?;
        let repo = state.open_repo()?;

        let data = repo.query(&address, self.at)?;
        if data.is_empty() {
            return Ok(format!("no active data in {}", address));
        }
        Ok(data.join("\n"))
    }
}
