//! `propose` and `dismiss` share everything but the message kind.

use clap::Args;

use common::prelude::{
    content_hash, Address, AddressError, DistributedRepo, ProcessError, Processed, Validity,
    WireError, WireMessage,
};
use swarm_daemon::state::StateError;
use swarm_daemon::LOCAL_CHANNEL;

#[derive(Args, Debug, Clone)]
pub struct ClaimArgs {
    /// Bucket address, e.g. `pri/QmAlice/addresses`
    pub bucket: String,

    pub datum: String,

    /// Seconds the claim holds for, starting now (open-ended if not set)
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Record the message as signed by this identity (repeatable).
    ///  Signatures are not verified here.
    #[arg(long = "sign-as")]
    pub sign_as: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct Propose {
    #[command(flatten)]
    pub claim: ClaimArgs,
}

#[derive(Args, Debug, Clone)]
pub struct Dismiss {
    #[command(flatten)]
    pub claim: ClaimArgs,
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid bucket address: {0}")]
    Address(#[from] AddressError),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("{0}")]
    Process(#[from] ProcessError),
}

impl ClaimArgs {
    fn validity(&self, now: f64) -> Validity {
        let start = now.floor() as i64;
        match self.ttl {
            Some(ttl) => Validity::between(start, start + ttl as i64),
            None => Validity::since(start),
        }
    }

    fn submit(
        &self,
        ctx: &crate::cli::op::OpContext,
        make: fn(Address, String, Validity) -> WireMessage,
    ) -> Result<Processed, ClaimError> {
        let address: Address = self.bucket.parse()?;
        ctx.with_repo(|repo| {
            let message = make(address, self.datum.clone(), self.validity(repo.now()));
            apply(repo, &message, &self.sign_as)
        })?
    }
}

/// Sign (if asked) and process a locally created message
fn apply(
    repo: &mut DistributedRepo,
    message: &WireMessage,
    sign_as: &[String],
) -> Result<Processed, ClaimError> {
    let wire = repo.encode(message)?;
    let data_hash = content_hash(&wire);
    for signer in sign_as {
        let signed = WireMessage::signed(
            data_hash.clone(),
            signer.clone(),
            format!("{} signed by {}", data_hash, signer),
        );
        let signed = repo.encode(&signed)?;
        repo.process(&signed, LOCAL_CHANNEL, None)?;
    }
    Ok(repo.process(&wire, LOCAL_CHANNEL, None)?)
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Propose {
    type Error = ClaimError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let processed = self
            .claim
            .submit(ctx, |a, d, v| WireMessage::propose(a, d, v))?;
        Ok(match processed {
            Processed::Proposed {
                address,
                datum,
                first_sight: true,
            } => format!("proposed {} in {}", datum, address),
            Processed::Proposed { address, datum, .. } => {
                format!("merged proposal of {} in {}", datum, address)
            }
            other => format!("{:?}", other),
        })
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Dismiss {
    type Error = ClaimError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let processed = self
            .claim
            .submit(ctx, |a, d, v| WireMessage::dismiss(a, d, v))?;
        Ok(match processed {
            Processed::Dismissed { address, datum } => format!("dismissed {} in {}", datum, address),
            other => format!("{:?}", other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_from_ttl() {
        let args = ClaimArgs {
            bucket: "peer".to_string(),
            datum: "QmAlice".to_string(),
            ttl: Some(300),
            sign_as: vec![],
        };
        assert_eq!(args.validity(1000.5), Validity::between(1000, 1300));

        let open = ClaimArgs { ttl: None, ..args };
        assert_eq!(open.validity(1000.5), Validity::since(1000));
    }

    #[test]
    fn test_apply_signs_before_processing() {
        let mut repo = DistributedRepo::new();
        repo.init_default_schema();
        let message = WireMessage::propose("admin".parse().unwrap(), "QmRoot", Validity::always());

        assert!(matches!(
            apply(&mut repo, &message, &[]),
            Err(ClaimError::Process(_))
        ));
        let processed = apply(&mut repo, &message, &["admin".to_string()]).unwrap();
        assert!(matches!(processed, Processed::Proposed { .. }));
        assert_eq!(
            repo.query(&"admin".parse().unwrap(), None).unwrap(),
            vec!["QmRoot"]
        );
    }
}
