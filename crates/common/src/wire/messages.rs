use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::validity::Validity;

/// A claim about a single datum in a single bucket.
///  Carried by both propose and dismiss messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// The bucket the claim is about
    pub address: Address,
    /// The fact itself; compared by exact value
    pub datum: String,
    /// When the claim holds
    pub validity: Validity,
}

/// A detached signature over the literal bytes of another wire message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed {
    /// Content hash of the signed wire message
    pub data_hash: String,
    /// Identity of the signer
    pub signer: String,
    /// Opaque signature, verified upstream
    pub signature: String,
}

/// Every primitive exchanged between replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mtype", rename_all = "snake_case")]
pub enum WireMessage {
    /// Assert that a datum is in a bucket during a window
    Propose(Claim),
    /// Assert that a datum is *not* in a bucket during a window
    Dismiss(Claim),
    /// Endorse another message
    Signed(Signed),
    Ping,
    Pong,
    /// Well-formed, but of a kind this node does not know
    #[serde(other)]
    Unknown,
}

impl WireMessage {
    pub fn propose(address: Address, datum: impl Into<String>, validity: Validity) -> Self {
        WireMessage::Propose(Claim {
            address,
            datum: datum.into(),
            validity,
        })
    }

    pub fn dismiss(address: Address, datum: impl Into<String>, validity: Validity) -> Self {
        WireMessage::Dismiss(Claim {
            address,
            datum: datum.into(),
            validity,
        })
    }

    pub fn signed(
        data_hash: impl Into<String>,
        signer: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        WireMessage::Signed(Signed {
            data_hash: data_hash.into(),
            signer: signer.into(),
            signature: signature.into(),
        })
    }

    /// Short name of the message kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Propose(_) => "propose",
            WireMessage::Dismiss(_) => "dismiss",
            WireMessage::Signed(_) => "signed",
            WireMessage::Ping => "ping",
            WireMessage::Pong => "pong",
            WireMessage::Unknown => "unknown",
        }
    }
}
