//! Logical wire primitives and the codec seam.
//!
//! The engine never looks at transport bytes directly: it hands the
//!  literal string to a [`WireCodec`] and works with the decoded
//!  [`WireMessage`]. The literal string still matters, because
//!  signatures are keyed by its [`content_hash`].

mod codec;
mod messages;

pub use codec::{JsonCodec, WireCodec, WireError};
pub use messages::{Claim, Signed, WireMessage};

use sha2::{Digest, Sha256};

/// Base58 sha-256 of the literal wire string
pub fn content_hash(wire: &str) -> String {
    let digest = Sha256::digest(wire.as_bytes());
    bs58::encode(digest).into_string()
}
