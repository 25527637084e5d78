use std::fmt::Debug;

use super::messages::WireMessage;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("could not interpret message: {0}")]
    CouldNotInterpret(String),
    #[error("could not encode {0} message: {1}")]
    Encode(&'static str, String),
}

/// Turns logical messages into transport strings and back.
///
/// Encoding must be deterministic: signatures are keyed by the
///  content hash of the literal encoded string, so encoding the
///  same message twice has to produce the same bytes.
pub trait WireCodec: Send + Sync + Debug {
    fn encode(&self, message: &WireMessage) -> Result<String, WireError>;
    fn decode(&self, wire: &str) -> Result<WireMessage, WireError>;
}

/// Compact JSON objects tagged by `mtype`, e.g.
///
/// ```text
/// {"mtype":"propose","address":["peer"],"datum":"QmAlice","validity":[null,1700000300]}
/// {"mtype":"signed","data_hash":"3xb...","signer":"QmAdmin","signature":"..."}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl WireCodec for JsonCodec {
    fn encode(&self, message: &WireMessage) -> Result<String, WireError> {
        if let WireMessage::Unknown = message {
            return Err(WireError::Encode(
                message.kind(),
                "unknown messages cannot be sent".to_string(),
            ));
        }
        serde_json::to_string(message).map_err(|e| WireError::Encode(message.kind(), e.to_string()))
    }

    fn decode(&self, wire: &str) -> Result<WireMessage, WireError> {
        serde_json::from_str(wire.trim()).map_err(|e| WireError::CouldNotInterpret(e.to_string()))
    }
}
