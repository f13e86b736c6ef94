//! JSON text frame codec for the push channel.
//!
//! Every frame is `{"event": <name>, "data": <payload>}`. Decoding failures
//! are [`PushError::Frame`], which the connection driver logs and skips.

use parley_types::error::PushError;
use parley_types::event::{InboundEvent, OutboundEvent};

pub fn encode(event: &OutboundEvent) -> Result<String, PushError> {
    serde_json::to_string(event).map_err(|e| PushError::Frame(format!("encode {}: {e}", event.name())))
}

pub fn decode(text: &str) -> Result<InboundEvent, PushError> {
    serde_json::from_str(text).map_err(|e| PushError::Frame(e.to_string()))
}
