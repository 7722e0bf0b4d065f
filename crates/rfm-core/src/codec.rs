//! JSON text codec
//!
//! Every frame is a flat JSON object whose `type` field selects the payload.
//! Decoding never fails: anything that is not a well-formed known message
//! comes back as [`Message::Opaque`] carrying the original text, so it can be
//! echoed byte-for-byte.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::types::*;
use crate::{Error, Result};

/// Name of the discriminator field
pub const TYPE_FIELD: &str = "type";

// ============================================================================
// PUBLIC API
// ============================================================================

/// Encode a message to frame text
pub fn encode(message: &Message) -> Result<String> {
    match message {
        Message::Ping(m) => tagged(MessageKind::Ping, m),
        Message::Pong(m) => tagged(MessageKind::Pong, m),
        Message::TestOperation(m) => tagged(MessageKind::TestOperation, m),
        Message::OperationStarted(m) => tagged(MessageKind::OperationStarted, m),
        Message::ProgressUpdate(m) => tagged(MessageKind::ProgressUpdate, m),
        Message::OperationCompleted(m) => tagged(MessageKind::OperationCompleted, m),
        Message::CancelOperation(m) => tagged(MessageKind::CancelOperation, m),
        Message::OperationCanceled(m) => tagged(MessageKind::OperationCanceled, m),
        Message::Opaque(m) => Ok(m.text.clone()),
    }
}

/// Decode frame text into a message
pub fn decode(text: &str) -> Message {
    let value: Value = match serde_json::from_str(text) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Message::Opaque(OpaqueMessage::raw(text)),
    };

    let tag = value
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);
    let kind = tag.as_deref().and_then(MessageKind::from_tag);

    let decoded = match kind {
        Some(MessageKind::Ping) => payload(value).map(Message::Ping),
        Some(MessageKind::Pong) => payload(value).map(Message::Pong),
        Some(MessageKind::TestOperation) => payload(value).map(Message::TestOperation),
        Some(MessageKind::OperationStarted) => payload(value).map(Message::OperationStarted),
        Some(MessageKind::ProgressUpdate) => payload(value).map(Message::ProgressUpdate),
        Some(MessageKind::OperationCompleted) => payload(value).map(Message::OperationCompleted),
        Some(MessageKind::CancelOperation) => payload(value).map(Message::CancelOperation),
        Some(MessageKind::OperationCanceled) => payload(value).map(Message::OperationCanceled),
        None => None,
    };

    decoded.unwrap_or_else(|| {
        Message::Opaque(OpaqueMessage {
            tag,
            structured: true,
            text: text.to_string(),
        })
    })
}

// ============================================================================
// HELPERS
// ============================================================================

fn tagged<T: Serialize>(kind: MessageKind, payload: &T) -> Result<String> {
    let mut value = serde_json::to_value(payload)?;
    let object = value
        .as_object_mut()
        .ok_or(Error::NotAnObject(kind.as_str()))?;
    object.insert(
        TYPE_FIELD.to_string(),
        Value::String(kind.as_str().to_string()),
    );
    Ok(serde_json::to_string(&value)?)
}

fn payload<T: DeserializeOwned>(value: Value) -> Option<T> {
    serde_json::from_value(value).ok()
}
