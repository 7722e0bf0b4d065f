//! Protocol types and message definitions

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;
use crate::{PROGRESS_STEPS, STATUS_RUNNING, TEST_OPERATION_NAME, TEST_OPERATION_TYPE};

/// Message kind tags, as carried in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    Pong,
    TestOperation,
    OperationStarted,
    ProgressUpdate,
    OperationCompleted,
    CancelOperation,
    OperationCanceled,
}

impl MessageKind {
    /// All known kinds
    pub const ALL: [MessageKind; 8] = [
        MessageKind::Ping,
        MessageKind::Pong,
        MessageKind::TestOperation,
        MessageKind::OperationStarted,
        MessageKind::ProgressUpdate,
        MessageKind::OperationCompleted,
        MessageKind::CancelOperation,
        MessageKind::OperationCanceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::TestOperation => "test_operation",
            MessageKind::OperationStarted => "operation_started",
            MessageKind::ProgressUpdate => "progress_update",
            MessageKind::OperationCompleted => "operation_completed",
            MessageKind::CancelOperation => "cancel_operation",
            MessageKind::OperationCanceled => "operation_canceled",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ping" => Some(MessageKind::Ping),
            "pong" => Some(MessageKind::Pong),
            "test_operation" => Some(MessageKind::TestOperation),
            "operation_started" => Some(MessageKind::OperationStarted),
            "progress_update" => Some(MessageKind::ProgressUpdate),
            "operation_completed" => Some(MessageKind::OperationCompleted),
            "cancel_operation" => Some(MessageKind::CancelOperation),
            "operation_canceled" => Some(MessageKind::OperationCanceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol messages
///
/// Known kinds decode into their typed payload. Everything else, including
/// text that is not JSON at all, is kept verbatim in [`Message::Opaque`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Ping(PingMessage),
    Pong(PongMessage),
    TestOperation(TestOperationMessage),
    OperationStarted(OperationStartedMessage),
    ProgressUpdate(ProgressUpdateMessage),
    OperationCompleted(OperationCompletedMessage),
    CancelOperation(CancelOperationMessage),
    OperationCanceled(OperationCanceledMessage),
    Opaque(OpaqueMessage),
}

/// PING request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

/// PONG response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongMessage {
    pub timestamp: Timestamp,
    /// Timestamp copied from the PING, if it carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<Timestamp>,
}

/// Request to run a simulated operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOperationMessage {
    #[serde(default = "unknown_operation_id")]
    pub operation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

fn unknown_operation_id() -> String {
    "unknown".to_string()
}

/// Operation descriptor embedded in OPERATION_STARTED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub operation_id: String,
    pub operation_type: String,
    pub name: String,
}

impl OperationInfo {
    /// Descriptor for a simulated test operation
    pub fn test(operation_id: &str) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            operation_type: TEST_OPERATION_TYPE.to_string(),
            name: TEST_OPERATION_NAME.to_string(),
        }
    }
}

/// OPERATION_STARTED event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStartedMessage {
    pub operation: OperationInfo,
}

/// Progress sample embedded in PROGRESS_UPDATE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressData {
    pub operation_id: String,
    pub operation_type: String,
    pub progress: u8,
    pub status: String,
    pub current_step: String,
    pub timestamp: Timestamp,
}

impl ProgressData {
    /// Progress sample for a simulated test operation
    pub fn test(operation_id: &str, progress: u8, timestamp: Timestamp) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            operation_type: TEST_OPERATION_TYPE.to_string(),
            progress,
            status: STATUS_RUNNING.to_string(),
            current_step: step_label(progress),
            timestamp,
        }
    }
}

/// Step label for a progress value: `Step N` while running, `Completed` at 100
pub fn step_label(progress: u8) -> String {
    if progress < 100 {
        format!("Step {}", progress / 25 + 1)
    } else {
        "Completed".to_string()
    }
}

/// Progress values a simulated operation walks through
pub fn progress_steps() -> impl Iterator<Item = u8> {
    PROGRESS_STEPS.into_iter()
}

/// PROGRESS_UPDATE event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdateMessage {
    pub data: ProgressData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionDetails {
    pub completion_time: Timestamp,
}

/// OPERATION_COMPLETED event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCompletedMessage {
    pub operation_id: String,
    pub details: CompletionDetails,
}

/// Request to cancel an operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CancelOperationMessage {
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationDetails {
    pub cancellation_time: Timestamp,
}

/// OPERATION_CANCELED event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCanceledMessage {
    /// Null on the wire when the cancel request named no operation
    pub operation_id: Option<String>,
    pub details: CancellationDetails,
}

/// A frame that is not one of the known kinds
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueMessage {
    /// The `type` tag, when the frame was a JSON object carrying one
    pub tag: Option<String>,
    /// Whether the frame parsed as JSON at all
    pub structured: bool,
    /// Original frame text
    pub text: String,
}

impl OpaqueMessage {
    /// Wrap text that is not JSON
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            tag: None,
            structured: false,
            text: text.into(),
        }
    }
}

impl Message {
    /// Get the known message kind, if any
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Message::Ping(_) => Some(MessageKind::Ping),
            Message::Pong(_) => Some(MessageKind::Pong),
            Message::TestOperation(_) => Some(MessageKind::TestOperation),
            Message::OperationStarted(_) => Some(MessageKind::OperationStarted),
            Message::ProgressUpdate(_) => Some(MessageKind::ProgressUpdate),
            Message::OperationCompleted(_) => Some(MessageKind::OperationCompleted),
            Message::CancelOperation(_) => Some(MessageKind::CancelOperation),
            Message::OperationCanceled(_) => Some(MessageKind::OperationCanceled),
            Message::Opaque(_) => None,
        }
    }

    /// Get the `type` tag as it appeared on the wire
    ///
    /// Structured frames with an unrecognized tag still report it; raw text
    /// and objects without a string `type` report `None`.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Message::Opaque(opaque) => opaque.tag.as_deref(),
            other => other.kind().map(|k| k.as_str()),
        }
    }

    /// Whether the frame parsed as structured data
    pub fn is_structured(&self) -> bool {
        match self {
            Message::Opaque(opaque) => opaque.structured,
            _ => true,
        }
    }

    /// Operation id carried by this message, if any
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            Message::TestOperation(m) => Some(&m.operation_id),
            Message::OperationStarted(m) => Some(&m.operation.operation_id),
            Message::ProgressUpdate(m) => Some(&m.data.operation_id),
            Message::OperationCompleted(m) => Some(&m.operation_id),
            Message::CancelOperation(m) => m.operation_id.as_deref(),
            Message::OperationCanceled(m) => m.operation_id.as_deref(),
            Message::Ping(_) | Message::Pong(_) | Message::Opaque(_) => None,
        }
    }

    pub fn ping(timestamp: Timestamp) -> Self {
        Message::Ping(PingMessage {
            timestamp: Some(timestamp),
        })
    }

    pub fn pong(timestamp: Timestamp, client_timestamp: Option<Timestamp>) -> Self {
        Message::Pong(PongMessage {
            timestamp,
            client_timestamp,
        })
    }

    pub fn test_operation(operation_id: &str, timestamp: Timestamp) -> Self {
        Message::TestOperation(TestOperationMessage {
            operation_id: operation_id.to_string(),
            timestamp: Some(timestamp),
        })
    }

    pub fn operation_started(operation_id: &str) -> Self {
        Message::OperationStarted(OperationStartedMessage {
            operation: OperationInfo::test(operation_id),
        })
    }

    pub fn progress_update(operation_id: &str, progress: u8, timestamp: Timestamp) -> Self {
        Message::ProgressUpdate(ProgressUpdateMessage {
            data: ProgressData::test(operation_id, progress, timestamp),
        })
    }

    pub fn operation_completed(operation_id: &str, completion_time: Timestamp) -> Self {
        Message::OperationCompleted(OperationCompletedMessage {
            operation_id: operation_id.to_string(),
            details: CompletionDetails { completion_time },
        })
    }

    pub fn cancel_operation(operation_id: &str, timestamp: Timestamp) -> Self {
        Message::CancelOperation(CancelOperationMessage {
            operation_id: Some(operation_id.to_string()),
            timestamp: Some(timestamp),
        })
    }

    pub fn operation_canceled(operation_id: Option<&str>, cancellation_time: Timestamp) -> Self {
        Message::OperationCanceled(OperationCanceledMessage {
            operation_id: operation_id.map(str::to_string),
            details: CancellationDetails { cancellation_time },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_labels() {
        let labels: Vec<String> = progress_steps().map(step_label).collect();
        assert_eq!(
            labels,
            vec!["Step 1", "Step 2", "Step 3", "Step 4", "Completed"]
        );
    }

    #[test]
    fn test_kind_tags_are_bijective() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::from_tag("list_operations"), None);
    }
}
