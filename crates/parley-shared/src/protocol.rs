use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::message::Message;
use crate::types::{CallType, MessageId, MessageKind, UserId};

/// Frames a client sends over its WebSocket, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundEvent {
    /// Bind the connection to an identity
    Auth(AuthRequest),

    /// Send a direct message
    Chat(ChatRequest),

    /// Delete a message for the requester or for everyone
    DeleteMessage(DeleteRequest),

    /// Toggle an emoji reaction
    Reaction(ReactionRequest),

    /// WebRTC signaling payload, relayed verbatim and never stored
    CallSignal(CallSignalRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default)]
    pub content: String,
    /// Defaults to `text` when absent or null.
    #[serde(default)]
    pub msg_type: Option<MessageKind>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl ChatRequest {
    pub fn kind(&self) -> MessageKind {
        self.msg_type.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub message_id: MessageId,
    pub user_id: UserId,
    #[serde(default)]
    pub for_everyone: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSignalRequest {
    pub target_id: UserId,
    /// SDP offer/answer, ICE candidate or hangup; opaque to the server
    pub signal: serde_json::Value,
    pub call_type: CallType,
}

impl InboundEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The wire tag, used to label errors sent back to the client.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Chat(_) => "chat",
            Self::DeleteMessage(_) => "delete-message",
            Self::Reaction(_) => "reaction",
            Self::CallSignal(_) => "call-signal",
        }
    }
}

/// Frames the server pushes to a client, tagged by `type`.
///
/// `chat` doubles as the update frame for reaction changes: clients upsert
/// the message by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundEvent {
    Chat {
        message: Message,
    },

    DeleteMessage {
        message: Message,
    },

    #[serde(rename_all = "camelCase")]
    CallSignal {
        sender_id: UserId,
        signal: serde_json::Value,
        call_type: CallType,
    },

    #[serde(rename_all = "camelCase")]
    Authenticated {
        user_id: UserId,
    },

    /// An inbound action failed; the client should offer a retry.
    Error {
        action: String,
        kind: String,
        reason: String,
    },
}

impl OutboundEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_chat_with_defaults() {
        let sender = UserId::new();
        let receiver = UserId::new();
        let frame = json!({
            "type": "chat",
            "senderId": sender,
            "receiverId": receiver,
            "content": "hello",
            "msgType": null,
        });

        let event = InboundEvent::from_json(&frame.to_string()).unwrap();
        let InboundEvent::Chat(chat) = event else {
            panic!("expected chat event");
        };
        assert_eq!(chat.sender_id, sender);
        assert_eq!(chat.receiver_id, receiver);
        assert_eq!(chat.kind(), MessageKind::Text);
        assert!(chat.file_url.is_none());
    }

    #[test]
    fn test_decode_delete_and_signal() {
        let frame = json!({
            "type": "delete-message",
            "messageId": MessageId::new(),
            "userId": UserId::new(),
            "forEveryone": true,
        });
        match InboundEvent::from_json(&frame.to_string()).unwrap() {
            InboundEvent::DeleteMessage(req) => assert!(req.for_everyone),
            other => panic!("unexpected event: {:?}", other),
        }

        let frame = json!({
            "type": "call-signal",
            "targetId": UserId::new(),
            "signal": { "sdp": "v=0", "kind": "offer" },
            "callType": "video",
        });
        match InboundEvent::from_json(&frame.to_string()).unwrap() {
            InboundEvent::CallSignal(req) => {
                assert_eq!(req.call_type, CallType::Video);
                assert_eq!(req.signal["kind"], "offer");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = InboundEvent::from_json(r#"{"type":"typing","userId":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_encode_call_signal_uses_camel_case() {
        let sender = UserId::new();
        let event = OutboundEvent::CallSignal {
            sender_id: sender,
            signal: json!({"candidate": "a=1"}),
            call_type: CallType::Audio,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "call-signal");
        assert_eq!(value["senderId"], sender.to_string());
        assert_eq!(value["callType"], "audio");
        assert_eq!(value["signal"]["candidate"], "a=1");
    }
}
