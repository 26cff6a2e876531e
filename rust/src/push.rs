//! Push channel contract.
//!
//! The platform owns the socket. It reports connection lifecycle through
//! [`PushConnectionEvent`], hands inbound notifications to
//! `FfiApp::push_event`, and performs outgoing emissions through
//! [`PushTransport`].

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::model::Message;
use crate::wire::{MessageDto, PresenceSnapshotDto};

pub mod inbound {
    pub const NEW_MESSAGE: &str = "new-message";
    pub const DELETE_MESSAGE: &str = "delete-message";
    pub const CHAT_DELETED: &str = "chat-deleted";
    pub const GROUP_DELETED: &str = "group-deleted";
    pub const GROUP_LEFT: &str = "group-left";
    pub const CHAT_PARTNERS_STATUS: &str = "chat-partners-status";
    pub const USER_ONLINE: &str = "user-online";
    pub const USER_OFFLINE: &str = "user-offline";
    pub const TYPING: &str = "typing";
    pub const STOP_TYPING: &str = "stop-typing";
    pub const NOTIFICATION_COUNT: &str = "notification-count";
    pub const NEW_NOTIFICATION: &str = "new-notification";
}

pub mod outbound {
    pub const TYPING: &str = "typing";
    pub const STOP_TYPING: &str = "stop-typing";
    pub const MARK_CHAT_READ: &str = "mark-chat-read";
    pub const GET_CHAT_PARTNERS_STATUS: &str = "get-chat-partners-status";
    pub const GET_NOTIFICATION_COUNT: &str = "get-notification-count";
}

/// Outgoing half of the push channel, implemented by the platform.
///
/// Calls are made from the core actor thread; implementations must not block.
#[uniffi::export(callback_interface)]
pub trait PushTransport: Send + Sync + 'static {
    fn connect(&self, access_token: String);
    fn disconnect(&self);
    fn emit(&self, event: String, payload_json: String);
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum PushConnectionEvent {
    Connected,
    Disconnected { reason: String },
    ConnectFailed { reason: String },
    AuthFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushDecodeError {
    #[error("unknown push event `{0}`")]
    UnknownEvent(String),
    #[error("malformed `{event}` payload: {reason}")]
    Malformed { event: String, reason: String },
}

/// A decoded inbound notification.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    NewMessage(Message),
    DeleteMessage { chat_id: String, message_id: String },
    ChatDeleted { chat_id: String },
    GroupDeleted { chat_id: String },
    GroupLeft { chat_id: String, user_id: String },
    PresenceSnapshot(HashMap<String, bool>),
    UserOnline { user_id: String },
    UserOffline { user_id: String },
    Typing { chat_id: String, user_id: String },
    StopTyping { chat_id: String, user_id: String },
    /// Notification-subsystem events, forwarded without interpretation.
    Notification { event: String, payload_json: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRef {
    chat_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRef {
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatUserRef {
    chat_id: String,
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    chat_id: String,
    message_id: String,
}

fn payload<T: DeserializeOwned>(event: &str, payload_json: &str) -> Result<T, PushDecodeError> {
    serde_json::from_str(payload_json).map_err(|e| PushDecodeError::Malformed {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

impl PushEvent {
    pub fn decode(event: &str, payload_json: &str) -> Result<Self, PushDecodeError> {
        use inbound::*;

        let decoded = match event {
            NEW_MESSAGE => {
                let dto: MessageDto = payload(event, payload_json)?;
                let message = dto.into_message(None).ok_or_else(|| PushDecodeError::Malformed {
                    event: event.to_string(),
                    reason: "message record missing id, chatId or sender".to_string(),
                })?;
                PushEvent::NewMessage(message)
            }
            DELETE_MESSAGE => {
                let r: MessageRef = payload(event, payload_json)?;
                PushEvent::DeleteMessage {
                    chat_id: r.chat_id,
                    message_id: r.message_id,
                }
            }
            CHAT_DELETED => PushEvent::ChatDeleted {
                chat_id: payload::<ChatRef>(event, payload_json)?.chat_id,
            },
            GROUP_DELETED => PushEvent::GroupDeleted {
                chat_id: payload::<ChatRef>(event, payload_json)?.chat_id,
            },
            GROUP_LEFT => {
                let r: ChatUserRef = payload(event, payload_json)?;
                PushEvent::GroupLeft {
                    chat_id: r.chat_id,
                    user_id: r.user_id,
                }
            }
            CHAT_PARTNERS_STATUS => PushEvent::PresenceSnapshot(
                payload::<PresenceSnapshotDto>(event, payload_json)?.into_map(),
            ),
            USER_ONLINE => PushEvent::UserOnline {
                user_id: payload::<UserRef>(event, payload_json)?.user_id,
            },
            USER_OFFLINE => PushEvent::UserOffline {
                user_id: payload::<UserRef>(event, payload_json)?.user_id,
            },
            TYPING | STOP_TYPING => {
                let r: ChatUserRef = payload(event, payload_json)?;
                if event == TYPING {
                    PushEvent::Typing {
                        chat_id: r.chat_id,
                        user_id: r.user_id,
                    }
                } else {
                    PushEvent::StopTyping {
                        chat_id: r.chat_id,
                        user_id: r.user_id,
                    }
                }
            }
            NOTIFICATION_COUNT | NEW_NOTIFICATION => PushEvent::Notification {
                event: event.to_string(),
                payload_json: payload_json.to_string(),
            },
            other => return Err(PushDecodeError::UnknownEvent(other.to_string())),
        };
        Ok(decoded)
    }

    pub fn name(&self) -> &str {
        match self {
            PushEvent::NewMessage(_) => inbound::NEW_MESSAGE,
            PushEvent::DeleteMessage { .. } => inbound::DELETE_MESSAGE,
            PushEvent::ChatDeleted { .. } => inbound::CHAT_DELETED,
            PushEvent::GroupDeleted { .. } => inbound::GROUP_DELETED,
            PushEvent::GroupLeft { .. } => inbound::GROUP_LEFT,
            PushEvent::PresenceSnapshot(_) => inbound::CHAT_PARTNERS_STATUS,
            PushEvent::UserOnline { .. } => inbound::USER_ONLINE,
            PushEvent::UserOffline { .. } => inbound::USER_OFFLINE,
            PushEvent::Typing { .. } => inbound::TYPING,
            PushEvent::StopTyping { .. } => inbound::STOP_TYPING,
            PushEvent::Notification { event, .. } => event,
        }
    }
}

pub(crate) fn chat_payload(chat_id: &str) -> String {
    serde_json::json!({ "chatId": chat_id }).to_string()
}
