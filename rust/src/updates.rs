use crate::api::ApiError;
use crate::model::{Chat, Message};
use crate::push::{PushConnectionEvent, PushEvent};
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// Notification-subsystem push events, passed through untouched.
    NotificationForwarded {
        rev: u64,
        event: String,
        payload_json: String,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::NotificationForwarded { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Everything that re-enters the actor from outside the UI: push traffic,
/// timers and resolved remote calls.
///
/// Remote-call results carry the session `epoch` they were issued under so
/// completions that outlive a logout are dropped.
#[derive(Debug)]
pub enum InternalEvent {
    // Push channel
    PushEventReceived(PushEvent),
    PushConnectionChanged(PushConnectionEvent),

    // Timers
    ReconnectDue {
        token: u64,
    },
    TypingExpired {
        chat_id: String,
        user_id: String,
        token: u64,
    },
    StopTypingDue {
        chat_id: String,
        token: u64,
    },

    // History
    ChatsFetched {
        epoch: u64,
        result: Result<Vec<Chat>, ApiError>,
    },
    MessagesFetched {
        epoch: u64,
        chat_id: String,
        page: u32,
        result: Result<Vec<Message>, ApiError>,
    },

    // Send pipeline
    SendMessageResult {
        epoch: u64,
        chat_id: String,
        provisional_id: String,
        result: Result<Message, ApiError>,
    },
    DeleteMessageResult {
        epoch: u64,
        chat_id: String,
        message: Message,
        result: Result<(), ApiError>,
    },

    // Membership
    ChatCreated {
        epoch: u64,
        result: Result<Chat, ApiError>,
    },
    ParticipantsAdded {
        epoch: u64,
        chat_id: String,
        result: Result<Chat, ApiError>,
    },
    ParticipantRemoved {
        epoch: u64,
        chat_id: String,
        participant_id: String,
        result: Result<(), ApiError>,
    },
    ChatExitResult {
        epoch: u64,
        chat_id: String,
        leaving: bool,
        result: Result<(), ApiError>,
    },
}
