use crate::api::OutgoingAttachment;
use crate::state::Screen;

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session
    StartSession {
        user_id: String,
        access_token: String,
    },
    SetAccessToken {
        access_token: String,
    },
    Logout,

    // Navigation
    PushScreen {
        screen: Screen,
    },
    UpdateScreenStack {
        stack: Vec<Screen>,
    },
    OpenChat {
        chat_id: String,
    },
    CloseChat,

    // History
    RefreshChats,
    LoadOlderMessages {
        chat_id: String,
    },

    // Composer
    ComposerChanged {
        chat_id: String,
        text: String,
    },
    SendMessage {
        chat_id: String,
        content: String,
        attachments: Vec<OutgoingAttachment>,
    },
    RetryMessage {
        chat_id: String,
        message_id: String,
    },
    DiscardMessage {
        chat_id: String,
        message_id: String,
    },
    DeleteMessage {
        chat_id: String,
        message_id: String,
    },

    // Membership
    CreateChat {
        peer_user_id: String,
    },
    CreateGroupChat {
        name: String,
        participant_ids: Vec<String>,
    },
    AddParticipants {
        chat_id: String,
        user_ids: Vec<String>,
    },
    RemoveParticipant {
        chat_id: String,
        participant_id: String,
    },
    LeaveChat {
        chat_id: String,
    },
    DeleteChat {
        chat_id: String,
    },

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes the access token or message text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::StartSession { .. } => "StartSession",
            AppAction::SetAccessToken { .. } => "SetAccessToken",
            AppAction::Logout => "Logout",

            // Navigation
            AppAction::PushScreen { .. } => "PushScreen",
            AppAction::UpdateScreenStack { .. } => "UpdateScreenStack",
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::CloseChat => "CloseChat",

            // History
            AppAction::RefreshChats => "RefreshChats",
            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",

            // Composer
            AppAction::ComposerChanged { .. } => "ComposerChanged",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::DiscardMessage { .. } => "DiscardMessage",
            AppAction::DeleteMessage { .. } => "DeleteMessage",

            // Membership
            AppAction::CreateChat { .. } => "CreateChat",
            AppAction::CreateGroupChat { .. } => "CreateGroupChat",
            AppAction::AddParticipants { .. } => "AddParticipants",
            AppAction::RemoveParticipant { .. } => "RemoveParticipant",
            AppAction::LeaveChat { .. } => "LeaveChat",
            AppAction::DeleteChat { .. } => "DeleteChat",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}
