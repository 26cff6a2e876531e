use std::collections::HashMap;

use crate::model::{Attachment, ChatKind, MessageStatus, UserKind};

#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub router: Router,
    pub auth: AuthState,
    pub connection: ConnectionState,
    pub busy: BusyState,
    pub chat_list: Vec<ChatSummary>,
    pub current_chat: Option<ChatViewState>,
    /// user id -> online, as last reported by the push channel.
    pub presence: HashMap<String, bool>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            router: Router {
                default_screen: Screen::Login,
                screen_stack: vec![],
            },
            auth: AuthState::LoggedOut,
            connection: ConnectionState::Idle,
            busy: BusyState::idle(),
            chat_list: vec![],
            current_chat: None,
            presence: HashMap::new(),
            toast: None,
        }
    }
}

/// "In flight" flags for remote calls the UI should reflect.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub fetching_chats: bool,
    pub loading_messages: bool,
    pub creating_chat: bool,
    pub updating_members: bool,
    pub deleting_chat: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            fetching_chats: false,
            loading_messages: false,
            creating_chat: false,
            updating_members: false,
            deleting_chat: false,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct Router {
    pub default_screen: Screen,
    pub screen_stack: Vec<Screen>,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum Screen {
    Login,
    ChatList,
    Chat { chat_id: String },
    ChatDetails { chat_id: String },
    NewChat,
    NewGroupChat,
    AddMembers { chat_id: String },
}

impl Screen {
    /// The chat a screen is showing, if any.
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            Screen::Chat { chat_id }
            | Screen::ChatDetails { chat_id }
            | Screen::AddMembers { chat_id } => Some(chat_id),
            _ => None,
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn { user_id: String },
}

/// Push channel health as seen by the engine.
#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Retries exhausted; the next foreground or credential change tries again.
    Failed,
    /// Credential rejected; no automatic attempts until a new token arrives.
    AuthRequired,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct MemberInfo {
    pub participant_id: String,
    pub user_id: String,
    pub user_kind: UserKind,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub is_online: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatSummary {
    pub chat_id: String,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub members: Vec<MemberInfo>,
    pub last_message: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread_count: u32,
    pub typing_user_ids: Vec<String>,
    pub is_partner_online: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatViewState {
    pub chat_id: String,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub members: Vec<MemberInfo>,
    pub is_admin: bool,
    /// Oldest first.
    pub messages: Vec<ChatMessage>,
    pub can_load_older: bool,
    /// A page fetch for this chat is outstanding.
    pub is_loading: bool,
    pub is_partner_online: bool,
    pub typing_members: Vec<TypingMember>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct TypingMember {
    pub user_id: String,
    pub name: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub created_at: i64,
    pub is_mine: bool,
    pub read_by: Vec<String>,
    pub status: MessageStatus,
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::Screen;

    #[test]
    fn chat_scoped_screens_expose_their_chat() {
        assert_eq!(
            Screen::Chat {
                chat_id: "c1".into()
            }
            .chat_id(),
            Some("c1")
        );
        assert_eq!(
            Screen::ChatDetails {
                chat_id: "c2".into()
            }
            .chat_id(),
            Some("c2")
        );
        assert_eq!(Screen::NewGroupChat.chat_id(), None);
        assert_eq!(Screen::ChatList.chat_id(), None);
    }
}
