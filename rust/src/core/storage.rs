// Projection of the message store into the UI snapshot.

use super::presence::PresenceTracker;
use super::read_state::ReadState;
use super::AppCore;
use crate::model::{Chat, ChatKind, Message};
use crate::state::{ChatMessage, ChatSummary, ChatViewState, MemberInfo, TypingMember};

fn members(chat: &Chat, presence: &PresenceTracker) -> Vec<MemberInfo> {
    chat.participants
        .iter()
        .map(|p| MemberInfo {
            participant_id: p.id.clone(),
            user_id: p.user_id.clone(),
            user_kind: p.user_kind,
            name: p.name.clone(),
            avatar_url: p.avatar_url.clone(),
            is_admin: p.is_admin,
            is_online: presence.is_online(&p.user_id),
        })
        .collect()
}

/// Groups show their name; one-on-one chats show the other participant.
fn title(chat: &Chat, viewer: &str) -> Option<String> {
    match chat.kind {
        ChatKind::Group => chat.name.clone(),
        ChatKind::OneOnOne => chat
            .partner(viewer)
            .and_then(|p| p.name.clone())
            .or_else(|| chat.name.clone()),
    }
}

fn avatar_url(chat: &Chat, viewer: &str) -> Option<String> {
    match chat.kind {
        ChatKind::Group => chat.avatar_url.clone(),
        ChatKind::OneOnOne => chat
            .partner(viewer)
            .and_then(|p| p.avatar_url.clone())
            .or_else(|| chat.avatar_url.clone()),
    }
}

fn partner_online(chat: &Chat, viewer: &str, presence: &PresenceTracker) -> bool {
    chat.partner(viewer)
        .map(|p| presence.is_online(&p.user_id))
        .unwrap_or(false)
}

fn typing_user_ids(chat: &Chat, viewer: &str, presence: &PresenceTracker) -> Vec<String> {
    presence
        .typing_users(&chat.id)
        .into_iter()
        .filter(|u| u != viewer)
        .collect()
}

fn summarize(chat: &Chat, viewer: &str, presence: &PresenceTracker) -> ChatSummary {
    let last = chat.messages.last();
    ChatSummary {
        chat_id: chat.id.clone(),
        kind: chat.kind,
        title: title(chat, viewer),
        avatar_url: avatar_url(chat, viewer),
        members: members(chat, presence),
        last_message: last.and_then(Message::preview),
        last_message_at: last.map(|m| m.created_at),
        unread_count: chat.unread_count,
        typing_user_ids: typing_user_ids(chat, viewer, presence),
        is_partner_online: partner_online(chat, viewer, presence),
    }
}

fn chat_view(
    chat: &Chat,
    viewer: &str,
    presence: &PresenceTracker,
    read_state: &ReadState,
) -> ChatViewState {
    let messages = chat
        .messages
        .iter()
        .map(|m| ChatMessage {
            id: m.id.clone(),
            sender_id: m.sender_id.clone(),
            sender_name: chat
                .participant_by_user(&m.sender_id)
                .and_then(|p| p.name.clone()),
            content: m.content.clone(),
            attachments: m.attachments.clone(),
            created_at: m.created_at,
            is_mine: m.sender_id == viewer,
            read_by: m.read_by.clone(),
            status: m.status.clone(),
        })
        .collect();
    let typing_members = typing_user_ids(chat, viewer, presence)
        .into_iter()
        .map(|user_id| TypingMember {
            name: chat
                .participant_by_user(&user_id)
                .and_then(|p| p.name.clone()),
            user_id,
        })
        .collect();
    ChatViewState {
        chat_id: chat.id.clone(),
        kind: chat.kind,
        title: title(chat, viewer),
        members: members(chat, presence),
        is_admin: chat
            .participant_by_user(viewer)
            .map(|p| p.is_admin)
            .unwrap_or(false),
        messages,
        can_load_older: read_state.can_load_older(&chat.id),
        is_loading: read_state.is_loading(&chat.id),
        is_partner_online: partner_online(chat, viewer, presence),
        typing_members,
    }
}

impl AppCore {
    pub(super) fn refresh_views(&mut self) {
        let viewer = self.viewing_user_id().unwrap_or_default();
        let chat_list: Vec<ChatSummary> = self
            .store
            .chats_by_recent_activity()
            .into_iter()
            .map(|c| summarize(c, viewer, &self.presence))
            .collect();
        let current_chat = self
            .read_state
            .active_chat_id()
            .and_then(|id| self.store.chat(id))
            .map(|c| chat_view(c, viewer, &self.presence, &self.read_state));
        let presence = self.presence.presence().clone();

        self.state.chat_list = chat_list;
        self.state.current_chat = current_chat;
        self.state.presence = presence;
    }
}
