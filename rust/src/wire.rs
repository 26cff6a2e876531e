// Backend JSON shapes and their defensive conversion into domain records.
//
// Every field the engine does not strictly need is optional here. Records that
// lack an identity are dropped (with a warning) instead of failing the whole
// payload.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::model::{
    Attachment, AttachmentKind, Chat, ChatKind, Message, MessageStatus, Participant, UserKind,
};
use crate::state::now_millis;

/// Bodies arrive either bare or wrapped as `{ "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(v) => v,
        }
    }
}

pub(crate) fn parse_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice::<Envelope<T>>(bytes).map(Envelope::into_inner)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TimestampDto {
    Millis(i64),
    Text(String),
}

impl TimestampDto {
    pub(crate) fn to_millis(&self) -> Option<i64> {
        match self {
            TimestampDto::Millis(ms) => Some(*ms),
            TimestampDto::Text(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis())
                .or_else(|| s.parse::<i64>().ok()),
        }
    }
}

fn timestamp_or_now(ts: Option<&TimestampDto>, record_id: &str) -> i64 {
    match ts.and_then(TimestampDto::to_millis) {
        Some(ms) => ms,
        None => {
            tracing::warn!(record_id, "missing or unparsable createdAt, using local time");
            now_millis()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct UserDto {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

impl UserDto {
    fn display_name(&self) -> Option<String> {
        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            return Some(joined);
        }
        self.name.clone().filter(|n| !n.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ParticipantDto {
    pub id: Option<String>,
    pub student_id: Option<String>,
    pub advisor_id: Option<String>,
    pub student: Option<UserDto>,
    pub advisor: Option<UserDto>,
    pub is_admin: Option<bool>,
}

impl ParticipantDto {
    fn user_ref(&self) -> Option<(String, UserKind, Option<&UserDto>)> {
        if let Some(student) = &self.student {
            if let Some(id) = student.id.clone().or_else(|| self.student_id.clone()) {
                return Some((id, UserKind::Student, Some(student)));
            }
        }
        if let Some(advisor) = &self.advisor {
            if let Some(id) = advisor.id.clone().or_else(|| self.advisor_id.clone()) {
                return Some((id, UserKind::Advisor, Some(advisor)));
            }
        }
        if let Some(id) = self.student_id.clone() {
            return Some((id, UserKind::Student, None));
        }
        self.advisor_id
            .clone()
            .map(|id| (id, UserKind::Advisor, None))
    }

    pub(crate) fn user_id(&self) -> Option<String> {
        self.user_ref().map(|(id, _, _)| id)
    }

    pub(crate) fn into_participant(self) -> Option<Participant> {
        let Some((user_id, user_kind, user)) = self.user_ref() else {
            tracing::warn!(participant_id = ?self.id, "participant without a user dropped");
            return None;
        };
        Some(Participant {
            id: self.id.clone().unwrap_or_else(|| user_id.clone()),
            name: user.and_then(UserDto::display_name),
            avatar_url: user.and_then(|u| u.avatar.clone()),
            user_id,
            user_kind,
            is_admin: self.is_admin.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct AttachmentDto {
    pub id: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub size: Option<u64>,
}

impl AttachmentDto {
    fn into_attachment(self) -> Option<Attachment> {
        let url = self.url?;
        let kind = match self.kind.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("IMAGE") => AttachmentKind::Image,
            Some("VIDEO") => AttachmentKind::Video,
            Some(other) if other.contains('/') => AttachmentKind::from_mime(&other.to_ascii_lowercase()),
            _ => AttachmentKind::Document,
        };
        Some(Attachment {
            id: self.id.unwrap_or_else(|| url.clone()),
            url,
            kind,
            name: self.name,
            size: self.size.unwrap_or(0),
            local_path: None,
        })
    }
}

/// `readBy` entries are plain user ids or objects carrying one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ReadByDto {
    Id(String),
    Record {
        #[serde(alias = "userId", alias = "studentId", alias = "advisorId")]
        id: String,
    },
}

impl ReadByDto {
    fn into_id(self) -> String {
        match self {
            ReadByDto::Id(id) | ReadByDto::Record { id } => id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct MessageDto {
    pub id: Option<String>,
    pub chat_id: Option<String>,
    pub sender_id: Option<String>,
    pub sender: Option<UserDto>,
    pub content: Option<String>,
    pub attachments: Option<Vec<AttachmentDto>>,
    pub created_at: Option<TimestampDto>,
    pub read_by: Option<Vec<ReadByDto>>,
}

impl MessageDto {
    /// `fallback_chat_id` covers messages nested inside a chat record, which
    /// may omit their own `chatId`.
    pub(crate) fn into_message(self, fallback_chat_id: Option<&str>) -> Option<Message> {
        let Some(id) = self.id.filter(|id| !id.is_empty()) else {
            tracing::warn!("message without id dropped");
            return None;
        };
        let Some(chat_id) = self
            .chat_id
            .or_else(|| fallback_chat_id.map(ToString::to_string))
        else {
            tracing::warn!(message_id = %id, "message without chatId dropped");
            return None;
        };
        let Some(sender_id) = self
            .sender_id
            .or_else(|| self.sender.as_ref().and_then(|s| s.id.clone()))
        else {
            tracing::warn!(message_id = %id, "message without sender dropped");
            return None;
        };
        let created_at = timestamp_or_now(self.created_at.as_ref(), &id);
        let mut read_by: Vec<String> = self
            .read_by
            .unwrap_or_default()
            .into_iter()
            .map(ReadByDto::into_id)
            .collect();
        read_by.sort();
        read_by.dedup();
        Some(Message {
            id,
            chat_id,
            sender_id,
            content: self.content,
            attachments: self
                .attachments
                .unwrap_or_default()
                .into_iter()
                .filter_map(AttachmentDto::into_attachment)
                .collect(),
            created_at,
            read_by,
            status: MessageStatus::Sent,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ChatDto {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub participants: Vec<ParticipantDto>,
    pub admin: Option<ParticipantDto>,
    pub messages: Option<Vec<MessageDto>>,
    pub unread_count: Option<u32>,
}

impl ChatDto {
    pub(crate) fn into_chat(self) -> Option<Chat> {
        let Some(id) = self.id.filter(|id| !id.is_empty()) else {
            tracing::warn!("chat without id dropped");
            return None;
        };
        let kind = match self.kind.as_deref() {
            Some("GROUP") => ChatKind::Group,
            Some("ONE_ON_ONE") | None => ChatKind::OneOnOne,
            Some(other) => {
                tracing::warn!(chat_id = %id, kind = other, "unknown chat type, treating as one-on-one");
                ChatKind::OneOnOne
            }
        };
        let admin_user = self.admin.as_ref().and_then(ParticipantDto::user_id);
        let mut participants: Vec<Participant> = self
            .participants
            .into_iter()
            .filter_map(ParticipantDto::into_participant)
            .collect();
        if let Some(admin_user) = admin_user {
            if !participants.iter().any(|p| p.is_admin) {
                for p in participants.iter_mut() {
                    p.is_admin = p.user_id == admin_user;
                }
            }
        }

        let mut messages: Vec<Message> = self
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.into_message(Some(&id)))
            .collect();
        messages.sort_by_key(|m| m.created_at);

        let chat = Chat {
            id,
            kind,
            name: self.name.filter(|n| !n.trim().is_empty()),
            avatar_url: self.avatar,
            participants,
            messages,
            unread_count: self.unread_count.unwrap_or(0),
        };
        if !chat.is_well_formed() {
            tracing::warn!(chat_id = %chat.id, kind = ?chat.kind, participants = chat.participants.len(), "chat violates participant invariant");
        }
        Some(chat)
    }
}

/// Presence snapshots are either `{ userId: bool }` or a list of entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum PresenceSnapshotDto {
    Map(HashMap<String, bool>),
    List(Vec<PresenceEntryDto>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PresenceEntryDto {
    pub user_id: String,
    #[serde(alias = "online")]
    pub is_online: bool,
}

impl PresenceSnapshotDto {
    pub(crate) fn into_map(self) -> HashMap<String, bool> {
        match self {
            PresenceSnapshotDto::Map(m) => m,
            PresenceSnapshotDto::List(entries) => entries
                .into_iter()
                .map(|e| (e.user_id, e.is_online))
                .collect(),
        }
    }
}

pub(crate) fn decode_chats(bytes: &[u8]) -> Result<Vec<Chat>, serde_json::Error> {
    let dtos: Vec<ChatDto> = parse_envelope(bytes)?;
    Ok(dtos.into_iter().filter_map(ChatDto::into_chat).collect())
}

pub(crate) fn decode_messages(bytes: &[u8], chat_id: &str) -> Result<Vec<Message>, serde_json::Error> {
    let dtos: Vec<MessageDto> = parse_envelope(bytes)?;
    Ok(dtos
        .into_iter()
        .filter_map(|m| m.into_message(Some(chat_id)))
        .collect())
}
