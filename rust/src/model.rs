//! Domain records held by the message store.
//!
//! These are the engine's canonical shapes. Wire JSON is decoded into them by
//! [`crate::wire`]; the UI receives them (cloned) inside [`crate::AppState`].

/// Prefix reserved for locally generated message ids. Server ids never carry it.
pub const PROVISIONAL_ID_PREFIX: &str = "local:";

pub fn new_provisional_id() -> String {
    format!("{PROVISIONAL_ID_PREFIX}{}", uuid::Uuid::new_v4())
}

pub fn is_provisional_id(id: &str) -> bool {
    id.starts_with(PROVISIONAL_ID_PREFIX)
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatKind {
    OneOnOne,
    Group,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserKind {
    Student,
    Advisor,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    /// Participant record id (used by the remove-participant endpoint).
    pub id: String,
    pub user_id: String,
    pub user_kind: UserKind,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
}

impl AttachmentKind {
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image") {
            Self::Image
        } else if mime_type.starts_with("video") {
            Self::Video
        } else {
            Self::Document
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    pub kind: AttachmentKind,
    pub name: Option<String>,
    pub size: u64,
    /// Device-local file reference, set only while the owning message is unconfirmed.
    pub local_path: Option<String>,
}

/// Delivery lifecycle of a message.
///
/// Everything fetched over REST or delivered by the push channel is `Sent`.
/// `Pending` and `Error` only ever appear on messages composed on this device
/// and always carry a provisional id.
#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Sent,
    Error { reason: String },
}

impl MessageStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Server creation time, milliseconds since the Unix epoch.
    pub created_at: i64,
    pub read_by: Vec<String>,
    pub status: MessageStatus,
}

impl Message {
    /// Short text for chat list previews: the content, or the last attachment's name.
    pub fn preview(&self) -> Option<String> {
        if let Some(content) = self.content.as_ref().filter(|c| !c.is_empty()) {
            return Some(content.clone());
        }
        self.attachments.last().map(|a| {
            a.name.clone().unwrap_or_else(|| match a.kind {
                AttachmentKind::Image => "Photo".to_string(),
                AttachmentKind::Video => "Video".to_string(),
                AttachmentKind::Document => "Document".to_string(),
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chat {
    pub id: String,
    pub kind: ChatKind,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub participants: Vec<Participant>,
    /// Oldest first.
    pub messages: Vec<Message>,
    pub unread_count: u32,
}

impl Chat {
    pub fn participant_by_user(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn admin(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_admin)
    }

    /// The other side of a one-on-one chat as seen by `viewing_user_id`.
    pub fn partner(&self, viewing_user_id: &str) -> Option<&Participant> {
        match self.kind {
            ChatKind::OneOnOne => self
                .participants
                .iter()
                .find(|p| p.user_id != viewing_user_id),
            ChatKind::Group => None,
        }
    }

    pub fn last_activity_at(&self) -> Option<i64> {
        self.messages.last().map(|m| m.created_at)
    }

    /// One-on-one chats have exactly two participants; groups have at least
    /// one participant and exactly one admin.
    pub fn is_well_formed(&self) -> bool {
        match self.kind {
            ChatKind::OneOnOne => self.participants.len() == 2,
            ChatKind::Group => {
                !self.participants.is_empty()
                    && self.participants.iter().filter(|p| p.is_admin).count() == 1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(user_id: &str, is_admin: bool) -> Participant {
        Participant {
            id: format!("p-{user_id}"),
            user_id: user_id.to_string(),
            user_kind: UserKind::Student,
            name: None,
            avatar_url: None,
            is_admin,
        }
    }

    #[test]
    fn provisional_ids_are_disjoint_from_server_ids() {
        let id = new_provisional_id();
        assert!(is_provisional_id(&id));
        assert_ne!(id, new_provisional_id());
        assert!(!is_provisional_id("clx0a9m2k0000abcd"));
        assert!(!is_provisional_id("m42"));
    }

    #[test]
    fn well_formedness_depends_on_chat_kind() {
        let mut chat = Chat {
            id: "c1".into(),
            kind: ChatKind::OneOnOne,
            name: None,
            avatar_url: None,
            participants: vec![participant("u1", false), participant("u2", false)],
            messages: vec![],
            unread_count: 0,
        };
        assert!(chat.is_well_formed());
        assert_eq!(chat.partner("u1").map(|p| p.user_id.as_str()), Some("u2"));

        chat.participants.pop();
        assert!(!chat.is_well_formed());

        chat.kind = ChatKind::Group;
        assert!(!chat.is_well_formed(), "group needs an admin");
        chat.participants[0].is_admin = true;
        assert!(chat.is_well_formed());
        assert!(chat.partner("u1").is_none());
    }

    #[test]
    fn preview_falls_back_to_attachment_name() {
        let msg = Message {
            id: "m1".into(),
            chat_id: "c1".into(),
            sender_id: "u1".into(),
            content: None,
            attachments: vec![Attachment {
                id: "a1".into(),
                url: "https://cdn.example/a1.pdf".into(),
                kind: AttachmentKind::Document,
                name: Some("syllabus.pdf".into()),
                size: 10,
                local_path: None,
            }],
            created_at: 1,
            read_by: vec![],
            status: MessageStatus::Sent,
        };
        assert_eq!(msg.preview().as_deref(), Some("syllabus.pdf"));
        assert_eq!(AttachmentKind::from_mime("video/mp4"), AttachmentKind::Video);
        assert_eq!(AttachmentKind::from_mime("application/pdf"), AttachmentKind::Document);
    }
}
