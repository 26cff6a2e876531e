use std::collections::HashMap;

use crate::api::CreateMessageRequest;
use crate::model::{Attachment, Message, MessageStatus};

#[derive(Debug, Clone)]
struct OutboxEntry {
    request: CreateMessageRequest,
    in_flight: bool,
    attempts: u32,
}

/// Original requests for every provisional message that has not been
/// confirmed, so a retry resends exactly what was composed.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    // provisional id -> entry
    entries: HashMap<String, OutboxEntry>,
}

impl Outbox {
    pub(crate) fn track(&mut self, provisional_id: &str, request: CreateMessageRequest) {
        self.entries.insert(
            provisional_id.to_string(),
            OutboxEntry {
                request,
                in_flight: false,
                attempts: 0,
            },
        );
    }

    /// Marks the entry in flight and hands back its request. `None` when the
    /// id is unknown or a send is already outstanding.
    pub(crate) fn begin_attempt(&mut self, provisional_id: &str) -> Option<CreateMessageRequest> {
        let entry = self.entries.get_mut(provisional_id)?;
        if entry.in_flight {
            return None;
        }
        entry.in_flight = true;
        entry.attempts += 1;
        Some(entry.request.clone())
    }

    /// Returns the number of attempts made so far, or `None` for an unknown id.
    pub(crate) fn mark_failed(&mut self, provisional_id: &str) -> Option<u32> {
        let entry = self.entries.get_mut(provisional_id)?;
        entry.in_flight = false;
        Some(entry.attempts)
    }

    #[cfg(test)]
    pub(crate) fn is_in_flight(&self, provisional_id: &str) -> bool {
        self.entries
            .get(provisional_id)
            .map(|e| e.in_flight)
            .unwrap_or(false)
    }

    /// Forget the entry; true if it was tracked.
    pub(crate) fn resolve(&mut self, provisional_id: &str) -> bool {
        self.entries.remove(provisional_id).is_some()
    }

    pub(crate) fn drop_chat(&mut self, chat_id: &str) {
        self.entries.retain(|_, e| e.request.chat_id != chat_id);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The provisional store entry for a freshly composed message. Attachments
/// point at the device-local file until the server record replaces them.
pub(crate) fn optimistic_message(
    provisional_id: &str,
    sender_id: &str,
    request: &CreateMessageRequest,
    created_at: i64,
) -> Message {
    let attachments = request
        .attachments
        .iter()
        .enumerate()
        .map(|(idx, a)| Attachment {
            id: format!("{provisional_id}/{idx}"),
            url: a.local_path.clone(),
            kind: a.kind(),
            name: a.name.clone(),
            size: a.size,
            local_path: Some(a.local_path.clone()),
        })
        .collect();
    Message {
        id: provisional_id.to_string(),
        chat_id: request.chat_id.clone(),
        sender_id: sender_id.to_string(),
        content: request.content.clone(),
        attachments,
        created_at,
        read_by: vec![sender_id.to_string()],
        status: MessageStatus::Pending,
    }
}
