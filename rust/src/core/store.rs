// Message store: chats and their messages, mutated only through the
// operations below. Every operation is total; references to chats or messages
// that are gone are no-ops.

use std::collections::{HashMap, HashSet};

use crate::model::{Chat, ChatKind, Message, MessageStatus};

#[derive(Debug, Clone, Copy)]
pub(crate) struct AppendContext<'a> {
    pub(crate) viewing_user_id: &'a str,
    pub(crate) active_chat_id: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AppendOutcome {
    Inserted,
    Duplicate,
    UnknownChat,
}

#[derive(Debug, Clone)]
pub(crate) enum MessagePatch {
    /// Swap the provisional entry for the server record.
    Confirm(Message),
    Status(MessageStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParticipantRemoval {
    Removed,
    /// The chat could no longer stand on its own and was dropped.
    ChatRemoved,
    NoOp,
}

#[derive(Debug, Default)]
pub(crate) struct MessageStore {
    chats: HashMap<String, Chat>,
}

/// Position after every message with `created_at <= ts`, so equal timestamps
/// keep arrival order.
fn insertion_index(messages: &[Message], ts: i64) -> usize {
    messages.partition_point(|m| m.created_at <= ts)
}

fn insert_ordered(messages: &mut Vec<Message>, message: Message) {
    let idx = insertion_index(messages, message.created_at);
    messages.insert(idx, message);
}

/// Sort ascending by `created_at` (stable) and drop repeated ids, keeping the
/// last occurrence.
fn normalize(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut out: Vec<Message> = messages
        .into_iter()
        .rev()
        .filter(|m| seen.insert(m.id.clone()))
        .collect();
    out.reverse();
    out.sort_by_key(|m| m.created_at);
    out
}

impl MessageStore {
    pub(crate) fn chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.get(chat_id)
    }

    pub(crate) fn contains_chat(&self, chat_id: &str) -> bool {
        self.chats.contains_key(chat_id)
    }

    pub(crate) fn message(&self, chat_id: &str, message_id: &str) -> Option<&Message> {
        self.chats
            .get(chat_id)?
            .messages
            .iter()
            .find(|m| m.id == message_id)
    }

    pub(crate) fn contains_message(&self, chat_id: &str, message_id: &str) -> bool {
        self.message(chat_id, message_id).is_some()
    }

    /// Chats ordered for the chat list: most recent activity first, chats
    /// without messages last.
    pub(crate) fn chats_by_recent_activity(&self) -> Vec<&Chat> {
        let mut chats: Vec<&Chat> = self.chats.values().collect();
        chats.sort_by(|a, b| {
            b.last_activity_at()
                .cmp(&a.last_activity_at())
                .then_with(|| a.id.cmp(&b.id))
        });
        chats
    }

    pub(crate) fn chat_ids(&self) -> HashSet<String> {
        self.chats.keys().cloned().collect()
    }

    /// True while the chat holds a message the server has not confirmed.
    pub(crate) fn has_unconfirmed(&self, chat_id: &str) -> bool {
        self.chats
            .get(chat_id)
            .is_some_and(|c| c.messages.iter().any(|m| !m.status.is_sent()))
    }

    pub(crate) fn upsert_chats(&mut self, chats: Vec<Chat>) {
        for chat in chats {
            self.upsert_chat(chat);
        }
    }

    /// New chats are inserted as given. Known chats take the incoming
    /// structure (kind, name, participants) and keep their local unread
    /// count; incoming messages are merged into the local history.
    pub(crate) fn upsert_chat(&mut self, incoming: Chat) {
        match self.chats.get_mut(&incoming.id) {
            None => {
                let mut chat = incoming;
                chat.messages = normalize(std::mem::take(&mut chat.messages));
                self.chats.insert(chat.id.clone(), chat);
            }
            Some(existing) => {
                existing.kind = incoming.kind;
                existing.name = incoming.name;
                existing.avatar_url = incoming.avatar_url;
                existing.participants = incoming.participants;
                if !incoming.messages.is_empty() {
                    let mut merged = std::mem::take(&mut existing.messages);
                    merged.extend(incoming.messages);
                    existing.messages = normalize(merged);
                }
            }
        }
    }

    /// Newest-page fetch: the page supersedes the known history, empty or
    /// not. Only messages the page cannot know about survive: local
    /// unconfirmed ones, and the `live` ids stored after the fetch was issued.
    pub(crate) fn replace_messages(&mut self, chat_id: &str, page: Vec<Message>, live: &HashSet<String>) {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return;
        };
        let mut next = normalize(page);
        let known: HashSet<String> = next.iter().map(|m| m.id.clone()).collect();
        for m in std::mem::take(&mut chat.messages) {
            if known.contains(&m.id) {
                continue;
            }
            if !m.status.is_sent() || live.contains(&m.id) {
                insert_ordered(&mut next, m);
            }
        }
        chat.messages = next;
    }

    /// Older-page fetch: union by id.
    pub(crate) fn merge_messages(&mut self, chat_id: &str, page: Vec<Message>) {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return;
        };
        let mut merged = page;
        merged.extend(std::mem::take(&mut chat.messages));
        chat.messages = normalize(merged);
    }

    pub(crate) fn append_message(
        &mut self,
        chat_id: &str,
        message: Message,
        ctx: AppendContext<'_>,
    ) -> AppendOutcome {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return AppendOutcome::UnknownChat;
        };
        if chat.messages.iter().any(|m| m.id == message.id) {
            return AppendOutcome::Duplicate;
        }
        let counts_as_unread =
            message.sender_id != ctx.viewing_user_id && ctx.active_chat_id != Some(chat_id);
        match chat.messages.last() {
            Some(last) if message.created_at < last.created_at => {
                insert_ordered(&mut chat.messages, message)
            }
            _ => chat.messages.push(message),
        }
        if counts_as_unread {
            chat.unread_count = chat.unread_count.saturating_add(1);
        }
        AppendOutcome::Inserted
    }

    /// Returns false when `old_id` is no longer present.
    pub(crate) fn replace_message(&mut self, chat_id: &str, old_id: &str, patch: MessagePatch) -> bool {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return false;
        };
        let Some(idx) = chat.messages.iter().position(|m| m.id == old_id) else {
            return false;
        };
        match patch {
            MessagePatch::Status(status) => {
                chat.messages[idx].status = status;
            }
            MessagePatch::Confirm(confirmed) => {
                chat.messages.remove(idx);
                if let Some(existing) = chat.messages.iter_mut().find(|m| m.id == confirmed.id) {
                    // Already delivered under its server id; keep one copy.
                    existing.read_by = confirmed.read_by;
                } else {
                    insert_ordered(&mut chat.messages, confirmed);
                }
            }
        }
        true
    }

    pub(crate) fn remove_message(&mut self, chat_id: &str, message_id: &str) -> Option<Message> {
        let chat = self.chats.get_mut(chat_id)?;
        let idx = chat.messages.iter().position(|m| m.id == message_id)?;
        Some(chat.messages.remove(idx))
    }

    /// Puts back a message removed optimistically, unless it reappeared since.
    pub(crate) fn restore_message(&mut self, message: Message) -> bool {
        let Some(chat) = self.chats.get_mut(&message.chat_id) else {
            return false;
        };
        if chat.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        insert_ordered(&mut chat.messages, message);
        true
    }

    pub(crate) fn remove_chat(&mut self, chat_id: &str) -> Option<Chat> {
        self.chats.remove(chat_id)
    }

    pub(crate) fn remove_participant(&mut self, chat_id: &str, user_id: &str) -> ParticipantRemoval {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return ParticipantRemoval::NoOp;
        };
        let before = chat.participants.len();
        chat.participants.retain(|p| p.user_id != user_id);
        if chat.participants.len() == before {
            return ParticipantRemoval::NoOp;
        }
        let orphaned = match chat.kind {
            ChatKind::OneOnOne => chat.participants.len() < 2,
            ChatKind::Group => chat.participants.is_empty(),
        };
        if orphaned {
            self.chats.remove(chat_id);
            return ParticipantRemoval::ChatRemoved;
        }
        ParticipantRemoval::Removed
    }

    /// Returns true when the count changed.
    pub(crate) fn set_unread(&mut self, chat_id: &str, count: u32) -> bool {
        match self.chats.get_mut(chat_id) {
            Some(chat) if chat.unread_count != count => {
                chat.unread_count = count;
                true
            }
            _ => false,
        }
    }

    /// The oldest pending local message that an inbound server record is the
    /// echo of: same sender, same text, same number of attachments.
    pub(crate) fn find_pending_echo(&self, chat_id: &str, incoming: &Message) -> Option<String> {
        let chat = self.chats.get(chat_id)?;
        chat.messages
            .iter()
            .find(|m| {
                m.status.is_pending()
                    && m.sender_id == incoming.sender_id
                    && m.content.as_deref().unwrap_or("") == incoming.content.as_deref().unwrap_or("")
                    && m.attachments.len() == incoming.attachments.len()
            })
            .map(|m| m.id.clone())
    }

    pub(crate) fn clear(&mut self) {
        self.chats.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Participant, UserKind};

    const ME: &str = "me";

    fn msg(id: &str, sender: &str, ts: i64) -> Message {
        Message {
            id: id.to_string(),
            chat_id: "c1".to_string(),
            sender_id: sender.to_string(),
            content: Some(format!("text {id}")),
            attachments: vec![],
            created_at: ts,
            read_by: vec![],
            status: MessageStatus::Sent,
        }
    }

    fn participant(user_id: &str) -> Participant {
        Participant {
            id: format!("p-{user_id}"),
            user_id: user_id.to_string(),
            user_kind: UserKind::Student,
            name: None,
            avatar_url: None,
            is_admin: false,
        }
    }

    fn chat(id: &str, messages: Vec<Message>) -> Chat {
        Chat {
            id: id.to_string(),
            kind: ChatKind::OneOnOne,
            name: None,
            avatar_url: None,
            participants: vec![participant(ME), participant("peer")],
            messages,
            unread_count: 0,
        }
    }

    fn ctx(active: Option<&str>) -> AppendContext<'_> {
        AppendContext {
            viewing_user_id: ME,
            active_chat_id: active,
        }
    }

    fn ids(store: &MessageStore, chat_id: &str) -> Vec<String> {
        store
            .chat(chat_id)
            .map(|c| c.messages.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    }

    fn is_sorted(store: &MessageStore, chat_id: &str) -> bool {
        let chat = store.chat(chat_id).unwrap();
        chat.messages
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at)
    }

    #[test]
    fn push_event_lands_between_fetched_messages() {
        let mut store = MessageStore::default();
        store.upsert_chats(vec![chat(
            "c1",
            vec![msg("m1", "peer", 1), msg("m3", "peer", 3)],
        )]);
        let outcome = store.append_message("c1", msg("m2", "peer", 2), ctx(None));
        assert_eq!(outcome, AppendOutcome::Inserted);
        assert_eq!(ids(&store, "c1"), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn order_holds_for_every_interleaving() {
        let timestamps = [5, 1, 4, 1, 3, 2, 9, 0];
        for split in 0..timestamps.len() {
            let mut store = MessageStore::default();
            let fetched: Vec<Message> = timestamps[..split]
                .iter()
                .enumerate()
                .map(|(i, ts)| msg(&format!("f{i}"), "peer", *ts))
                .collect();
            store.upsert_chats(vec![chat("c1", fetched)]);
            for (i, ts) in timestamps[split..].iter().enumerate() {
                store.append_message("c1", msg(&format!("p{i}"), "peer", *ts), ctx(None));
                assert!(is_sorted(&store, "c1"), "split {split} step {i}");
            }
            store.merge_messages("c1", vec![msg("old", "peer", -1), msg("f0", "peer", 5)]);
            assert!(is_sorted(&store, "c1"));
            assert_eq!(ids(&store, "c1").first().map(String::as_str), Some("old"));
        }
    }

    #[test]
    fn equal_timestamps_keep_arrival_order() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![msg("a", "peer", 7), msg("z", "peer", 9)]));
        store.append_message("c1", msg("b", "peer", 7), ctx(None));
        store.append_message("c1", msg("c", "peer", 7), ctx(None));
        assert_eq!(ids(&store, "c1"), vec!["a", "b", "c", "z"]);
    }

    #[test]
    fn unread_accrues_only_for_inactive_chats_and_other_senders() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![]));

        store.append_message("c1", msg("m1", "peer", 1), ctx(None));
        assert_eq!(store.chat("c1").unwrap().unread_count, 1);

        store.append_message("c1", msg("m2", ME, 2), ctx(None));
        assert_eq!(store.chat("c1").unwrap().unread_count, 1);

        store.set_unread("c1", 0);
        store.append_message("c1", msg("m3", "peer", 3), ctx(Some("c1")));
        assert_eq!(store.chat("c1").unwrap().unread_count, 0);

        store.append_message("c1", msg("m4", "peer", 4), ctx(Some("other")));
        assert_eq!(store.chat("c1").unwrap().unread_count, 1);
    }

    #[test]
    fn duplicate_append_is_a_no_op() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![msg("m1", "peer", 1)]));
        assert_eq!(
            store.append_message("c1", msg("m1", "peer", 1), ctx(None)),
            AppendOutcome::Duplicate
        );
        assert_eq!(store.chat("c1").unwrap().messages.len(), 1);
        assert_eq!(store.chat("c1").unwrap().unread_count, 0);
        assert_eq!(
            store.append_message("nope", msg("m9", "peer", 1), ctx(None)),
            AppendOutcome::UnknownChat
        );
    }

    #[test]
    fn deletion_is_idempotent() {
        let mut store = MessageStore::default();
        store.upsert_chats(vec![
            chat("c1", vec![msg("m1", "peer", 1), msg("m2", "peer", 2)]),
            chat("c2", vec![]),
        ]);
        assert!(store.remove_message("c1", "m1").is_some());
        assert!(store.remove_message("c1", "m1").is_none());
        assert!(store.remove_message("c1", "never").is_none());
        assert!(store.remove_message("gone", "m2").is_none());
        assert_eq!(ids(&store, "c1"), vec!["m2"]);

        assert!(store.remove_chat("c2").is_some());
        assert!(store.remove_chat("c2").is_none());
        assert!(store.contains_chat("c1"));
    }

    #[test]
    fn confirm_swaps_provisional_id() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![msg("m1", "peer", 1)]));
        let mut pending = msg("local:1", ME, 5);
        pending.status = MessageStatus::Pending;
        store.append_message("c1", pending, ctx(Some("c1")));

        assert!(store.replace_message(
            "c1",
            "local:1",
            MessagePatch::Status(MessageStatus::Error {
                reason: "offline".into()
            })
        ));
        assert!(store.message("c1", "local:1").unwrap().status.is_error());

        let confirmed = msg("m42", ME, 4);
        assert!(store.replace_message("c1", "local:1", MessagePatch::Confirm(confirmed)));
        assert_eq!(ids(&store, "c1"), vec!["m1", "m42"]);
        assert!(!store.replace_message("c1", "local:1", MessagePatch::Confirm(msg("m43", ME, 6))));
        assert_eq!(ids(&store, "c1"), vec!["m1", "m42"]);
    }

    #[test]
    fn confirm_after_echo_keeps_single_copy() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![]));
        let mut pending = msg("local:1", ME, 5);
        pending.status = MessageStatus::Pending;
        store.append_message("c1", pending, ctx(None));
        store.append_message("c1", msg("m42", ME, 5), ctx(None));

        assert!(store.replace_message("c1", "local:1", MessagePatch::Confirm(msg("m42", ME, 5))));
        assert_eq!(ids(&store, "c1"), vec!["m42"]);
    }

    #[test]
    fn newest_page_keeps_local_and_live_messages() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![msg("stale", "peer", 1)]));
        let mut failed = msg("local:9", ME, 20);
        failed.status = MessageStatus::Error { reason: "x".into() };
        store.append_message("c1", failed, ctx(None));
        store.append_message("c1", msg("live", "peer", 30), ctx(None));
        store.append_message("c1", msg("deleted", "peer", 40), ctx(None));

        store.replace_messages(
            "c1",
            vec![msg("m3", "peer", 15), msg("m2", "peer", 10), msg("m3", "peer", 15)],
            &HashSet::from(["live".to_string()]),
        );
        assert_eq!(ids(&store, "c1"), vec!["m2", "m3", "local:9", "live"]);
    }

    #[test]
    fn empty_newest_page_clears_sent_history() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![msg("m1", "peer", 1), msg("m5", "peer", 5)]));
        let mut pending = msg("local:1", ME, 6);
        pending.status = MessageStatus::Pending;
        store.append_message("c1", pending, ctx(None));

        store.replace_messages("c1", vec![], &HashSet::new());
        assert_eq!(ids(&store, "c1"), vec!["local:1"]);
    }

    #[test]
    fn upsert_keeps_local_history_and_unread() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![msg("m1", "peer", 1)]));
        store.append_message("c1", msg("m2", "peer", 2), ctx(None));

        let mut refreshed = chat("c1", vec![msg("m2", "peer", 2)]);
        refreshed.name = Some("renamed".into());
        refreshed.unread_count = 9;
        store.upsert_chats(vec![refreshed]);

        let c = store.chat("c1").unwrap();
        assert_eq!(c.name.as_deref(), Some("renamed"));
        assert_eq!(c.unread_count, 1);
        assert_eq!(ids(&store, "c1"), vec!["m1", "m2"]);
    }

    #[test]
    fn one_on_one_never_keeps_a_single_participant() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![]));
        assert_eq!(store.remove_participant("c1", "stranger"), ParticipantRemoval::NoOp);
        assert_eq!(store.remove_participant("c1", "peer"), ParticipantRemoval::ChatRemoved);
        assert!(!store.contains_chat("c1"));
        assert_eq!(store.remove_participant("c1", "peer"), ParticipantRemoval::NoOp);

        let mut group = chat("g1", vec![]);
        group.kind = ChatKind::Group;
        group.participants.push(participant("third"));
        store.upsert_chat(group);
        assert_eq!(store.remove_participant("g1", "third"), ParticipantRemoval::Removed);
        assert_eq!(store.chat("g1").unwrap().participants.len(), 2);
    }

    #[test]
    fn pending_echo_matches_oldest_equal_message() {
        let mut store = MessageStore::default();
        store.upsert_chat(chat("c1", vec![]));
        for (id, ts) in [("local:a", 1), ("local:b", 2)] {
            let mut m = msg(id, ME, ts);
            m.content = Some("hello".into());
            m.status = MessageStatus::Pending;
            store.append_message("c1", m, ctx(None));
        }
        let mut echo = msg("m1", ME, 3);
        echo.content = Some("hello".into());
        assert_eq!(store.find_pending_echo("c1", &echo).as_deref(), Some("local:a"));

        echo.content = Some("different".into());
        assert!(store.find_pending_echo("c1", &echo).is_none());
    }

    #[test]
    fn chat_list_order_follows_latest_activity() {
        let mut store = MessageStore::default();
        store.upsert_chats(vec![
            chat("quiet", vec![]),
            chat("old", vec![msg("m1", "peer", 1)]),
            chat("new", vec![msg("m2", "peer", 2)]),
        ]);
        let order: Vec<&str> = store
            .chats_by_recent_activity()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(order, vec!["new", "old", "quiet"]);
    }
}
