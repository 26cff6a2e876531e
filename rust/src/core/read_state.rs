// Active chat, unread transitions and history paging.

use std::collections::{HashMap, HashSet};

use super::AppCore;
use crate::api::ApiError;
use crate::model::Message;
use crate::push::{self, outbound};
use crate::updates::InternalEvent;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PageCursor {
    next_page: u32,
    exhausted: bool,
    /// Page currently being fetched.
    in_flight: Option<u32>,
    /// Ids that reached the store while the newest page was in flight. The
    /// page may predate them, so replacing history must not drop them.
    live: HashSet<String>,
}

#[derive(Debug, Default)]
pub(crate) struct ReadState {
    active_chat_id: Option<String>,
    cursors: HashMap<String, PageCursor>,
}

impl ReadState {
    pub(crate) fn active_chat_id(&self) -> Option<&str> {
        self.active_chat_id.as_deref()
    }

    pub(crate) fn is_active(&self, chat_id: &str) -> bool {
        self.active_chat_id.as_deref() == Some(chat_id)
    }

    /// Returns the previous active chat.
    fn set_active(&mut self, chat_id: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.active_chat_id, chat_id)
    }

    pub(crate) fn can_load_older(&self, chat_id: &str) -> bool {
        self.cursors
            .get(chat_id)
            .map(|c| !c.exhausted && c.next_page >= 2)
            .unwrap_or(false)
    }

    pub(crate) fn is_loading(&self, chat_id: &str) -> bool {
        self.cursors
            .get(chat_id)
            .is_some_and(|c| c.in_flight.is_some())
    }

    fn is_any_loading(&self) -> bool {
        self.cursors.values().any(|c| c.in_flight.is_some())
    }

    /// Claims the next page to fetch, or `None` when a fetch is outstanding
    /// or there is nothing older.
    fn begin_fetch(&mut self, chat_id: &str, older: bool) -> Option<u32> {
        if !older {
            let cursor = self
                .cursors
                .entry(chat_id.to_string())
                .or_insert_with(|| PageCursor {
                    next_page: 1,
                    ..PageCursor::default()
                });
            if cursor.in_flight.is_some() {
                return None;
            }
            cursor.in_flight = Some(1);
            cursor.live.clear();
            return Some(1);
        }
        let cursor = self.cursors.get_mut(chat_id)?;
        if cursor.in_flight.is_some() || cursor.exhausted || cursor.next_page < 2 {
            return None;
        }
        cursor.in_flight = Some(cursor.next_page);
        Some(cursor.next_page)
    }

    /// Remembers a message stored while the newest page is outstanding.
    pub(crate) fn note_live_message(&mut self, chat_id: &str, message_id: &str) {
        if let Some(cursor) = self.cursors.get_mut(chat_id) {
            if cursor.in_flight == Some(1) {
                cursor.live.insert(message_id.to_string());
            }
        }
    }

    /// Releases the fetch and returns the ids noted while it was in flight.
    fn finish_fetch(
        &mut self,
        chat_id: &str,
        page: u32,
        received: Option<usize>,
        limit: u32,
    ) -> HashSet<String> {
        let Some(cursor) = self.cursors.get_mut(chat_id) else {
            return HashSet::new();
        };
        cursor.in_flight = None;
        if let Some(received) = received {
            cursor.next_page = page + 1;
            cursor.exhausted = received < limit as usize;
        }
        std::mem::take(&mut cursor.live)
    }

    pub(crate) fn forget(&mut self, chat_id: &str) {
        self.cursors.remove(chat_id);
        if self.is_active(chat_id) {
            self.active_chat_id = None;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.active_chat_id = None;
        self.cursors.clear();
    }
}

impl AppCore {
    /// The active chat follows the top of the router.
    pub(super) fn sync_active_chat_to_router(&mut self) {
        let top = self
            .state
            .router
            .screen_stack
            .last()
            .and_then(|s| s.chat_id())
            .map(str::to_string);
        if top.as_deref() == self.read_state.active_chat_id() {
            return;
        }
        let previous = self.read_state.set_active(top.clone());
        if let Some(previous) = previous {
            if self.local_typing.flush(&previous) {
                self.emit_push(outbound::STOP_TYPING, push::chat_payload(&previous));
            }
        }
        let Some(chat_id) = top else {
            return;
        };
        tracing::debug!(%chat_id, "active chat changed");
        if self.store.contains_chat(&chat_id) {
            self.mark_chat_read(&chat_id);
            self.fetch_newest_messages(&chat_id);
        } else {
            // Opened before the chat list knew about it (e.g. from a notification).
            self.refresh_chats();
        }
    }

    /// Unread to zero plus best-effort notifications; failures only log.
    pub(super) fn mark_chat_read(&mut self, chat_id: &str) {
        self.store.set_unread(chat_id, 0);
        if let Some(session) = self.session.as_ref() {
            let api = self.chat_api();
            let auth = session.access_token.clone();
            let chat_id_owned = chat_id.to_string();
            self.runtime.spawn(async move {
                if let Err(e) = api.mark_chat_read(&auth, &chat_id_owned).await {
                    tracing::debug!(chat_id = %chat_id_owned, %e, "mark read failed");
                }
            });
        }
        self.send_read_receipt(chat_id);
    }

    pub(super) fn send_read_receipt(&self, chat_id: &str) {
        if self.config.emit_read_receipts() {
            self.emit_push(outbound::MARK_CHAT_READ, push::chat_payload(chat_id));
        }
    }

    pub(super) fn fetch_newest_messages(&mut self, chat_id: &str) {
        if let Some(page) = self.read_state.begin_fetch(chat_id, false) {
            self.fetch_messages_page(chat_id, page);
        }
    }

    pub(super) fn load_older_messages(&mut self, chat_id: &str) {
        match self.read_state.begin_fetch(chat_id, true) {
            Some(page) => self.fetch_messages_page(chat_id, page),
            None => tracing::debug!(%chat_id, "no older page to load"),
        }
    }

    fn fetch_messages_page(&mut self, chat_id: &str, page: u32) {
        let epoch = self.session_epoch;
        let limit = self.config.messages_page_size();
        let chat_id_owned = chat_id.to_string();
        let spawned = self.spawn_api(move |api, auth| async move {
            let result = api.fetch_messages(&auth, &chat_id_owned, page, limit).await;
            InternalEvent::MessagesFetched {
                epoch,
                chat_id: chat_id_owned,
                page,
                result,
            }
        });
        if spawned {
            self.set_busy(|b| b.loading_messages = true);
        } else {
            self.read_state.finish_fetch(chat_id, page, None, limit);
        }
    }

    pub(super) fn messages_fetched(
        &mut self,
        chat_id: &str,
        page: u32,
        result: Result<Vec<Message>, ApiError>,
    ) {
        let limit = self.config.messages_page_size();
        let received = result.as_ref().ok().map(Vec::len);
        let live = self.read_state.finish_fetch(chat_id, page, received, limit);
        self.state.busy.loading_messages = self.read_state.is_any_loading();
        match result {
            Ok(messages) => {
                tracing::debug!(%chat_id, page, count = messages.len(), "messages fetched");
                if page <= 1 {
                    self.store.replace_messages(chat_id, messages, &live);
                } else {
                    self.store.merge_messages(chat_id, messages);
                }
            }
            Err(e) => {
                tracing::warn!(%chat_id, page, %e, "messages fetch failed");
                self.state.toast = Some("Could not load messages".to_string());
            }
        }
        self.commit();
    }
}
