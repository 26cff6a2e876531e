// Inbound push events, applied strictly in arrival order. Correctness under
// reordering comes from the store operations being idempotent and
// order-tolerant, not from buffering here.

use super::store::{AppendContext, AppendOutcome, MessagePatch, ParticipantRemoval};
use super::AppCore;
use crate::model::Message;
use crate::push::PushEvent;
use crate::updates::InternalEvent;

impl AppCore {
    pub(super) fn handle_push_event(&mut self, event: PushEvent) {
        if !self.is_logged_in() {
            tracing::debug!(event = event.name(), "push event without a session, dropped");
            return;
        }
        let changed = match event {
            PushEvent::NewMessage(message) => self.apply_new_message(message),
            PushEvent::DeleteMessage {
                chat_id,
                message_id,
            } => self.store.remove_message(&chat_id, &message_id).is_some(),
            PushEvent::ChatDeleted { chat_id } | PushEvent::GroupDeleted { chat_id } => {
                if self.store.contains_chat(&chat_id) && self.read_state.is_active(&chat_id) {
                    self.state.toast = Some("This chat was deleted".to_string());
                }
                self.drop_chat_locally(&chat_id)
            }
            PushEvent::GroupLeft { chat_id, user_id } => self.apply_group_left(&chat_id, &user_id),
            PushEvent::PresenceSnapshot(snapshot) => {
                self.presence.set_bulk_presence(snapshot);
                true
            }
            PushEvent::UserOnline { user_id } => self.presence.set_online(&user_id, true),
            PushEvent::UserOffline { user_id } => self.presence.set_online(&user_id, false),
            PushEvent::Typing { chat_id, user_id } => {
                if self.viewing_user_id() == Some(user_id.as_str()) {
                    return;
                }
                let token = self.presence.start_typing(&chat_id, &user_id);
                self.schedule(
                    self.config.typing_expiry(),
                    InternalEvent::TypingExpired {
                        chat_id,
                        user_id,
                        token,
                    },
                );
                true
            }
            PushEvent::StopTyping { chat_id, user_id } => {
                self.presence.stop_typing(&chat_id, &user_id)
            }
            PushEvent::Notification {
                event,
                payload_json,
            } => {
                self.emit_notification(event, payload_json);
                false
            }
        };
        if changed {
            self.commit();
        }
    }

    fn apply_new_message(&mut self, message: Message) -> bool {
        let Some(viewer) = self.viewing_user_id().map(str::to_string) else {
            return false;
        };
        let chat_id = message.chat_id.clone();
        if !self.store.contains_chat(&chat_id) {
            tracing::info!(%chat_id, message_id = %message.id, "message for unknown chat, refreshing chats");
            self.refresh_chats();
            return false;
        }
        if self.store.contains_message(&chat_id, &message.id) {
            tracing::debug!(%chat_id, message_id = %message.id, "echo of known message ignored");
            return false;
        }

        if message.sender_id == viewer {
            if let Some(provisional_id) = self.store.find_pending_echo(&chat_id, &message) {
                tracing::info!(%chat_id, %provisional_id, message_id = %message.id, "send: confirmed by echo");
                self.outbox.resolve(&provisional_id);
                self.read_state.note_live_message(&chat_id, &message.id);
                return self
                    .store
                    .replace_message(&chat_id, &provisional_id, MessagePatch::Confirm(message));
            }
        }

        let sender_id = message.sender_id.clone();
        let message_id = message.id.clone();
        let outcome = self.store.append_message(
            &chat_id,
            message,
            AppendContext {
                viewing_user_id: &viewer,
                active_chat_id: self.read_state.active_chat_id(),
            },
        );
        if outcome != AppendOutcome::Inserted {
            return false;
        }
        self.read_state.note_live_message(&chat_id, &message_id);
        // A message ends the sender's typing indicator.
        self.presence.stop_typing(&chat_id, &sender_id);
        if sender_id != viewer && self.read_state.is_active(&chat_id) {
            self.send_read_receipt(&chat_id);
        }
        true
    }

    fn apply_group_left(&mut self, chat_id: &str, user_id: &str) -> bool {
        if self.viewing_user_id() == Some(user_id) {
            return self.drop_chat_locally(chat_id);
        }
        match self.store.remove_participant(chat_id, user_id) {
            ParticipantRemoval::Removed => {
                self.presence.stop_typing(chat_id, user_id);
                true
            }
            ParticipantRemoval::ChatRemoved => {
                self.drop_chat_locally(chat_id);
                true
            }
            ParticipantRemoval::NoOp => false,
        }
    }
}
