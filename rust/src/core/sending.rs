// Optimistic send pipeline, composer typing signal and message deletion.

use super::outbox::optimistic_message;
use super::store::{AppendContext, MessagePatch};
use super::AppCore;
use crate::api::{ApiError, CreateMessageRequest, OutgoingAttachment};
use crate::model::{is_provisional_id, new_provisional_id, Message, MessageStatus};
use crate::push::{self, outbound};
use crate::state::now_millis;
use crate::updates::InternalEvent;

impl AppCore {
    pub(super) fn composer_changed(&mut self, chat_id: &str, text: &str) {
        if !self.store.contains_chat(chat_id) {
            return;
        }
        if text.trim().is_empty() {
            self.flush_local_typing(chat_id);
            return;
        }
        self.emit_push(outbound::TYPING, push::chat_payload(chat_id));
        let token = self.local_typing.note_input(chat_id);
        self.schedule(
            self.config.stop_typing_debounce(),
            InternalEvent::StopTypingDue {
                chat_id: chat_id.to_string(),
                token,
            },
        );
    }

    fn flush_local_typing(&mut self, chat_id: &str) {
        if self.local_typing.flush(chat_id) {
            self.emit_push(outbound::STOP_TYPING, push::chat_payload(chat_id));
        }
    }

    pub(super) fn send_message(
        &mut self,
        chat_id: String,
        content: String,
        attachments: Vec<OutgoingAttachment>,
    ) {
        let content = content.trim().to_string();
        if content.is_empty() && attachments.is_empty() {
            return;
        }
        let Some(sender_id) = self.viewing_user_id().map(str::to_string) else {
            return;
        };
        if !self.store.contains_chat(&chat_id) {
            self.toast("Chat not found");
            return;
        }
        self.flush_local_typing(&chat_id);

        let provisional_id = new_provisional_id();
        let request = CreateMessageRequest {
            chat_id: chat_id.clone(),
            content: (!content.is_empty()).then_some(content),
            attachments,
        };
        let message = optimistic_message(&provisional_id, &sender_id, &request, now_millis());
        tracing::info!(%chat_id, %provisional_id, attachments = request.attachments.len(), "send: queued");

        self.store.append_message(
            &chat_id,
            message,
            AppendContext {
                viewing_user_id: &sender_id,
                active_chat_id: self.read_state.active_chat_id(),
            },
        );
        self.outbox.track(&provisional_id, request);
        self.start_send_attempt(&chat_id, &provisional_id);
        self.commit();
    }

    fn start_send_attempt(&mut self, chat_id: &str, provisional_id: &str) {
        let Some(request) = self.outbox.begin_attempt(provisional_id) else {
            tracing::debug!(%provisional_id, "send: attempt already in flight");
            return;
        };
        let epoch = self.session_epoch;
        let chat_id = chat_id.to_string();
        let provisional_id = provisional_id.to_string();
        self.spawn_api(move |api, auth| async move {
            let result = api.create_message(&auth, &request).await;
            InternalEvent::SendMessageResult {
                epoch,
                chat_id,
                provisional_id,
                result,
            }
        });
    }

    pub(super) fn send_message_result(
        &mut self,
        chat_id: &str,
        provisional_id: &str,
        result: Result<Message, ApiError>,
    ) {
        match result {
            Ok(confirmed) => {
                if !self.outbox.resolve(provisional_id) {
                    // The push echo already reconciled this message.
                    tracing::debug!(%provisional_id, "send: confirmation after echo, ignored");
                    return;
                }
                tracing::info!(%chat_id, %provisional_id, message_id = %confirmed.id, "send: confirmed");
                self.read_state.note_live_message(chat_id, &confirmed.id);
                if !self
                    .store
                    .replace_message(chat_id, provisional_id, MessagePatch::Confirm(confirmed))
                {
                    tracing::debug!(%provisional_id, "send: provisional message gone");
                    return;
                }
                self.commit();
            }
            Err(e) => {
                let Some(attempts) = self.outbox.mark_failed(provisional_id) else {
                    return;
                };
                tracing::warn!(%chat_id, %provisional_id, attempts, %e, "send: failed");
                self.store.replace_message(
                    chat_id,
                    provisional_id,
                    MessagePatch::Status(MessageStatus::Error {
                        reason: e.user_message(),
                    }),
                );
                self.commit();
            }
        }
    }

    pub(super) fn retry_message(&mut self, chat_id: &str, message_id: &str) {
        let retryable = self
            .store
            .message(chat_id, message_id)
            .map(|m| m.status.is_error())
            .unwrap_or(false);
        if !retryable {
            tracing::warn!(%chat_id, %message_id, "retry: message is not in an error state");
            return;
        }
        self.store
            .replace_message(chat_id, message_id, MessagePatch::Status(MessageStatus::Pending));
        self.start_send_attempt(chat_id, message_id);
        self.commit();
    }

    pub(super) fn discard_message(&mut self, chat_id: &str, message_id: &str) {
        let discardable = self
            .store
            .message(chat_id, message_id)
            .map(|m| m.status.is_error())
            .unwrap_or(false);
        if !discardable {
            tracing::warn!(%chat_id, %message_id, "discard: message is not in an error state");
            return;
        }
        self.store.remove_message(chat_id, message_id);
        self.outbox.resolve(message_id);
        self.commit();
    }

    /// Optimistic removal; a failed remote delete puts the message back.
    pub(super) fn delete_message(&mut self, chat_id: &str, message_id: &str) {
        let Some(message) = self.store.message(chat_id, message_id) else {
            return;
        };
        if is_provisional_id(&message.id) {
            if message.status.is_pending() {
                self.toast("Message is still sending");
            } else {
                self.discard_message(chat_id, message_id);
            }
            return;
        }
        let Some(message) = self.store.remove_message(chat_id, message_id) else {
            return;
        };
        let epoch = self.session_epoch;
        let chat_id_owned = chat_id.to_string();
        self.spawn_api(move |api, auth| async move {
            let result = api.delete_message(&auth, &message.id).await;
            InternalEvent::DeleteMessageResult {
                epoch,
                chat_id: chat_id_owned,
                message,
                result,
            }
        });
        self.commit();
    }

    pub(super) fn delete_message_result(
        &mut self,
        chat_id: &str,
        message: Message,
        result: Result<(), ApiError>,
    ) {
        match result {
            Ok(()) => tracing::debug!(%chat_id, message_id = %message.id, "delete: confirmed"),
            Err(e) => {
                tracing::warn!(%chat_id, message_id = %message.id, %e, "delete: failed, restoring");
                self.store.restore_message(message);
                self.state.toast = Some(format!("Could not delete message: {}", e.user_message()));
                self.commit();
            }
        }
    }
}
