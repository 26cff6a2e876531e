// Chat list refresh, chat creation and membership changes.

use std::collections::{BTreeSet, HashSet};

use super::store::ParticipantRemoval;
use super::AppCore;
use crate::api::ApiError;
use crate::model::{Chat, ChatKind};
use crate::updates::InternalEvent;

const MIN_GROUP_INVITEES: usize = 2;

impl AppCore {
    pub(super) fn refresh_chats(&mut self) {
        if self.state.busy.fetching_chats {
            return;
        }
        let epoch = self.session_epoch;
        let spawned = self.spawn_api(move |api, auth| async move {
            let result = api.fetch_chats(&auth).await;
            InternalEvent::ChatsFetched { epoch, result }
        });
        if spawned {
            self.chat_list_baseline = self.store.chat_ids();
            self.set_busy(|b| b.fetching_chats = true);
        }
    }

    pub(super) fn chats_fetched(&mut self, result: Result<Vec<Chat>, ApiError>) {
        self.state.busy.fetching_chats = false;
        match result {
            Ok(chats) => {
                tracing::info!(count = chats.len(), "chats fetched");
                let pending_active = self
                    .read_state
                    .active_chat_id()
                    .filter(|id| !self.store.contains_chat(id))
                    .map(str::to_string);
                let listed: HashSet<String> = chats.iter().map(|c| c.id.clone()).collect();
                self.store.upsert_chats(chats);
                self.prune_unlisted_chats(&listed);
                // An active chat that only just became known still needs its history.
                if let Some(chat_id) = pending_active {
                    if self.store.contains_chat(&chat_id) {
                        self.mark_chat_read(&chat_id);
                        self.fetch_newest_messages(&chat_id);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%e, "chats fetch failed");
                self.state.toast = Some(format!("Could not load chats: {}", e.user_message()));
            }
        }
        self.commit();
    }

    /// Drops chats that were known when the fetch was issued but are gone
    /// from the server's list (deleted or left while offline). Chats still
    /// holding unconfirmed messages stay until those resolve.
    fn prune_unlisted_chats(&mut self, listed: &HashSet<String>) {
        let baseline = std::mem::take(&mut self.chat_list_baseline);
        let gone: Vec<String> = baseline
            .into_iter()
            .filter(|id| !listed.contains(id) && !self.store.has_unconfirmed(id))
            .collect();
        for chat_id in gone {
            tracing::info!(%chat_id, "chat no longer listed, removing");
            let was_open = self.read_state.is_active(&chat_id);
            self.drop_chat_locally(&chat_id);
            if was_open {
                self.state.toast = Some("This chat is no longer available".to_string());
            }
        }
    }

    pub(super) fn create_chat(&mut self, peer_user_id: String) {
        let peer_user_id = peer_user_id.trim().to_string();
        let Some(viewer) = self.viewing_user_id().map(str::to_string) else {
            return;
        };
        if peer_user_id.is_empty() || peer_user_id == viewer {
            self.toast("Choose someone to chat with");
            return;
        }
        let existing = self
            .store
            .chats_by_recent_activity()
            .into_iter()
            .find(|c| {
                c.kind == ChatKind::OneOnOne
                    && c.partner(&viewer).map(|p| p.user_id.as_str()) == Some(peer_user_id.as_str())
            })
            .map(|c| c.id.clone());
        if let Some(chat_id) = existing {
            self.open_chat_screen(&chat_id);
            self.after_navigation();
            return;
        }
        if self.state.busy.creating_chat {
            return;
        }
        let epoch = self.session_epoch;
        if self.spawn_api(move |api, auth| async move {
            let result = api.create_chat(&auth, &peer_user_id).await;
            InternalEvent::ChatCreated { epoch, result }
        }) {
            self.set_busy(|b| b.creating_chat = true);
        }
    }

    pub(super) fn create_group_chat(&mut self, name: String, participant_ids: Vec<String>) {
        let name = name.trim().to_string();
        let viewer = self.viewing_user_id().unwrap_or_default().to_string();
        let invitees: Vec<String> = participant_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && *id != viewer)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if name.is_empty() {
            self.toast("Group name is required");
            return;
        }
        if invitees.len() < MIN_GROUP_INVITEES {
            self.toast("Select at least 2 people for a group");
            return;
        }
        if self.state.busy.creating_chat {
            return;
        }
        let epoch = self.session_epoch;
        if self.spawn_api(move |api, auth| async move {
            let result = api.create_group_chat(&auth, &name, &invitees).await;
            InternalEvent::ChatCreated { epoch, result }
        }) {
            self.set_busy(|b| b.creating_chat = true);
        }
    }

    pub(super) fn chat_created(&mut self, result: Result<Chat, ApiError>) {
        self.state.busy.creating_chat = false;
        match result {
            Ok(chat) => {
                let chat_id = chat.id.clone();
                tracing::info!(%chat_id, kind = ?chat.kind, "chat created");
                self.store.upsert_chat(chat);
                self.open_chat_screen(&chat_id);
                self.after_navigation();
            }
            Err(e) => {
                tracing::warn!(%e, "create chat failed");
                self.toast(format!("Could not create chat: {}", e.user_message()));
            }
        }
    }

    pub(super) fn add_participants(&mut self, chat_id: String, user_ids: Vec<String>) {
        let Some(chat) = self.store.chat(&chat_id) else {
            return;
        };
        if chat.kind != ChatKind::Group {
            self.toast("Members can only be added to groups");
            return;
        }
        let new_ids: Vec<String> = user_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && chat.participant_by_user(id).is_none())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if new_ids.is_empty() {
            return;
        }
        let epoch = self.session_epoch;
        let chat_id_owned = chat_id.clone();
        self.spawn_api(move |api, auth| async move {
            let result = api.add_participants(&auth, &chat_id_owned, &new_ids).await;
            InternalEvent::ParticipantsAdded {
                epoch,
                chat_id: chat_id_owned,
                result,
            }
        });
        self.set_busy(|b| b.updating_members = true);
    }

    pub(super) fn participants_added(&mut self, chat_id: &str, result: Result<Chat, ApiError>) {
        self.state.busy.updating_members = false;
        match result {
            Ok(chat) => {
                if chat.id != chat_id {
                    tracing::warn!(%chat_id, returned = %chat.id, "add participants returned another chat");
                }
                self.store.upsert_chat(chat);
            }
            Err(e) => {
                tracing::warn!(%chat_id, %e, "add participants failed");
                self.state.toast = Some(format!("Could not add members: {}", e.user_message()));
            }
        }
        self.commit();
    }

    pub(super) fn remove_participant(&mut self, chat_id: String, participant_id: String) {
        let known = self
            .store
            .chat(&chat_id)
            .map(|c| c.participants.iter().any(|p| p.id == participant_id))
            .unwrap_or(false);
        if !known {
            return;
        }
        let epoch = self.session_epoch;
        let chat_id_owned = chat_id.clone();
        self.spawn_api(move |api, auth| async move {
            let result = api
                .remove_participant(&auth, &chat_id_owned, &participant_id)
                .await;
            InternalEvent::ParticipantRemoved {
                epoch,
                chat_id: chat_id_owned,
                participant_id,
                result,
            }
        });
        self.set_busy(|b| b.updating_members = true);
    }

    pub(super) fn participant_removed(
        &mut self,
        chat_id: &str,
        participant_id: &str,
        result: Result<(), ApiError>,
    ) {
        self.state.busy.updating_members = false;
        match result {
            Ok(()) => {
                let user_id = self.store.chat(chat_id).and_then(|c| {
                    c.participants
                        .iter()
                        .find(|p| p.id == participant_id)
                        .map(|p| p.user_id.clone())
                });
                if let Some(user_id) = user_id {
                    if self.store.remove_participant(chat_id, &user_id)
                        == ParticipantRemoval::ChatRemoved
                    {
                        self.drop_chat_locally(chat_id);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%chat_id, %participant_id, %e, "remove participant failed");
                self.state.toast = Some(format!("Could not remove member: {}", e.user_message()));
            }
        }
        self.commit();
    }

    /// Leave a group (`leaving`) or delete a chat outright.
    pub(super) fn exit_chat(&mut self, chat_id: String, leaving: bool) {
        let Some(kind) = self.store.chat(&chat_id).map(|c| c.kind) else {
            return;
        };
        if leaving && kind != ChatKind::Group {
            self.toast("Only group chats can be left");
            return;
        }
        if self.state.busy.deleting_chat {
            return;
        }
        let epoch = self.session_epoch;
        let chat_id_owned = chat_id.clone();
        self.spawn_api(move |api, auth| async move {
            let result = if leaving {
                api.leave_chat(&auth, &chat_id_owned).await
            } else {
                api.delete_chat(&auth, &chat_id_owned, kind).await
            };
            InternalEvent::ChatExitResult {
                epoch,
                chat_id: chat_id_owned,
                leaving,
                result,
            }
        });
        self.set_busy(|b| b.deleting_chat = true);
    }

    pub(super) fn chat_exit_result(
        &mut self,
        chat_id: &str,
        leaving: bool,
        result: Result<(), ApiError>,
    ) {
        self.state.busy.deleting_chat = false;
        match result {
            Ok(()) => {
                tracing::info!(%chat_id, leaving, "chat exited");
                self.drop_chat_locally(chat_id);
            }
            Err(e) => {
                tracing::warn!(%chat_id, leaving, %e, "chat exit failed");
                let verb = if leaving { "leave" } else { "delete" };
                self.state.toast = Some(format!("Could not {verb} chat: {}", e.user_message()));
            }
        }
        self.commit();
    }

    /// Navigates away from the chat if it is on screen, then removes it and
    /// everything keyed by it. Returns true if anything changed.
    pub(super) fn drop_chat_locally(&mut self, chat_id: &str) -> bool {
        let navigated = self.navigate_away_from_chat(chat_id);
        if navigated {
            self.sync_active_chat_to_router();
        }
        let removed = self.store.remove_chat(chat_id).is_some();
        self.presence.clear_chat(chat_id);
        self.outbox.drop_chat(chat_id);
        self.local_typing.flush(chat_id);
        self.read_state.forget(chat_id);
        if removed {
            tracing::info!(%chat_id, "chat removed");
        }
        removed || navigated
    }
}
