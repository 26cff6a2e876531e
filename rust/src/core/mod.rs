mod config;
mod connection;
mod membership;
mod outbox;
mod presence;
mod read_state;
mod reconciler;
mod sending;
mod session;
mod storage;
mod store;

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;

use crate::actions::AppAction;
use crate::api::{HttpChatApi, SharedChatApi};
use crate::push::PushTransport;
use crate::state::{AppState, BusyState, Screen};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub(crate) use config::default_app_config_json;

use connection::ConnectionSupervisor;
use outbox::Outbox;
use presence::{LocalTypingDebounce, PresenceTracker};
use read_state::ReadState;
use store::MessageStore;

pub(crate) type SharedChatApiOverride = Arc<RwLock<Option<SharedChatApi>>>;
pub(crate) type SharedPushTransport = Arc<RwLock<Option<Arc<dyn PushTransport>>>>;

struct Session {
    user_id: String,
    access_token: String,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    default_chat_api: SharedChatApi,
    chat_api_override: SharedChatApiOverride,
    push_transport: SharedPushTransport,

    session: Option<Session>,
    // Bumped on every session start/stop; remote results from older epochs are dropped.
    session_epoch: u64,

    store: MessageStore,
    // Chat ids known when the outstanding chat list fetch was issued.
    chat_list_baseline: HashSet<String>,
    presence: PresenceTracker,
    local_typing: LocalTypingDebounce,
    outbox: Outbox,
    read_state: ReadState,
    connection: ConnectionSupervisor,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        chat_api_override: SharedChatApiOverride,
        push_transport: SharedPushTransport,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");
        let api_base_url = config.api_base_url();
        tracing::info!(%api_base_url, "core: config loaded");
        let connection = ConnectionSupervisor::new(
            config.reconnect_base_delay(),
            config.max_reconnect_attempts(),
        );

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            default_chat_api: Arc::new(HttpChatApi::new(&api_base_url)),
            chat_api_override,
            push_transport,
            session: None,
            session_epoch: 0,
            store: MessageStore::default(),
            chat_list_baseline: HashSet::new(),
            presence: PresenceTracker::default(),
            local_typing: LocalTypingDebounce::default(),
            outbox: Outbox::default(),
            read_state: ReadState::default(),
            connection,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Re-project the store into the UI state and publish it.
    fn commit(&mut self) {
        self.refresh_views();
        self.emit_state();
    }

    fn emit_notification(&mut self, event: String, payload_json: String) {
        let rev = self.next_rev();
        // Keep snapshot rev in sync with the update stream even though this is a side-effect update.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::NotificationForwarded {
            rev,
            event,
            payload_json,
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI clears it, so a resync from state() still shows it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_state();
        }
    }

    fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    fn viewing_user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }

    fn is_current_epoch(&self, epoch: u64) -> bool {
        self.session.is_some() && epoch == self.session_epoch
    }

    fn chat_api(&self) -> SharedChatApi {
        let slot = match self.chat_api_override.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        };
        slot.unwrap_or_else(|| self.default_chat_api.clone())
    }

    fn push_transport(&self) -> Option<Arc<dyn PushTransport>> {
        match self.push_transport.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    fn emit_push(&self, event: &str, payload_json: String) {
        match self.push_transport() {
            Some(transport) => transport.emit(event.to_string(), payload_json),
            None => tracing::debug!(event, "push: no transport, emission dropped"),
        }
    }

    /// Runs a remote call on the runtime and feeds its result back into the
    /// actor queue. Skipped without a session.
    fn spawn_api<F, Fut>(&self, call: F) -> bool
    where
        F: FnOnce(SharedChatApi, String) -> Fut,
        Fut: Future<Output = InternalEvent> + Send + 'static,
    {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        let fut = call(self.chat_api(), session.access_token.clone());
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let event = fut.await;
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
        true
    }

    /// Re-enqueues `event` after `delay`.
    fn schedule(&self, delay: Duration, event: InternalEvent) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    fn push_screen(&mut self, screen: Screen) {
        self.state.router.screen_stack.push(screen);
    }

    fn open_chat_screen(&mut self, chat_id: &str) {
        // Creating a chat from a compose screen lands in the chat, with back
        // returning to the chat list.
        if matches!(
            self.state.router.screen_stack.last(),
            Some(Screen::NewChat) | Some(Screen::NewGroupChat)
        ) {
            self.state.router.screen_stack.pop();
        }

        let screen = Screen::Chat {
            chat_id: chat_id.to_string(),
        };
        if self.state.router.screen_stack.last() != Some(&screen) {
            self.push_screen(screen);
        }
    }

    /// Drops every screen scoped to `chat_id`. Returns true if any was shown.
    fn navigate_away_from_chat(&mut self, chat_id: &str) -> bool {
        let before = self.state.router.screen_stack.len();
        self.state
            .router
            .screen_stack
            .retain(|s| s.chat_id() != Some(chat_id));
        before != self.state.router.screen_stack.len()
    }

    fn after_navigation(&mut self) {
        self.sync_active_chat_to_router();
        self.commit();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it can contain the access token.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::StartSession {
                user_id,
                access_token,
            } => self.start_session(user_id, access_token),
            AppAction::SetAccessToken { access_token } => self.set_access_token(access_token),
            AppAction::Logout => self.logout(),
            AppAction::Foregrounded => self.foregrounded(),
            AppAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_state();
                }
            }
            action if !self.is_logged_in() => {
                tracing::warn!(action = action.tag(), "ignored without a session");
            }
            AppAction::PushScreen { screen } => {
                self.push_screen(screen);
                self.after_navigation();
            }
            AppAction::UpdateScreenStack { stack } => {
                self.state.router.screen_stack = stack;
                self.after_navigation();
            }
            AppAction::OpenChat { chat_id } => {
                self.open_chat_screen(&chat_id);
                self.after_navigation();
            }
            AppAction::CloseChat => {
                while self
                    .state
                    .router
                    .screen_stack
                    .last()
                    .is_some_and(|s| s.chat_id().is_some())
                {
                    self.state.router.screen_stack.pop();
                }
                self.after_navigation();
            }
            AppAction::RefreshChats => self.refresh_chats(),
            AppAction::LoadOlderMessages { chat_id } => self.load_older_messages(&chat_id),
            AppAction::ComposerChanged { chat_id, text } => self.composer_changed(&chat_id, &text),
            AppAction::SendMessage {
                chat_id,
                content,
                attachments,
            } => self.send_message(chat_id, content, attachments),
            AppAction::RetryMessage {
                chat_id,
                message_id,
            } => self.retry_message(&chat_id, &message_id),
            AppAction::DiscardMessage {
                chat_id,
                message_id,
            } => self.discard_message(&chat_id, &message_id),
            AppAction::DeleteMessage {
                chat_id,
                message_id,
            } => self.delete_message(&chat_id, &message_id),
            AppAction::CreateChat { peer_user_id } => self.create_chat(peer_user_id),
            AppAction::CreateGroupChat {
                name,
                participant_ids,
            } => self.create_group_chat(name, participant_ids),
            AppAction::AddParticipants { chat_id, user_ids } => {
                self.add_participants(chat_id, user_ids)
            }
            AppAction::RemoveParticipant {
                chat_id,
                participant_id,
            } => self.remove_participant(chat_id, participant_id),
            AppAction::LeaveChat { chat_id } => self.exit_chat(chat_id, true),
            AppAction::DeleteChat { chat_id } => self.exit_chat(chat_id, false),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::PushEventReceived(event) => self.handle_push_event(event),
            InternalEvent::PushConnectionChanged(event) => self.handle_connection_event(event),
            InternalEvent::ReconnectDue { token } => self.reconnect_due(token),
            InternalEvent::TypingExpired {
                chat_id,
                user_id,
                token,
            } => {
                if self.presence.expire_typing(&chat_id, &user_id, token) {
                    tracing::debug!(%chat_id, %user_id, "typing expired");
                    self.commit();
                }
            }
            InternalEvent::StopTypingDue { chat_id, token } => {
                if self.local_typing.take_if_current(&chat_id, token) {
                    self.emit_push(
                        crate::push::outbound::STOP_TYPING,
                        crate::push::chat_payload(&chat_id),
                    );
                }
            }
            internal => self.handle_remote_result(internal),
        }
    }

    /// Completions of remote calls. Anything issued under an older session is dropped.
    fn handle_remote_result(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ChatsFetched { epoch, result } => {
                if self.is_current_epoch(epoch) {
                    self.chats_fetched(result);
                }
            }
            InternalEvent::MessagesFetched {
                epoch,
                chat_id,
                page,
                result,
            } => {
                if self.is_current_epoch(epoch) {
                    self.messages_fetched(&chat_id, page, result);
                }
            }
            InternalEvent::SendMessageResult {
                epoch,
                chat_id,
                provisional_id,
                result,
            } => {
                if self.is_current_epoch(epoch) {
                    self.send_message_result(&chat_id, &provisional_id, result);
                }
            }
            InternalEvent::DeleteMessageResult {
                epoch,
                chat_id,
                message,
                result,
            } => {
                if self.is_current_epoch(epoch) {
                    self.delete_message_result(&chat_id, message, result);
                }
            }
            InternalEvent::ChatCreated { epoch, result } => {
                if self.is_current_epoch(epoch) {
                    self.chat_created(result);
                }
            }
            InternalEvent::ParticipantsAdded {
                epoch,
                chat_id,
                result,
            } => {
                if self.is_current_epoch(epoch) {
                    self.participants_added(&chat_id, result);
                }
            }
            InternalEvent::ParticipantRemoved {
                epoch,
                chat_id,
                participant_id,
                result,
            } => {
                if self.is_current_epoch(epoch) {
                    self.participant_removed(&chat_id, &participant_id, result);
                }
            }
            InternalEvent::ChatExitResult {
                epoch,
                chat_id,
                leaving,
                result,
            } => {
                if self.is_current_epoch(epoch) {
                    self.chat_exit_result(&chat_id, leaving, result);
                }
            }
            other => tracing::debug!(event = ?other, "unhandled internal event"),
        }
    }
}
