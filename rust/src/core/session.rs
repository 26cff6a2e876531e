// Session lifecycle and push channel supervision.

use super::connection::ReconnectPlan;
use super::{AppCore, Session};
use crate::push::{outbound, PushConnectionEvent};
use crate::state::{AuthState, BusyState, ConnectionState, Screen};
use crate::updates::InternalEvent;

impl AppCore {
    pub(super) fn start_session(&mut self, user_id: String, access_token: String) {
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() || access_token.trim().is_empty() {
            self.toast("Missing credentials");
            return;
        }
        if self.session.is_some() {
            self.stop_session();
        }

        self.session_epoch += 1;
        tracing::info!(%user_id, epoch = self.session_epoch, "session started");
        self.session = Some(Session {
            user_id: user_id.clone(),
            access_token,
        });
        self.state.auth = AuthState::LoggedIn { user_id };
        self.state.router.default_screen = Screen::ChatList;
        self.state.router.screen_stack.clear();

        self.connection.start();
        self.request_connect();
        self.refresh_chats();
        self.commit();
    }

    /// Tears down everything tied to the session. Cold start always re-seeds
    /// from the REST collaborator, so nothing is kept.
    fn stop_session(&mut self) {
        if let Some(transport) = self.push_transport() {
            transport.disconnect();
        }
        self.connection.stop();
        self.session = None;
        self.session_epoch += 1;
        self.store.clear();
        self.chat_list_baseline.clear();
        self.presence.clear();
        self.local_typing.clear();
        self.outbox.clear();
        self.read_state.clear();
        // Flags of calls issued by the old session; their results are dropped.
        self.state.busy = BusyState::idle();
    }

    pub(super) fn logout(&mut self) {
        if self.session.is_some() {
            tracing::info!("session stopped");
            self.stop_session();
        }
        self.state.auth = AuthState::LoggedOut;
        self.state.router.default_screen = Screen::Login;
        self.state.router.screen_stack.clear();
        self.state.connection = ConnectionState::Idle;
        self.commit();
    }

    pub(super) fn set_access_token(&mut self, access_token: String) {
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("access token update without a session");
            return;
        };
        if access_token.trim().is_empty() || session.access_token == access_token {
            return;
        }
        session.access_token = access_token;
        self.connection.on_credentials_changed();
        let reconnect = !matches!(
            self.state.connection,
            ConnectionState::Connected | ConnectionState::Connecting
        );
        if reconnect {
            tracing::info!("credential changed, reconnecting push channel");
            self.request_connect();
            self.commit();
        }
    }

    pub(super) fn foregrounded(&mut self) {
        if !self.is_logged_in() {
            return;
        }
        if self.connection.on_foregrounded() {
            self.request_connect();
        }
        self.refresh_chats();
        self.commit();
    }

    fn request_connect(&mut self) {
        let Some(token) = self.session.as_ref().map(|s| s.access_token.clone()) else {
            return;
        };
        match self.push_transport() {
            Some(transport) => {
                self.state.connection = ConnectionState::Connecting;
                transport.connect(token);
            }
            None => tracing::warn!("push: no transport registered, staying offline"),
        }
    }

    pub(super) fn handle_connection_event(&mut self, event: PushConnectionEvent) {
        if !self.is_logged_in() {
            tracing::debug!(?event, "push: connection event without a session");
            return;
        }
        match event {
            PushConnectionEvent::Connected => {
                let catch_up = self.connection.on_connected();
                tracing::info!(catch_up, "push: connected");
                self.state.connection = ConnectionState::Connected;
                self.emit_push(outbound::GET_NOTIFICATION_COUNT, "{}".to_string());
                self.emit_push(outbound::GET_CHAT_PARTNERS_STATUS, "{}".to_string());
                if catch_up {
                    // Events missed while offline are not replayed.
                    self.refresh_chats();
                    if let Some(chat_id) = self.read_state.active_chat_id().map(str::to_string) {
                        self.fetch_newest_messages(&chat_id);
                    }
                }
                self.commit();
            }
            PushConnectionEvent::Disconnected { reason }
            | PushConnectionEvent::ConnectFailed { reason } => {
                match self.connection.on_connection_lost() {
                    ReconnectPlan::Retry {
                        attempt,
                        delay,
                        token,
                    } => {
                        tracing::warn!(%reason, attempt, ?delay, "push: connection lost, retrying");
                        self.state.connection = ConnectionState::Reconnecting { attempt };
                        self.schedule(delay, InternalEvent::ReconnectDue { token });
                        self.commit();
                    }
                    ReconnectPlan::GiveUp => {
                        tracing::error!(%reason, "push: reconnect attempts exhausted");
                        self.state.connection = ConnectionState::Failed;
                        self.toast("Unable to reach the chat server");
                    }
                    ReconnectPlan::Ignore => {
                        tracing::debug!(%reason, "push: connection loss ignored");
                    }
                }
            }
            PushConnectionEvent::AuthFailed { reason } => {
                tracing::warn!(%reason, "push: authentication failed");
                if let Some(transport) = self.push_transport() {
                    transport.disconnect();
                }
                if self.connection.on_auth_failed() {
                    self.state.connection = ConnectionState::AuthRequired;
                    self.toast("Chat connection needs you to log in again");
                }
            }
        }
    }

    pub(super) fn reconnect_due(&mut self, token: u64) {
        if !self.connection.is_current(token) {
            tracing::debug!(token, "push: stale reconnect timer");
            return;
        }
        self.request_connect();
        self.commit();
    }
}
