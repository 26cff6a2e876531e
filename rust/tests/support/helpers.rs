#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use socio_core::{
    AppAction, AppReconciler, AppUpdate, AuthState, Chat, ChatKind, ChatMessage, ChatSummary,
    ConnectionState, FfiApp, Message, MessageStatus, Participant, PushConnectionEvent, UserKind,
};
use tempfile::TempDir;

use super::fakes::{MockChatApi, RecordingTransport};

pub const ME: &str = "me";

pub fn wait_until(what: &str, timeout: Duration, f: impl FnMut() -> bool) {
    wait_until_with_poll(what, timeout, Duration::from_millis(10), f);
}

pub fn wait_until_with_poll(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut f: impl FnMut() -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(poll);
    }
    panic!("{what}: condition not met within {timeout:?}");
}

/// Short windows so timer-driven behavior is observable in tests.
pub fn write_config(data_dir: &str) {
    let path = std::path::Path::new(data_dir).join("socio_config.json");
    let v = serde_json::json!({
        "api_base_url": "http://127.0.0.1:9/api",
        "typing_expiry_ms": 200,
        "stop_typing_debounce_ms": 150,
        "reconnect_base_delay_ms": 20,
        "max_reconnect_attempts": 2,
        "messages_page_size": 50,
        "emit_read_receipts": true,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

#[derive(Clone)]
pub struct Collector(pub Arc<Mutex<Vec<AppUpdate>>>);

impl Collector {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn last_toast(&self) -> Option<String> {
        self.0.lock().unwrap().iter().rev().find_map(|u| match u {
            AppUpdate::FullState(s) => s.toast.clone(),
            _ => None,
        })
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                AppUpdate::NotificationForwarded {
                    event,
                    payload_json,
                    ..
                } => Some((event.clone(), payload_json.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn revs(&self) -> Vec<u64> {
        self.0.lock().unwrap().iter().map(AppUpdate::rev).collect()
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.0.lock().unwrap().push(update);
    }
}

/// An app wired to fakes, logged in as [`ME`], with the chat list loaded.
pub struct Harness {
    pub app: Arc<FfiApp>,
    pub api: MockChatApi,
    pub transport: RecordingTransport,
    pub updates: Collector,
    _dir: TempDir,
}

impl Harness {
    pub fn start(chats: Vec<Chat>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_config(&dir.path().to_string_lossy());
        let app = FfiApp::new(dir.path().to_string_lossy().to_string());
        let updates = Collector::new();
        app.listen_for_updates(Box::new(updates.clone()));

        let api = MockChatApi::new(ME).with_chats(chats.clone());
        app.set_chat_api_for_tests(Arc::new(api.clone()));
        let transport = RecordingTransport::default();
        app.set_push_transport(Box::new(transport.clone()));

        app.dispatch(AppAction::StartSession {
            user_id: ME.to_string(),
            access_token: "token-1".to_string(),
        });
        let h = Self {
            app,
            api,
            transport,
            updates,
            _dir: dir,
        };
        h.wait("chat list loaded", |h| {
            let s = h.app.state();
            matches!(s.auth, AuthState::LoggedIn { .. })
                && h.api.count_calls("fetch_chats") > 0
                && !s.busy.fetching_chats
                && s.chat_list.len() == chats.len()
        });
        h
    }

    pub fn wait(&self, what: &str, mut f: impl FnMut(&Self) -> bool) {
        wait_until(what, Duration::from_secs(3), || f(self));
    }

    pub fn connect(&self) {
        self.app.push_connection_changed(PushConnectionEvent::Connected);
        self.wait("connected", |h| {
            h.app.state().connection == ConnectionState::Connected
        });
    }

    pub fn push(&self, event: &str, payload: serde_json::Value) {
        self.app.push_event(event.to_string(), payload.to_string());
    }

    pub fn open_chat(&self, chat_id: &str) {
        self.app.dispatch(AppAction::OpenChat {
            chat_id: chat_id.to_string(),
        });
        self.wait("chat opened", |h| {
            let s = h.app.state();
            s.current_chat.as_ref().map(|c| c.chat_id.as_str()) == Some(chat_id)
                && !s.busy.loading_messages
        });
    }

    pub fn summary(&self, chat_id: &str) -> Option<ChatSummary> {
        self.app
            .state()
            .chat_list
            .into_iter()
            .find(|c| c.chat_id == chat_id)
    }

    pub fn open_messages(&self) -> Vec<ChatMessage> {
        self.app
            .state()
            .current_chat
            .map(|c| c.messages)
            .unwrap_or_default()
    }

    pub fn open_message_ids(&self) -> Vec<String> {
        self.open_messages().into_iter().map(|m| m.id).collect()
    }
}

pub fn participant(user_id: &str, name: &str, is_admin: bool) -> Participant {
    Participant {
        id: format!("p-{user_id}"),
        user_id: user_id.to_string(),
        user_kind: UserKind::Student,
        name: Some(name.to_string()),
        avatar_url: None,
        is_admin,
    }
}

pub fn direct_chat(id: &str, peer: &str, messages: Vec<Message>) -> Chat {
    Chat {
        id: id.to_string(),
        kind: ChatKind::OneOnOne,
        name: None,
        avatar_url: None,
        participants: vec![participant(ME, "Me", false), participant(peer, peer, false)],
        messages,
        unread_count: 0,
    }
}

pub fn group_chat(id: &str, name: &str, others: &[&str]) -> Chat {
    let mut participants = vec![participant(ME, "Me", true)];
    participants.extend(others.iter().map(|u| participant(u, u, false)));
    Chat {
        id: id.to_string(),
        kind: ChatKind::Group,
        name: Some(name.to_string()),
        avatar_url: None,
        participants,
        messages: vec![],
        unread_count: 0,
    }
}

pub fn message(id: &str, chat_id: &str, sender: &str, content: &str, created_at: i64) -> Message {
    Message {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender_id: sender.to_string(),
        content: Some(content.to_string()),
        attachments: vec![],
        created_at,
        read_by: vec![sender.to_string()],
        status: MessageStatus::Sent,
    }
}

pub fn message_json(id: &str, chat_id: &str, sender: &str, content: &str, created_at: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "chatId": chat_id,
        "senderId": sender,
        "content": content,
        "createdAt": created_at,
        "readBy": [sender],
    })
}
