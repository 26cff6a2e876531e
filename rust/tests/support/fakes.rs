#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use socio_core::{
    ApiError, Chat, ChatApi, ChatKind, CreateMessageRequest, Message, MessageStatus,
    PushTransport,
};

async fn wait_for_gate(gate: &AtomicBool) {
    while gate.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Default)]
struct MockState {
    chats: Vec<Chat>,
    pages: HashMap<(String, u32), Vec<Message>>,
    send_results: VecDeque<Result<Message, ApiError>>,
    delete_results: VecDeque<Result<(), ApiError>>,
    create_results: VecDeque<Result<Chat, ApiError>>,
    membership_results: VecDeque<Result<Chat, ApiError>>,
    exit_results: VecDeque<Result<(), ApiError>>,
    calls: Vec<String>,
    sent: usize,
}

/// Scripted REST collaborator. Unscripted calls succeed with plausible data.
#[derive(Clone)]
pub struct MockChatApi {
    user_id: String,
    state: Arc<Mutex<MockState>>,
    hold_sends: Arc<AtomicBool>,
    hold_fetches: Arc<AtomicBool>,
    hold_chat_list: Arc<AtomicBool>,
}

impl MockChatApi {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
            hold_sends: Arc::new(AtomicBool::new(false)),
            hold_fetches: Arc::new(AtomicBool::new(false)),
            hold_chat_list: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_chats(self, chats: Vec<Chat>) -> Self {
        self.set_chats(chats);
        self
    }

    /// What the next `fetch_chats` returns.
    pub fn set_chats(&self, chats: Vec<Chat>) {
        self.state.lock().unwrap().chats = chats;
    }

    pub fn set_page(&self, chat_id: &str, page: u32, messages: Vec<Message>) {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert((chat_id.to_string(), page), messages);
    }

    pub fn push_send_result(&self, result: Result<Message, ApiError>) {
        self.state.lock().unwrap().send_results.push_back(result);
    }

    pub fn push_delete_result(&self, result: Result<(), ApiError>) {
        self.state.lock().unwrap().delete_results.push_back(result);
    }

    pub fn push_create_result(&self, result: Result<Chat, ApiError>) {
        self.state.lock().unwrap().create_results.push_back(result);
    }

    pub fn push_membership_result(&self, result: Result<Chat, ApiError>) {
        self.state.lock().unwrap().membership_results.push_back(result);
    }

    pub fn push_exit_result(&self, result: Result<(), ApiError>) {
        self.state.lock().unwrap().exit_results.push_back(result);
    }

    /// While held, `create_message` does not complete.
    pub fn hold_sends(&self, hold: bool) {
        self.hold_sends.store(hold, Ordering::SeqCst);
    }

    /// While held, `fetch_chats` does not complete.
    pub fn hold_chat_list(&self, hold: bool) {
        self.hold_chat_list.store(hold, Ordering::SeqCst);
    }

    /// While held, `fetch_messages` does not complete.
    pub fn hold_fetches(&self, hold: bool) {
        self.hold_fetches.store(hold, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn fetch_chats(&self, _auth: &str) -> Result<Vec<Chat>, ApiError> {
        self.record("fetch_chats".to_string());
        wait_for_gate(&self.hold_chat_list).await;
        Ok(self.state.lock().unwrap().chats.clone())
    }

    async fn fetch_messages(
        &self,
        _auth: &str,
        chat_id: &str,
        page: u32,
        _limit: u32,
    ) -> Result<Vec<Message>, ApiError> {
        self.record(format!("fetch_messages {chat_id} {page}"));
        wait_for_gate(&self.hold_fetches).await;
        let state = self.state.lock().unwrap();
        if let Some(scripted) = state.pages.get(&(chat_id.to_string(), page)) {
            return Ok(scripted.clone());
        }
        // Unscripted newest page: whatever the chat list was seeded with.
        let seeded = state
            .chats
            .iter()
            .find(|c| c.id == chat_id && page == 1)
            .map(|c| c.messages.clone())
            .unwrap_or_default();
        Ok(seeded)
    }

    async fn create_message(
        &self,
        _auth: &str,
        request: &CreateMessageRequest,
    ) -> Result<Message, ApiError> {
        self.record(format!("create_message {}", request.chat_id));
        wait_for_gate(&self.hold_sends).await;
        let mut state = self.state.lock().unwrap();
        state.sent += 1;
        if let Some(result) = state.send_results.pop_front() {
            return result;
        }
        Ok(Message {
            id: format!("srv-{}", state.sent),
            chat_id: request.chat_id.clone(),
            sender_id: self.user_id.clone(),
            content: request.content.clone(),
            attachments: vec![],
            created_at: socio_core::now_millis(),
            read_by: vec![self.user_id.clone()],
            status: MessageStatus::Sent,
        })
    }

    async fn delete_message(&self, _auth: &str, message_id: &str) -> Result<(), ApiError> {
        self.record(format!("delete_message {message_id}"));
        self.state
            .lock()
            .unwrap()
            .delete_results
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn create_chat(&self, _auth: &str, peer_user_id: &str) -> Result<Chat, ApiError> {
        self.record(format!("create_chat {peer_user_id}"));
        self.state
            .lock()
            .unwrap()
            .create_results
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("unscripted create".into())))
    }

    async fn create_group_chat(
        &self,
        _auth: &str,
        name: &str,
        participant_ids: &[String],
    ) -> Result<Chat, ApiError> {
        self.record(format!("create_group_chat {name} {}", participant_ids.join(",")));
        self.state
            .lock()
            .unwrap()
            .create_results
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("unscripted create".into())))
    }

    async fn add_participants(
        &self,
        _auth: &str,
        chat_id: &str,
        user_ids: &[String],
    ) -> Result<Chat, ApiError> {
        self.record(format!("add_participants {chat_id} {}", user_ids.join(",")));
        self.state
            .lock()
            .unwrap()
            .membership_results
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("unscripted add".into())))
    }

    async fn remove_participant(
        &self,
        _auth: &str,
        chat_id: &str,
        participant_id: &str,
    ) -> Result<(), ApiError> {
        self.record(format!("remove_participant {chat_id} {participant_id}"));
        Ok(())
    }

    async fn leave_chat(&self, _auth: &str, chat_id: &str) -> Result<(), ApiError> {
        self.record(format!("leave_chat {chat_id}"));
        self.state
            .lock()
            .unwrap()
            .exit_results
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn delete_chat(&self, _auth: &str, chat_id: &str, kind: ChatKind) -> Result<(), ApiError> {
        self.record(format!("delete_chat {chat_id} {kind:?}"));
        self.state
            .lock()
            .unwrap()
            .exit_results
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn mark_chat_read(&self, _auth: &str, chat_id: &str) -> Result<(), ApiError> {
        self.record(format!("mark_chat_read {chat_id}"));
        Ok(())
    }
}

/// Push transport that records what the core asks of it.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    emitted: Arc<Mutex<Vec<(String, String)>>>,
    connects: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<Mutex<usize>>,
}

impl RecordingTransport {
    pub fn emitted(&self, event: &str) -> Vec<String> {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == event)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn connect_tokens(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        *self.disconnects.lock().unwrap()
    }
}

impl PushTransport for RecordingTransport {
    fn connect(&self, access_token: String) {
        self.connects.lock().unwrap().push(access_token);
    }

    fn disconnect(&self) {
        *self.disconnects.lock().unwrap() += 1;
    }

    fn emit(&self, event: String, payload_json: String) {
        self.emitted.lock().unwrap().push((event, payload_json));
    }
}
