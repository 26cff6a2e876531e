// REST collaborator: chats, messages and membership over HTTP.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::model::{AttachmentKind, Chat, ChatKind, Message};
use crate::wire::{self, ChatDto, MessageDto};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("request failed ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("attachment unavailable: {0}")]
    Attachment(String),
}

impl ApiError {
    /// Short text suitable for an inline message error or a toast.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Network error".to_string(),
            ApiError::Unauthorized => "Session expired".to_string(),
            ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
            ApiError::Status { status, .. } => format!("Request failed ({status})"),
            ApiError::InvalidResponse(_) => "Unexpected server response".to_string(),
            ApiError::Attachment(e) => format!("Attachment unavailable: {e}"),
        }
    }
}

/// A device-local file chosen for upload with a message.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct OutgoingAttachment {
    pub local_path: String,
    pub mime_type: String,
    pub name: Option<String>,
    pub size: u64,
}

impl OutgoingAttachment {
    pub fn kind(&self) -> AttachmentKind {
        AttachmentKind::from_mime(&self.mime_type)
    }

    fn file_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            std::path::Path::new(&self.local_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMessageRequest {
    pub chat_id: String,
    pub content: Option<String>,
    pub attachments: Vec<OutgoingAttachment>,
}

/// Every call carries the session's bearer token.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    async fn fetch_chats(&self, auth: &str) -> Result<Vec<Chat>, ApiError>;

    /// `page` is 1-based; page 1 is the newest slice of history.
    async fn fetch_messages(
        &self,
        auth: &str,
        chat_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Message>, ApiError>;

    async fn create_message(
        &self,
        auth: &str,
        request: &CreateMessageRequest,
    ) -> Result<Message, ApiError>;

    async fn delete_message(&self, auth: &str, message_id: &str) -> Result<(), ApiError>;

    async fn create_chat(&self, auth: &str, peer_user_id: &str) -> Result<Chat, ApiError>;

    async fn create_group_chat(
        &self,
        auth: &str,
        name: &str,
        participant_ids: &[String],
    ) -> Result<Chat, ApiError>;

    async fn add_participants(
        &self,
        auth: &str,
        chat_id: &str,
        user_ids: &[String],
    ) -> Result<Chat, ApiError>;

    async fn remove_participant(
        &self,
        auth: &str,
        chat_id: &str,
        participant_id: &str,
    ) -> Result<(), ApiError>;

    async fn leave_chat(&self, auth: &str, chat_id: &str) -> Result<(), ApiError>;

    async fn delete_chat(&self, auth: &str, chat_id: &str, kind: ChatKind)
        -> Result<(), ApiError>;

    async fn mark_chat_read(&self, auth: &str, chat_id: &str) -> Result<(), ApiError>;
}

pub type SharedChatApi = Arc<dyn ChatApi>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = serde_json::from_slice::<ErrorBody>(&bytes).unwrap_or_default();
            let message = body.message.or(body.error).unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %message, "chat api: request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(bytes.to_vec())
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let bytes = self.execute(req).await?;
        wire::parse_envelope(&bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn execute_chat(&self, req: reqwest::RequestBuilder) -> Result<Chat, ApiError> {
        let dto: ChatDto = self.execute_json(req).await?;
        dto.into_chat()
            .ok_or_else(|| ApiError::InvalidResponse("chat without id".to_string()))
    }

    async fn multipart_form(request: &CreateMessageRequest) -> anyhow::Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        if let Some(content) = &request.content {
            form = form.text("content", content.clone());
        }
        for attachment in &request.attachments {
            let bytes = tokio::fs::read(&attachment.local_path)
                .await
                .with_context(|| format!("read {}", attachment.local_path))?;
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(attachment.file_name())
                .mime_str(&attachment.mime_type)
                .with_context(|| format!("mime type {}", attachment.mime_type))?;
            form = form.part("attachments", part);
        }
        Ok(form)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_chats(&self, auth: &str) -> Result<Vec<Chat>, ApiError> {
        let bytes = self
            .execute(self.client.get(self.url("/chats")).bearer_auth(auth))
            .await?;
        wire::decode_chats(&bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn fetch_messages(
        &self,
        auth: &str,
        chat_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Message>, ApiError> {
        let req = self
            .client
            .get(self.url(&format!("/chats/{chat_id}/messages")))
            .query(&[("page", page), ("limit", limit)])
            .bearer_auth(auth);
        let bytes = self.execute(req).await?;
        wire::decode_messages(&bytes, chat_id).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn create_message(
        &self,
        auth: &str,
        request: &CreateMessageRequest,
    ) -> Result<Message, ApiError> {
        let url = self.url(&format!("/chats/{}/messages", request.chat_id));
        let req = if request.attachments.is_empty() {
            self.client
                .post(url)
                .json(&serde_json::json!({ "content": request.content }))
        } else {
            let form = Self::multipart_form(request)
                .await
                .map_err(|e| ApiError::Attachment(format!("{e:#}")))?;
            self.client.post(url).multipart(form)
        };
        let dto: MessageDto = self.execute_json(req.bearer_auth(auth)).await?;
        dto.into_message(Some(&request.chat_id))
            .ok_or_else(|| ApiError::InvalidResponse("message without id".to_string()))
    }

    async fn delete_message(&self, auth: &str, message_id: &str) -> Result<(), ApiError> {
        let req = self
            .client
            .delete(self.url(&format!("/chats/messages/{message_id}")))
            .bearer_auth(auth);
        self.execute(req).await.map(|_| ())
    }

    async fn create_chat(&self, auth: &str, peer_user_id: &str) -> Result<Chat, ApiError> {
        let req = self
            .client
            .post(self.url("/chats"))
            .json(&serde_json::json!({ "participantId": peer_user_id }))
            .bearer_auth(auth);
        self.execute_chat(req).await
    }

    async fn create_group_chat(
        &self,
        auth: &str,
        name: &str,
        participant_ids: &[String],
    ) -> Result<Chat, ApiError> {
        let req = self
            .client
            .post(self.url("/chats/group"))
            .json(&serde_json::json!({ "name": name, "participantIds": participant_ids }))
            .bearer_auth(auth);
        self.execute_chat(req).await
    }

    async fn add_participants(
        &self,
        auth: &str,
        chat_id: &str,
        user_ids: &[String],
    ) -> Result<Chat, ApiError> {
        let req = self
            .client
            .post(self.url(&format!("/chats/{chat_id}/participants")))
            .json(&serde_json::json!({ "participantIds": user_ids }))
            .bearer_auth(auth);
        self.execute_chat(req).await
    }

    async fn remove_participant(
        &self,
        auth: &str,
        chat_id: &str,
        participant_id: &str,
    ) -> Result<(), ApiError> {
        let req = self
            .client
            .delete(self.url(&format!("/chats/{chat_id}/participants/{participant_id}")))
            .bearer_auth(auth);
        self.execute(req).await.map(|_| ())
    }

    async fn leave_chat(&self, auth: &str, chat_id: &str) -> Result<(), ApiError> {
        let req = self
            .client
            .post(self.url(&format!("/chats/{chat_id}/leave")))
            .bearer_auth(auth);
        self.execute(req).await.map(|_| ())
    }

    async fn delete_chat(
        &self,
        auth: &str,
        chat_id: &str,
        kind: ChatKind,
    ) -> Result<(), ApiError> {
        let path = match kind {
            ChatKind::Group => format!("/chats/group/{chat_id}"),
            ChatKind::OneOnOne => format!("/chats/{chat_id}"),
        };
        let req = self.client.delete(self.url(&path)).bearer_auth(auth);
        self.execute(req).await.map(|_| ())
    }

    async fn mark_chat_read(&self, auth: &str, chat_id: &str) -> Result<(), ApiError> {
        let req = self
            .client
            .patch(self.url(&format!("/chats/{chat_id}/read")))
            .bearer_auth(auth);
        self.execute(req).await.map(|_| ())
    }
}
