use super::{ByteStream, ChatBackend};
use crate::config::Config;
use crate::error::TransportError;
use crate::logging::{debug_payload_enabled, emit_debug_payload};
use crate::types::{Chat, ChatId, ErrorBody, Message, PromptRequest, TitleBody};
use crate::util::{is_local_endpoint_url, normalize_base_url};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

/// HTTP adapter for the chat backend (`/api/chats`, `/api/chat`).
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&config.api_url),
        })
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.base_url)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|error| map_request_error(error, url))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let url = self.endpoint(path);
        let response = self.send(self.http.get(&url), &url).await?;
        read_json(response, &url).await
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn list_chats(&self) -> Result<Vec<Chat>, TransportError> {
        self.get_json("/api/chats").await
    }

    async fn create_chat(&self, title: &str) -> Result<Chat, TransportError> {
        let url = self.endpoint("/api/chats");
        let body = TitleBody {
            title: title.to_string(),
        };
        let response = self.send(self.http.post(&url).json(&body), &url).await?;
        read_json(response, &url).await
    }

    async fn rename_chat(&self, chat_id: ChatId, title: &str) -> Result<String, TransportError> {
        let url = self.endpoint(&format!("/api/chats/{chat_id}/title"));
        let body = TitleBody {
            title: title.to_string(),
        };
        let response = self.send(self.http.put(&url).json(&body), &url).await?;
        let saved: TitleBody = read_json(response, &url).await?;
        Ok(saved.title)
    }

    async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, TransportError> {
        self.get_json(&format!("/api/chats/{chat_id}/messages"))
            .await
    }

    async fn open_prompt_stream(
        &self,
        request: &PromptRequest,
    ) -> Result<ByteStream, TransportError> {
        let url = self.endpoint("/api/chat");

        if debug_payload_enabled() {
            match serde_json::to_value(request) {
                Ok(payload) => emit_debug_payload(&url, &payload),
                Err(error) => tracing::debug!(%error, "prompt payload not serializable"),
            }
        }

        let response = self
            .send(
                self.http
                    .post(&url)
                    .header("content-type", "application/json")
                    .json(request),
                &url,
            )
            .await?;

        let url_for_stream = url.clone();
        let stream = response
            .bytes_stream()
            .map(move |item| item.map_err(|error| map_request_error(error, &url_for_stream)));
        Ok(Box::pin(stream))
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, TransportError> {
    let body = response
        .bytes()
        .await
        .map_err(|error| map_request_error(error, url))?;
    serde_json::from_slice(&body).map_err(|error| TransportError::InvalidBody {
        url: url.to_string(),
        reason: error.to_string(),
    })
}

/// Builds the error for a non-success response from its `{error}` body.
async fn status_error(response: Response) -> TransportError {
    let status = response.status().as_u16();
    let message = match response.bytes().await {
        Ok(body) => serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.error),
        Err(error) => {
            tracing::debug!(%error, status, "failed to read error response body");
            None
        }
    };
    TransportError::Status { status, message }
}

fn map_request_error(error: reqwest::Error, request_url: &str) -> TransportError {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return TransportError::Connect {
            url: request_url.to_string(),
            reason: format!(
                "{error}. Start the local backend or update STREAMCHAT_API_URL."
            ),
        };
    }
    if error.is_connect() {
        return TransportError::Connect {
            url: request_url.to_string(),
            reason: error.to_string(),
        };
    }
    if error.is_timeout() {
        return TransportError::Timeout {
            url: request_url.to_string(),
        };
    }
    if let Some(status) = error.status() {
        return TransportError::Status {
            status: status.as_u16(),
            message: None,
        };
    }
    TransportError::Request {
        url: request_url.to_string(),
        reason: error.to_string(),
    }
}
