//! HttpMessageApi -- concrete [`MessageApi`] over the REST persistence service.
//!
//! Every request carries `Authorization: Bearer <credential>`, read from the
//! credential source at call time. The credential is only exposed while
//! building the header and never logged.
//!
//! Status mapping:
//! - 401/403 -> [`ApiError::Unauthorized`], keeping any `{error}` text
//! - 404 -> [`ApiError::NotFound`] (the conversation check turns it into `Ok(None)`)
//! - other non-2xx -> [`ApiError::Status`] with the `{error}` body text when present

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use parley_core::api::MessageApi;
use parley_core::credential::{BoxCredentialSource, CredentialSource};
use parley_types::conversation::{Conversation, ParticipantPair};
use parley_types::error::ApiError;
use parley_types::event::ReadReceipt;
use parley_types::id::{ConversationId, MessageId, UserId};
use parley_types::message::{Message, NewMessage};

/// Error body shape used by the persistence service.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, serde::Serialize)]
struct ContentUpdate<'a> {
    content: &'a str,
}

/// REST client for the persistence service.
pub struct HttpMessageApi {
    client: reqwest::Client,
    base_url: Url,
    credentials: BoxCredentialSource,
}

impl HttpMessageApi {
    /// Create a client for `base_url` (for example `http://localhost:3000`).
    pub fn new(
        base_url: &str,
        credentials: BoxCredentialSource,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::Network(format!("invalid api url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Network(format!("invalid api url {base_url}")));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in `new`, so segments are always available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Attach the bearer credential and send.
    async fn send(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ApiError> {
        let Some(credential) = self.credentials.credential().await else {
            tracing::debug!(%url, "no credential available, request not sent");
            return Err(ApiError::Unauthorized(None));
        };

        let request = build(
            self.client
                .request(method.clone(), url.clone())
                .bearer_auth(credential.expose_secret()),
        );
        drop(credential);

        let response = request.send().await.map_err(|e| {
            tracing::warn!(%method, %url, error = %e, "request failed");
            ApiError::Network(e.to_string())
        })?;

        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(method, url, build).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(format!("failed to parse response: {e}")))
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let body = response.text().await.unwrap_or_default();
            let message = server_error(&body);
            tracing::debug!(status = status.as_u16(), message = ?message, "credential rejected");
            Err(ApiError::Unauthorized(message))
        }
        StatusCode::NOT_FOUND => Err(ApiError::NotFound),
        _ => {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            tracing::debug!(status = status.as_u16(), %message, "request rejected");
            Err(ApiError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// The `{error}` text of a JSON error body.
fn server_error(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|parsed| parsed.error)
        .filter(|error| !error.trim().is_empty())
}

/// The user-facing message for a failed response.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Some(error) = server_error(body) {
        return error;
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 200 {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

impl MessageApi for HttpMessageApi {
    async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, ApiError> {
        let url = self.url(&["messages", "conversation", conversation_id.as_str()]);
        self.send_json(Method::GET, url, |r| r).await
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, ApiError> {
        let url = self.url(&["messages"]);
        self.send_json(Method::POST, url, |r| r.json(message)).await
    }

    async fn update_message(&self, id: &MessageId, content: &str) -> Result<Message, ApiError> {
        let url = self.url(&["messages", id.as_str()]);
        self.send_json(Method::PUT, url, |r| r.json(&ContentUpdate { content }))
            .await
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), ApiError> {
        let url = self.url(&["messages", id.as_str()]);
        self.send(Method::DELETE, url, |r| r).await.map(|_| ())
    }

    async fn mark_read(&self, conversation_id: &ConversationId, reader: &UserId) -> Result<(), ApiError> {
        let url = self.url(&["messages", "read"]);
        let body = ReadReceipt {
            conversation_id: conversation_id.clone(),
            user_id: reader.clone(),
        };
        self.send(Method::POST, url, |r| r.json(&body)).await.map(|_| ())
    }

    async fn find_conversation(
        &self,
        sender: &UserId,
        receiver: &UserId,
    ) -> Result<Option<Conversation>, ApiError> {
        let url = self.url(&["messages", "conversation", "check"]);
        let body = ParticipantPair {
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
        };
        match self
            .send_json::<Conversation>(Method::POST, url, |r| r.json(&body))
            .await
        {
            Ok(conversation) => Ok(Some(conversation)),
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_conversation(
        &self,
        sender: &UserId,
        receiver: &UserId,
    ) -> Result<Conversation, ApiError> {
        let url = self.url(&["messages", "conversation"]);
        let body = ParticipantPair {
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
        };
        self.send_json(Method::POST, url, |r| r.json(&body)).await
    }
}

impl std::fmt::Debug for HttpMessageApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMessageApi")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish()
    }
}
