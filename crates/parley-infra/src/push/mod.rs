//! Websocket push transport.
//!
//! [`WsTransport`] implements the core [`PushTransport`] port with
//! tokio-tungstenite. The handshake sends `Authorization: Bearer <credential>`
//! and names the user in the `userId` query parameter. Frames are JSON text
//! (see [`frame`]).

pub mod frame;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use parley_core::connection::{PushLink, PushTransport};
use parley_types::error::PushError;
use parley_types::event::{InboundEvent, OutboundEvent};
use parley_types::id::UserId;

/// Opens websocket links to the push endpoint.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, user: &UserId) -> Result<Url, PushError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| PushError::Handshake(format!("invalid push url {}: {e}", self.url)))?;
        url.query_pairs_mut().append_pair("userId", user.as_str());
        Ok(url)
    }
}

fn handshake_error(err: tungstenite::Error) -> PushError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
        {
            PushError::Unauthorized
        }
        tungstenite::Error::Http(response) => {
            PushError::Handshake(format!("server answered {}", response.status()))
        }
        other => PushError::Handshake(other.to_string()),
    }
}

impl PushTransport for WsTransport {
    type Link = WsLink;

    async fn open(&self, user: &UserId, credential: &SecretString) -> Result<WsLink, PushError> {
        let url = self.endpoint(user)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(handshake_error)?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", credential.expose_secret()))
            .map_err(|_| PushError::Handshake("credential is not a valid header value".into()))?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(handshake_error)?;
        tracing::debug!(user = %user, status = %response.status(), "push handshake complete");

        Ok(WsLink { stream })
    }
}

/// One live websocket connection.
pub struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PushLink for WsLink {
    async fn send(&mut self, event: &OutboundEvent) -> Result<(), PushError> {
        let text = frame::encode(event)?;
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| PushError::Transport(e.to_string()))
    }

    async fn next(&mut self) -> Option<Result<InboundEvent, PushError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(PushError::Transport(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(frame::decode(text.as_str())),
                Message::Binary(bytes) => {
                    return Some(match std::str::from_utf8(&bytes) {
                        Ok(text) => frame::decode(text),
                        Err(_) => Err(PushError::Frame("binary frame is not UTF-8".into())),
                    });
                }
                Message::Close(_) => return None,
                // Pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "push link close failed");
        }
    }
}
