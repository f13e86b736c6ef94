//! Application state wiring the client together.
//!
//! AppState pins the core's generic ports to the concrete infra adapters:
//! `HttpMessageApi` for persistence and `WsTransport` for the push channel.
//! It owns the one `ConnectionManager` of the process and hands it to
//! controllers as an `Arc<dyn PushChannel>`.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use parley_core::connection::{ConnectionManager, PushChannel, ReconnectPolicy, SessionHandle};
use parley_core::controller::{ControllerSettings, ConversationController};
use parley_core::credential::BoxCredentialSource;
use parley_infra::config::{load_client_config, load_config_file, resolve_data_dir};
use parley_infra::credential::chain::build_credential_chain;
use parley_infra::http::HttpMessageApi;
use parley_infra::push::WsTransport;
use parley_types::config::ClientConfig;
use parley_types::error::PushError;
use parley_types::id::UserId;

use crate::cli::GlobalArgs;

pub type Connection = ConnectionManager<WsTransport, BoxCredentialSource>;
pub type Controller = ConversationController<HttpMessageApi>;

/// Outcome of bringing up the push session.
#[derive(Debug)]
pub enum PushStatus {
    Connected(SessionHandle),
    /// No credential could be found; nothing was attempted.
    NoCredential,
    /// The handshake failed for a reason other than authorization. REST
    /// still works, so the caller may carry on without live updates.
    Unavailable(PushError),
}

pub struct AppState {
    pub config: ClientConfig,
    pub user: UserId,
    pub api: Arc<HttpMessageApi>,
    pub connection: Arc<Connection>,
}

impl AppState {
    /// Load config, apply command-line overrides and build the adapters.
    pub async fn init(args: &GlobalArgs) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => load_config_file(path).await?,
            None => load_client_config(&resolve_data_dir()).await,
        };
        apply_overrides(&mut config, args);

        let user = config
            .user_id
            .clone()
            .map(UserId::from)
            .context("no user configured: pass --user or set user_id in config.toml")?;

        let credentials = BoxCredentialSource::new(build_credential_chain(&config));
        let api = HttpMessageApi::new(&config.api_url, credentials.clone(), config.request_timeout())?;
        let policy = ReconnectPolicy {
            max_attempts: config.reconnect_attempts,
            delay: config.reconnect_delay(),
        };
        let connection = ConnectionManager::new(WsTransport::new(config.push_url.clone()), credentials, policy);

        debug!(api_url = %config.api_url, push_url = %config.push_url, user = %user, "client configured");
        Ok(Self {
            config,
            user,
            api: Arc::new(api),
            connection: Arc::new(connection),
        })
    }

    /// Establish the push session for the configured user.
    ///
    /// A rejected credential is an error: REST calls would be rejected too.
    pub async fn connect(&self) -> anyhow::Result<PushStatus> {
        match self.connection.connect(&self.user).await {
            Ok(Some(handle)) => Ok(PushStatus::Connected(handle)),
            Ok(None) => Ok(PushStatus::NoCredential),
            Err(PushError::Unauthorized) => anyhow::bail!(
                "the push service rejected the credential in ${}; sign in again",
                self.config.token_env
            ),
            Err(e) => Ok(PushStatus::Unavailable(e)),
        }
    }

    pub fn controller(&self) -> Controller {
        let push: Arc<dyn PushChannel> = self.connection.clone();
        ConversationController::new(
            self.user.clone(),
            Arc::clone(&self.api),
            push,
            ControllerSettings::from_config(&self.config),
        )
    }

    /// Tear down the push session. Called once on exit.
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        info!(user = %self.user, "client shut down");
    }
}

fn apply_overrides(config: &mut ClientConfig, args: &GlobalArgs) {
    if let Some(url) = &args.api_url {
        config.api_url = url.clone();
    }
    if let Some(url) = &args.push_url {
        config.push_url = url.clone();
    }
    if let Some(user) = &args.user {
        config.user_id = Some(user.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_values() {
        let mut config = ClientConfig {
            user_id: Some("from-file".into()),
            ..ClientConfig::default()
        };
        let args = GlobalArgs {
            api_url: Some("http://api.test".into()),
            user: Some("u1".into()),
            ..GlobalArgs::default()
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.api_url, "http://api.test");
        assert_eq!(config.push_url, ClientConfig::default().push_url);
        assert_eq!(config.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let mut config = ClientConfig {
            user_id: Some("from-file".into()),
            ..ClientConfig::default()
        };
        apply_overrides(&mut config, &GlobalArgs::default());
        assert_eq!(config.user_id.as_deref(), Some("from-file"));
    }
}
