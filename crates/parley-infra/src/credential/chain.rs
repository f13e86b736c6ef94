//! Credential chain builder: wires concrete sources in priority order.
//!
//! This module lives in `parley-infra` because it assembles concrete source
//! implementations. The chain itself is a [`CredentialSource`], so the core
//! never knows how many sources stand behind it.
//!
//! Default chain order: `[EnvCredentialSource, FileCredentialSource]`

use secrecy::SecretString;

use parley_core::credential::{BoxCredentialSource, CredentialSource};
use parley_types::config::ClientConfig;

use crate::credential::env::EnvCredentialSource;
use crate::credential::file::FileCredentialSource;

/// First-match chain of credential sources.
#[derive(Clone, Default)]
pub struct CredentialChain {
    sources: Vec<BoxCredentialSource>,
}

impl CredentialChain {
    pub fn new(sources: Vec<BoxCredentialSource>) -> Self {
        Self { sources }
    }

    pub fn push<T: CredentialSource + 'static>(&mut self, source: T) {
        self.sources.push(BoxCredentialSource::new(source));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl CredentialSource for CredentialChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn credential(&self) -> Option<SecretString> {
        for source in &self.sources {
            if let Some(token) = source.credential().await {
                tracing::trace!(source = source.name(), "credential resolved");
                return Some(token);
            }
        }
        None
    }
}

/// Build the default credential resolution chain from config.
///
/// The chain is ordered by precedence (first match wins):
/// 1. The environment variable named by `token_env`
/// 2. The token file at `token_file` (if configured)
pub fn build_credential_chain(config: &ClientConfig) -> CredentialChain {
    let mut chain = CredentialChain::default();

    chain.push(EnvCredentialSource::new(config.token_env.clone()));

    if let Some(path) = &config.token_file {
        chain.push(FileCredentialSource::new(path.clone()));
    }

    chain
}
