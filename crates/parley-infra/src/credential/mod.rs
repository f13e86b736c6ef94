//! Credential source implementations.
//!
//! - `env`: environment variable source (highest priority)
//! - `file`: token file source, re-read on every request
//! - `chain`: first-match chain wiring the sources together
//! - `StaticCredentialSource`: a fixed credential, for tests and embedding

pub mod chain;
pub mod env;
pub mod file;

use secrecy::SecretString;

use parley_core::credential::CredentialSource;

/// A credential fixed at construction time.
pub struct StaticCredentialSource {
    token: SecretString,
}

impl StaticCredentialSource {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

impl CredentialSource for StaticCredentialSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn credential(&self) -> Option<SecretString> {
        Some(self.token.clone())
    }
}
