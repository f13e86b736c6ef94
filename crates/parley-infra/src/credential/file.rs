//! Token file credential source.
//!
//! The file is re-read before every handshake and request, so an external
//! process can rotate the token in place.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use parley_core::credential::CredentialSource;

pub struct FileCredentialSource {
    path: PathBuf,
}

impl FileCredentialSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSource for FileCredentialSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn credential(&self) -> Option<SecretString> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(SecretString::from(token.to_string()))
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No token file at {}", self.path.display());
                None
            }
            Err(err) => {
                tracing::warn!("Failed to read token file {}: {err}", self.path.display());
                None
            }
        }
    }
}
