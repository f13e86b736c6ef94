//! Bearer credential sources.
//!
//! Credentials are issued elsewhere; Parley only reads them. A source is
//! asked again before every physical handshake and every REST call, so a
//! rotated token is picked up without restarting.
//!
//! `CredentialSource` uses RPITIT and is not object-safe. `BoxCredentialSource`
//! follows the same blanket-impl pattern as the other boxed ports:
//! 1. An object-safe `CredentialSourceDyn` with boxed futures
//! 2. A blanket impl for every `T: CredentialSource`
//! 3. A cloneable wrapper that delegates

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use secrecy::SecretString;

/// A provider of the current bearer credential.
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs (never the credential itself).
    fn name(&self) -> &str;

    /// The current credential, or `None` when the user is signed out.
    fn credential(&self) -> impl Future<Output = Option<SecretString>> + Send;
}

/// Object-safe version of [`CredentialSource`].
pub trait CredentialSourceDyn: Send + Sync {
    fn name(&self) -> &str;

    fn credential_boxed(&self) -> Pin<Box<dyn Future<Output = Option<SecretString>> + Send + '_>>;
}

impl<T: CredentialSource> CredentialSourceDyn for T {
    fn name(&self) -> &str {
        CredentialSource::name(self)
    }

    fn credential_boxed(&self) -> Pin<Box<dyn Future<Output = Option<SecretString>> + Send + '_>> {
        Box::pin(self.credential())
    }
}

/// Shared, type-erased credential source.
#[derive(Clone)]
pub struct BoxCredentialSource {
    inner: Arc<dyn CredentialSourceDyn>,
}

impl BoxCredentialSource {
    pub fn new<T: CredentialSource + 'static>(source: T) -> Self {
        Self {
            inner: Arc::new(source),
        }
    }
}

impl CredentialSource for BoxCredentialSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn credential(&self) -> impl Future<Output = Option<SecretString>> + Send {
        self.inner.credential_boxed()
    }
}

impl std::fmt::Debug for BoxCredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxCredentialSource")
            .field("name", &self.inner.name())
            .finish()
    }
}
