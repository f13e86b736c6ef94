//! Push transport port.
//!
//! A `PushTransport` performs one physical handshake and yields a `PushLink`.
//! The infrastructure layer implements it over websockets
//! (`parley_infra::push::WsTransport`). The connection manager owns the link
//! exclusively from its driver task, so links only need to be `Send`.

use secrecy::SecretString;

use parley_types::error::PushError;
use parley_types::event::{InboundEvent, OutboundEvent};
use parley_types::id::UserId;

/// Opens authenticated push links.
pub trait PushTransport: Send + Sync + 'static {
    type Link: PushLink;

    /// Perform a handshake for `user` with `credential`.
    ///
    /// A server rejection of the credential must surface as
    /// [`PushError::Unauthorized`] so the caller can stop retrying.
    fn open(
        &self,
        user: &UserId,
        credential: &SecretString,
    ) -> impl std::future::Future<Output = Result<Self::Link, PushError>> + Send;
}

/// One live, authenticated push connection.
pub trait PushLink: Send + 'static {
    fn send(
        &mut self,
        event: &OutboundEvent,
    ) -> impl std::future::Future<Output = Result<(), PushError>> + Send;

    /// Next inbound event.
    ///
    /// `None` means the peer closed the link. `Some(Err(PushError::Frame(_)))`
    /// reports one undecodable frame; the link stays usable. Any other error
    /// means the link is dead.
    fn next(
        &mut self,
    ) -> impl std::future::Future<Output = Option<Result<InboundEvent, PushError>>> + Send;

    /// Close the link gracefully. Errors are ignored by callers.
    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send;
}
