//! The shared push connection.
//!
//! - [`hub`]: per-kind handler registry with drop-to-unsubscribe handles
//! - [`transport`]: port for opening physical links
//! - [`manager`]: session ownership, reconnection, best-effort emit
//!
//! Consumers that only need to listen and emit (the conversation controller)
//! see the connection through [`PushChannel`], which deliberately has no
//! `disconnect`.

pub mod hub;
pub mod manager;
pub mod transport;

pub use hub::{EventHandler, EventHub, Subscription};
pub use manager::{ConnectionManager, ConnectionStatus, ReconnectPolicy, SessionHandle};
pub use transport::{PushLink, PushTransport};

use parley_types::event::{OutboundEvent, PushEventKind};

/// Listen-and-emit view of the push connection.
pub trait PushChannel: Send + Sync {
    /// Register `handler` for inbound events of `kind`.
    fn subscribe(&self, kind: PushEventKind, handler: EventHandler) -> Subscription;

    /// Best-effort emission. Never fails; without a live session it is a
    /// logged no-op.
    fn emit(&self, event: OutboundEvent);
}
