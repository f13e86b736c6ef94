//! Subscription registry for inbound push events.
//!
//! The `EventHub` fans each inbound event out to the handlers registered for
//! its kind. Every `subscribe` call returns its own [`Subscription`]; dropping
//! it, or calling [`Subscription::unsubscribe`], removes exactly that handler.
//! A handler that has been removed is never invoked by a later dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, trace};

use parley_types::event::{DeletedMessage, InboundEvent, PushEventKind, ReadReceipt, TypingSignal};
use parley_types::message::Message;

/// Callback invoked for every matching inbound event.
///
/// Handlers run on the connection driver task and must not block; the usual
/// handler filters the event and forwards it into a channel.
pub type EventHandler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

struct Registration {
    kind: PushEventKind,
    handler: EventHandler,
}

struct HubInner {
    handlers: DashMap<u64, Registration>,
    next_id: AtomicU64,
}

/// Cheaply cloneable registry of push event handlers.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                handlers: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe(&self, kind: PushEventKind, handler: EventHandler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .insert(id, Registration { kind, handler });
        debug!(subscription = id, %kind, "push subscription added");
        Subscription {
            id,
            kind,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn on_message_received(
        &self,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            PushEventKind::MessageReceived,
            Arc::new(move |event| {
                if let InboundEvent::ReceiveMessage(message) = event {
                    handler(message);
                }
            }),
        )
    }

    pub fn on_message_deleted(
        &self,
        handler: impl Fn(&DeletedMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            PushEventKind::MessageDeleted,
            Arc::new(move |event| {
                if let InboundEvent::MessageDeleted(deleted) = event {
                    handler(deleted);
                }
            }),
        )
    }

    pub fn on_message_updated(
        &self,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            PushEventKind::MessageUpdated,
            Arc::new(move |event| {
                if let InboundEvent::MessageUpdated(message) = event {
                    handler(message);
                }
            }),
        )
    }

    pub fn on_typing(
        &self,
        handler: impl Fn(&TypingSignal) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            PushEventKind::Typing,
            Arc::new(move |event| {
                if let InboundEvent::UserTyping(signal) = event {
                    handler(signal);
                }
            }),
        )
    }

    pub fn on_messages_read(
        &self,
        handler: impl Fn(&ReadReceipt) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            PushEventKind::MessagesRead,
            Arc::new(move |event| {
                if let InboundEvent::MessagesRead(receipt) = event {
                    handler(receipt);
                }
            }),
        )
    }

    /// Deliver `event` to every handler registered for its kind.
    ///
    /// Handlers are collected first and invoked without holding any map
    /// guard, so a handler may unsubscribe itself or others. Returns the
    /// number of handlers invoked.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let kind = event.kind();
        let mut matching: Vec<(u64, EventHandler)> = self
            .inner
            .handlers
            .iter()
            .filter(|entry| entry.value().kind == kind)
            .map(|entry| (*entry.key(), Arc::clone(&entry.value().handler)))
            .collect();
        // Registration order, so earlier subscribers see events first.
        matching.sort_by_key(|(id, _)| *id);

        let mut delivered = 0;
        for (id, handler) in matching {
            // Skip handlers removed by an earlier handler in this same dispatch.
            if !self.inner.handlers.contains_key(&id) {
                continue;
            }
            handler(event);
            delivered += 1;
        }
        trace!(%kind, delivered, "push event dispatched");
        delivered
    }

    /// Number of live subscriptions across all kinds.
    pub fn subscription_count(&self) -> usize {
        self.inner.handlers.len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("subscriptions", &self.inner.handlers.len())
            .finish()
    }
}

/// Handle for one registered handler. Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    id: u64,
    kind: PushEventKind,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn kind(&self) -> PushEventKind {
        self.kind
    }

    /// Remove the handler now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn remove(&self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.handlers.remove(&self.id).is_some() {
                debug!(subscription = self.id, kind = %self.kind, "push subscription removed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
