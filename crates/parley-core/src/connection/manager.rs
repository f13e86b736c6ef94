//! ConnectionManager: owner of the one push session per authenticated user.
//!
//! A session is born on a successful handshake and lives in a driver task
//! that multiplexes outbound emits, inbound frames and cancellation. When the
//! link drops mid-session the driver reconnects on its own with a bounded
//! number of attempts, asking the credential source again before each
//! handshake. None of that is visible to emitters: `emit` never fails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_types::error::PushError;
use parley_types::event::{InboundEvent, OutboundEvent, PushEventKind};
use parley_types::id::UserId;

use crate::credential::CredentialSource;

use super::hub::{EventHandler, EventHub, Subscription};
use super::transport::{PushLink, PushTransport};
use super::PushChannel;

/// Fixed-delay, fixed-count reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// The link dropped; `attempt` counts reconnection tries from 1.
    Reconnecting { attempt: u32 },
    /// Terminal. The next `connect` performs a full handshake.
    Closed,
}

/// Cloneable handle to a live (or formerly live) session.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    user: UserId,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    status: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// A receiver that observes every status change of this session.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.status() == ConnectionStatus::Closed || self.cancel.is_cancelled()
    }

    /// Queue `event` for the driver. Returns false when the driver is gone.
    fn enqueue(&self, event: OutboundEvent) -> bool {
        self.outbound.send(event).is_ok()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("status", &self.status())
            .finish()
    }
}

struct LiveSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

/// Owns the push session and the subscription registry.
///
/// Subscriptions are held by the manager rather than the session, so they
/// survive reconnects and even a disconnect/connect cycle.
pub struct ConnectionManager<T: PushTransport, C: CredentialSource> {
    transport: Arc<T>,
    credentials: Arc<C>,
    hub: EventHub,
    policy: ReconnectPolicy,
    next_session: AtomicU64,
    /// Serializes connect/disconnect; a concurrent second `connect` waits here.
    session: Mutex<Option<LiveSession>>,
    /// Mirror of the live handle for the synchronous `emit` path.
    current: RwLock<Option<SessionHandle>>,
}

impl<T, C> ConnectionManager<T, C>
where
    T: PushTransport,
    C: CredentialSource + 'static,
{
    pub fn new(transport: T, credentials: C, policy: ReconnectPolicy) -> Self {
        Self {
            transport: Arc::new(transport),
            credentials: Arc::new(credentials),
            hub: EventHub::new(),
            policy,
            next_session: AtomicU64::new(1),
            session: Mutex::new(None),
            current: RwLock::new(None),
        }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// The current session handle, if one was established and not torn down.
    pub fn session(&self) -> Option<SessionHandle> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Establish the session for `user`.
    ///
    /// - Already connected as `user`: returns the existing session.
    /// - Connected as someone else: that session is torn down first.
    /// - No credential available: returns `Ok(None)` without touching the
    ///   transport.
    /// - Handshake rejected: returns the error and leaves no session behind.
    pub async fn connect(&self, user: &UserId) -> Result<Option<SessionHandle>, PushError> {
        let mut live = self.session.lock().await;

        if let Some(existing) = live.as_ref() {
            if existing.handle.user() == user && !existing.handle.is_closed() {
                debug!(user = %user, session = existing.handle.id(), "push session already established");
                return Ok(Some(existing.handle.clone()));
            }
        }
        if let Some(previous) = live.take() {
            self.set_current(None);
            shutdown(previous).await;
        }

        let Some(credential) = self.credentials.credential().await else {
            info!(user = %user, source = self.credentials.name(), "no credential available, not connecting");
            return Ok(None);
        };

        let link = self.transport.open(user, &credential).await.map_err(|e| {
            warn!(user = %user, error = %e, "push handshake failed");
            e
        })?;
        drop(credential);

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let cancel = CancellationToken::new();

        let handle = SessionHandle {
            id,
            user: user.clone(),
            outbound: outbound_tx,
            status: status_rx,
            cancel: cancel.clone(),
        };

        let driver = Driver {
            session: id,
            user: user.clone(),
            transport: Arc::clone(&self.transport),
            credentials: Arc::clone(&self.credentials),
            hub: self.hub.clone(),
            policy: self.policy,
            outbound: outbound_rx,
            status: status_tx,
            cancel,
        };
        let task = tokio::spawn(driver.run(link));

        info!(user = %user, session = id, "push session established");
        self.set_current(Some(handle.clone()));
        *live = Some(LiveSession {
            handle: handle.clone(),
            task,
        });
        Ok(Some(handle))
    }

    /// Tear down the session, if any. The next `connect` performs a full
    /// handshake. Subscriptions are kept.
    pub async fn disconnect(&self) {
        let mut live = self.session.lock().await;
        self.set_current(None);
        if let Some(previous) = live.take() {
            let id = previous.handle.id();
            shutdown(previous).await;
            info!(session = id, "push session disconnected");
        }
    }

    fn set_current(&self, handle: Option<SessionHandle>) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handle;
    }
}

impl<T, C> PushChannel for ConnectionManager<T, C>
where
    T: PushTransport,
    C: CredentialSource + 'static,
{
    fn subscribe(&self, kind: PushEventKind, handler: EventHandler) -> Subscription {
        self.hub.subscribe(kind, handler)
    }

    fn emit(&self, event: OutboundEvent) {
        let Some(handle) = self.session() else {
            debug!(event = event.name(), "no push session, emit dropped");
            return;
        };
        if handle.is_closed() {
            debug!(event = event.name(), session = handle.id(), "push session closed, emit dropped");
            return;
        }
        let name = event.name();
        if !handle.enqueue(event) {
            warn!(event = name, session = handle.id(), "push driver gone, emit dropped");
        }
    }
}

async fn shutdown(session: LiveSession) {
    session.handle.cancel.cancel();
    if let Err(e) = session.task.await {
        warn!(session = session.handle.id(), error = %e, "push driver task ended abnormally");
    }
}

enum LinkEnd {
    Cancelled,
    Lost(PushError),
}

struct Driver<T: PushTransport, C: CredentialSource> {
    session: u64,
    user: UserId,
    transport: Arc<T>,
    credentials: Arc<C>,
    hub: EventHub,
    policy: ReconnectPolicy,
    outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    status: watch::Sender<ConnectionStatus>,
    cancel: CancellationToken,
}

impl<T, C> Driver<T, C>
where
    T: PushTransport,
    C: CredentialSource,
{
    async fn run(mut self, mut link: T::Link) {
        loop {
            match self.pump(&mut link).await {
                LinkEnd::Cancelled => {
                    self.flush(&mut link).await;
                    link.close().await;
                    break;
                }
                LinkEnd::Lost(reason) => {
                    warn!(session = self.session, user = %self.user, error = %reason, "push link lost");
                    match self.reconnect().await {
                        Some(fresh) => {
                            link = fresh;
                            self.status.send_replace(ConnectionStatus::Connected);
                        }
                        None => break,
                    }
                }
            }
        }
        self.status.send_replace(ConnectionStatus::Closed);
        debug!(session = self.session, "push driver stopped");
    }

    async fn pump(&mut self, link: &mut T::Link) -> LinkEnd {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return LinkEnd::Cancelled,
                Some(event) = self.outbound.recv() => {
                    match link.send(&event).await {
                        Ok(()) => debug!(session = self.session, event = event.name(), "push event emitted"),
                        Err(PushError::Frame(reason)) => {
                            warn!(session = self.session, event = event.name(), %reason, "push event not encodable, dropped");
                        }
                        Err(e) => {
                            warn!(session = self.session, event = event.name(), error = %e, "push emit failed");
                            return LinkEnd::Lost(e);
                        }
                    }
                }
                inbound = link.next() => match inbound {
                    Some(Ok(event)) => self.deliver(&event),
                    Some(Err(PushError::Frame(reason))) => {
                        warn!(session = self.session, %reason, "malformed push frame skipped");
                    }
                    Some(Err(e)) => return LinkEnd::Lost(e),
                    None => return LinkEnd::Lost(PushError::Closed),
                },
            }
        }
    }

    /// Send whatever was queued before cancellation, stopping at the first
    /// transport failure.
    async fn flush(&mut self, link: &mut T::Link) {
        while let Ok(event) = self.outbound.try_recv() {
            match link.send(&event).await {
                Ok(()) | Err(PushError::Frame(_)) => {}
                Err(e) => {
                    debug!(session = self.session, event = event.name(), error = %e, "queued push events dropped at shutdown");
                    break;
                }
            }
        }
    }

    fn deliver(&self, event: &InboundEvent) {
        let delivered = self.hub.dispatch(event);
        if delivered == 0 {
            debug!(session = self.session, kind = %event.kind(), "push event had no subscribers");
        }
    }

    /// Bounded reconnection. `None` ends the session.
    async fn reconnect(&mut self) -> Option<T::Link> {
        for attempt in 1..=self.policy.max_attempts {
            self.status
                .send_replace(ConnectionStatus::Reconnecting { attempt });

            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.policy.delay) => {}
            }

            let Some(credential) = self.credentials.credential().await else {
                warn!(session = self.session, user = %self.user, "credential no longer available, ending push session");
                return None;
            };

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                opened = self.transport.open(&self.user, &credential) => opened,
            };

            match opened {
                Ok(link) => {
                    info!(session = self.session, attempt, "push session re-established");
                    return Some(link);
                }
                Err(PushError::Unauthorized) => {
                    warn!(session = self.session, user = %self.user, "push reconnect rejected as unauthorized, ending session");
                    return None;
                }
                Err(e) => {
                    warn!(session = self.session, attempt, max = self.policy.max_attempts, error = %e, "push reconnect attempt failed");
                }
            }
        }
        warn!(session = self.session, attempts = self.policy.max_attempts, "push reconnection exhausted, ending session");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use crate::testing::{CountingCredentials, FakeTransport, OpenScript, received_message};

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }

    fn manager(
        transport: FakeTransport,
        credentials: CountingCredentials,
    ) -> ConnectionManager<FakeTransport, CountingCredentials> {
        ConnectionManager::new(transport, credentials, policy())
    }

    #[tokio::test]
    async fn connect_without_credential_never_opens_transport() {
        let transport = FakeTransport::new();
        let probe = transport.probe();
        let manager = manager(transport, CountingCredentials::signed_out());

        let session = manager.connect(&UserId::from("u1")).await.unwrap();

        assert!(session.is_none());
        assert_eq!(probe.open_count(), 0);
        assert!(manager.session().is_none());
    }

    #[tokio::test]
    async fn connect_is_idempotent_for_the_same_user() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        let probe = transport.probe();
        let credentials = CountingCredentials::new("tok");
        let calls = credentials.calls();
        let manager = manager(transport, credentials);
        let user = UserId::from("u1");

        let (a, b) = tokio::join!(manager.connect(&user), manager.connect(&user));
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();

        assert_eq!(a.id(), b.id());
        assert_eq!(probe.open_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn handshake_error_is_returned_and_leaves_no_session() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Reject(PushError::Unauthorized));
        let manager = manager(transport, CountingCredentials::new("stale"));

        let err = manager.connect(&UserId::from("u1")).await.unwrap_err();

        assert_eq!(err, PushError::Unauthorized);
        assert!(manager.session().is_none());
    }

    #[tokio::test]
    async fn handshake_receives_current_credential_and_user() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        let probe = transport.probe();
        let manager = manager(transport, CountingCredentials::new("tok-42"));

        manager.connect(&UserId::from("u7")).await.unwrap();

        assert_eq!(probe.handshakes(), vec![("u7".to_string(), "tok-42".to_string())]);
    }

    #[tokio::test]
    async fn emit_without_session_is_a_noop() {
        let manager = manager(FakeTransport::new(), CountingCredentials::signed_out());
        manager.emit(OutboundEvent::Typing(parley_types::event::TypingSignal {
            conversation_id: None,
            user_id: "u1".into(),
            is_typing: true,
        }));
        assert!(manager.session().is_none());
    }

    #[tokio::test]
    async fn emit_reaches_the_link_and_inbound_reaches_subscribers() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        let mut remotes = transport.take_remotes();
        let manager = manager(transport, CountingCredentials::new("tok"));

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = manager
            .hub()
            .on_message_received(move |m| sink.lock().unwrap().push(m.id.to_string()));

        manager.connect(&UserId::from("u1")).await.unwrap();
        let mut remote = remotes.recv().await.unwrap();

        let typing = OutboundEvent::Typing(parley_types::event::TypingSignal {
            conversation_id: Some("c1".into()),
            user_id: "u1".into(),
            is_typing: true,
        });
        manager.emit(typing.clone());
        assert_eq!(remote.outbound.recv().await.unwrap(), typing);

        remote.push(Ok(received_message("m1", "c1", "u2")));
        remote.push(Ok(received_message("m2", "c1", "u2")));
        remote.flushed().await;
        assert_eq!(*seen.lock().unwrap(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped_without_dropping_the_link() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        let probe = transport.probe();
        let mut remotes = transport.take_remotes();
        let manager = manager(transport, CountingCredentials::new("tok"));

        let count = Arc::new(StdMutex::new(0));
        let sink = Arc::clone(&count);
        let _sub = manager
            .hub()
            .on_message_received(move |_| *sink.lock().unwrap() += 1);

        let session = manager.connect(&UserId::from("u1")).await.unwrap().unwrap();
        let remote = remotes.recv().await.unwrap();

        remote.push(Err(PushError::Frame("not json".into())));
        remote.push(Ok(received_message("m1", "c1", "u2")));
        remote.flushed().await;

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(probe.open_count(), 1);
        assert_eq!(session.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_reconnects_with_a_fresh_credential() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        transport.script(OpenScript::Accept);
        let probe = transport.probe();
        let mut remotes = transport.take_remotes();
        let credentials = CountingCredentials::new("tok-1");
        let token = credentials.token_slot();
        let calls = credentials.calls();
        let manager = manager(transport, credentials);

        let session = manager.connect(&UserId::from("u1")).await.unwrap().unwrap();
        let first = remotes.recv().await.unwrap();

        *token.lock().unwrap() = Some("tok-2".to_string());
        first.push(Err(PushError::Transport("reset by peer".into())));

        let _second = remotes.recv().await.unwrap();
        let mut status = session.watch_status();
        status
            .wait_for(|s| *s == ConnectionStatus::Connected)
            .await
            .unwrap();

        assert_eq!(probe.open_count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(probe.handshakes()[1].1, "tok-2");
    }

    #[tokio::test(start_paused = true)]
    async fn reconnection_is_bounded() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        for _ in 0..10 {
            transport.script(OpenScript::Reject(PushError::Handshake("refused".into())));
        }
        let probe = transport.probe();
        let mut remotes = transport.take_remotes();
        let manager = manager(transport, CountingCredentials::new("tok"));

        let session = manager.connect(&UserId::from("u1")).await.unwrap().unwrap();
        let remote = remotes.recv().await.unwrap();
        drop(remote);

        let mut status = session.watch_status();
        status
            .wait_for(|s| *s == ConnectionStatus::Closed)
            .await
            .unwrap();

        assert_eq!(probe.open_count(), 1 + policy().max_attempts as usize);
        assert!(session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_reconnect_ends_the_session() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        transport.script(OpenScript::Reject(PushError::Unauthorized));
        transport.script(OpenScript::Accept);
        let probe = transport.probe();
        let mut remotes = transport.take_remotes();
        let manager = manager(transport, CountingCredentials::new("tok"));

        let session = manager.connect(&UserId::from("u1")).await.unwrap().unwrap();
        let remote = remotes.recv().await.unwrap();
        remote.push(Err(PushError::Transport("eof".into())));

        let mut status = session.watch_status();
        status
            .wait_for(|s| *s == ConnectionStatus::Closed)
            .await
            .unwrap();

        assert_eq!(probe.open_count(), 2);
    }

    #[tokio::test]
    async fn disconnect_clears_session_and_next_connect_handshakes_again() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        transport.script(OpenScript::Accept);
        let probe = transport.probe();
        let manager = manager(transport, CountingCredentials::new("tok"));
        let user = UserId::from("u1");

        let first = manager.connect(&user).await.unwrap().unwrap();
        manager.disconnect().await;

        assert!(manager.session().is_none());
        assert!(first.is_closed());
        assert_eq!(probe.closed_links(), 1);

        let second = manager.connect(&user).await.unwrap().unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(probe.open_count(), 2);
    }

    #[tokio::test]
    async fn disconnect_flushes_queued_emits() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        let mut remotes = transport.take_remotes();
        let manager = manager(transport, CountingCredentials::new("tok"));

        manager.connect(&UserId::from("u1")).await.unwrap();
        let mut remote = remotes.recv().await.unwrap();

        let typing = OutboundEvent::Typing(parley_types::event::TypingSignal {
            conversation_id: Some("c1".into()),
            user_id: "u1".into(),
            is_typing: false,
        });
        manager.emit(typing.clone());
        manager.disconnect().await;

        assert_eq!(remote.outbound.recv().await.unwrap(), typing);
    }

    #[tokio::test]
    async fn connecting_as_another_user_replaces_the_session() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        transport.script(OpenScript::Accept);
        let probe = transport.probe();
        let manager = manager(transport, CountingCredentials::new("tok"));

        let alice = manager.connect(&UserId::from("alice")).await.unwrap().unwrap();
        let bob = manager.connect(&UserId::from("bob")).await.unwrap().unwrap();

        assert!(alice.is_closed());
        assert_eq!(bob.user().as_str(), "bob");
        assert_eq!(manager.session().unwrap().id(), bob.id());
        assert_eq!(probe.closed_links(), 1);
    }

    #[tokio::test]
    async fn subscriptions_survive_a_disconnect_cycle() {
        let transport = FakeTransport::new();
        transport.script(OpenScript::Accept);
        transport.script(OpenScript::Accept);
        let mut remotes = transport.take_remotes();
        let manager = manager(transport, CountingCredentials::new("tok"));
        let user = UserId::from("u1");

        let count = Arc::new(StdMutex::new(0));
        let sink = Arc::clone(&count);
        let _sub = manager
            .hub()
            .on_message_received(move |_| *sink.lock().unwrap() += 1);

        manager.connect(&user).await.unwrap();
        let _first = remotes.recv().await.unwrap();
        manager.disconnect().await;
        manager.connect(&user).await.unwrap();
        let second = remotes.recv().await.unwrap();

        second.push(Ok(received_message("m1", "c1", "u2")));
        second.flushed().await;
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
