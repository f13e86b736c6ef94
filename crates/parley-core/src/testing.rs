//! In-crate fakes for the core ports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, oneshot};

use parley_types::conversation::Conversation;
use parley_types::error::{ApiError, PushError};
use parley_types::event::{InboundEvent, OutboundEvent, PushEventKind};
use parley_types::id::{ConversationId, MessageId, UserId};
use parley_types::message::{Message, NewMessage};

use crate::api::MessageApi;
use crate::connection::{EventHandler, EventHub, PushChannel, PushLink, PushTransport, Subscription};
use crate::credential::CredentialSource;

pub fn message(id: &str, conversation: &str, sender: &str) -> Message {
    Message {
        id: MessageId::from(id),
        content: format!("content of {id}"),
        sender_id: UserId::from(sender),
        conversation_id: ConversationId::from(conversation),
        created_at: Utc::now(),
        updated_at: None,
        is_read: false,
        sender: None,
    }
}

pub fn received_message(id: &str, conversation: &str, sender: &str) -> InboundEvent {
    InboundEvent::ReceiveMessage(message(id, conversation, sender))
}

/// Let spawned tasks run to their next await point.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// MessageApi
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ApiState {
    conversations: Vec<Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,
    next_id: u64,
}

/// A `create_message` call parked by [`FakeApi::hold_creates`].
pub struct PendingCreate {
    pub request: NewMessage,
    respond: oneshot::Sender<Result<Message, ApiError>>,
}

impl PendingCreate {
    pub fn confirm(self, id: &str) {
        let message = Message {
            id: MessageId::from(id),
            content: self.request.content.clone(),
            sender_id: self.request.sender_id.clone(),
            conversation_id: self.request.conversation_id.clone(),
            created_at: Utc::now(),
            updated_at: None,
            is_read: false,
            sender: None,
        };
        let _ = self.respond.send(Ok(message));
    }

    pub fn fail(self, error: ApiError) {
        let _ = self.respond.send(Err(error));
    }
}

/// An `update_message` call parked by [`FakeApi::hold_updates`].
pub struct PendingUpdate {
    pub content: String,
    updated: Message,
    respond: oneshot::Sender<Result<Message, ApiError>>,
}

impl PendingUpdate {
    pub fn confirm(self) {
        let _ = self.respond.send(Ok(self.updated));
    }

    pub fn fail(self, error: ApiError) {
        let _ = self.respond.send(Err(error));
    }
}

/// In-memory persistence service.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<ApiState>,
    gate: Mutex<Option<mpsc::UnboundedSender<PendingCreate>>>,
    update_gate: Mutex<Option<mpsc::UnboundedSender<PendingUpdate>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self, name: &str) -> usize {
        self.state.lock().unwrap().calls.get(name).copied().unwrap_or(0)
    }

    pub fn conversation_count(&self) -> usize {
        self.state.lock().unwrap().conversations.len()
    }

    /// Make the next call of `name` fail with `error`.
    pub fn fail_next(&self, name: &'static str, error: ApiError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(name)
            .or_default()
            .push_back(error);
    }

    pub fn seed_conversation(&self, a: &str, b: &str) -> ConversationId {
        let mut state = self.state.lock().unwrap();
        let id = ConversationId::from(format!("c{}", state.conversations.len() + 1));
        state.conversations.push(Conversation {
            id: id.clone(),
            participant_a: UserId::from(a),
            participant_b: UserId::from(b),
        });
        id
    }

    pub fn seed_messages(&self, conversation: &ConversationId, messages: Vec<Message>) {
        self.state
            .lock()
            .unwrap()
            .messages
            .insert(conversation.clone(), messages);
    }

    /// Park every later `create_message` until the test answers it.
    pub fn hold_creates(&self) -> mpsc::UnboundedReceiver<PendingCreate> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.gate.lock().unwrap() = Some(tx);
        rx
    }

    /// Park every later `update_message` until the test answers it.
    pub fn hold_updates(&self) -> mpsc::UnboundedReceiver<PendingUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.update_gate.lock().unwrap() = Some(tx);
        rx
    }

    fn enter(&self, name: &'static str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(name).or_default() += 1;
        match state.failures.get_mut(name).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl MessageApi for FakeApi {
    async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, ApiError> {
        self.enter("list_messages")?;
        let state = self.state.lock().unwrap();
        Ok(state.messages.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, ApiError> {
        self.enter("create_message")?;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let (respond, answer) = oneshot::channel();
            let _ = gate.send(PendingCreate {
                request: message.clone(),
                respond,
            });
            return answer
                .await
                .unwrap_or_else(|_| Err(ApiError::Network("create abandoned".into())));
        }

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let stored = Message {
            id: MessageId::from(format!("m{}", state.next_id)),
            content: message.content.clone(),
            sender_id: message.sender_id.clone(),
            conversation_id: message.conversation_id.clone(),
            created_at: Utc::now(),
            updated_at: None,
            is_read: false,
            sender: None,
        };
        state
            .messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update_message(&self, id: &MessageId, content: &str) -> Result<Message, ApiError> {
        self.enter("update_message")?;
        let gate = self.update_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let updated = {
                let state = self.state.lock().unwrap();
                let mut found = state
                    .messages
                    .values()
                    .flatten()
                    .find(|m| &m.id == id)
                    .cloned()
                    .ok_or(ApiError::NotFound)?;
                found.content = content.to_string();
                found.updated_at = Some(Utc::now());
                found
            };
            let (respond, answer) = oneshot::channel();
            let _ = gate.send(PendingUpdate {
                content: content.to_string(),
                updated,
                respond,
            });
            return answer
                .await
                .unwrap_or_else(|_| Err(ApiError::Network("update abandoned".into())));
        }

        let mut state = self.state.lock().unwrap();
        let found = state
            .messages
            .values_mut()
            .flat_map(|messages| messages.iter_mut())
            .find(|m| &m.id == id)
            .ok_or(ApiError::NotFound)?;
        found.content = content.to_string();
        found.updated_at = Some(Utc::now());
        Ok(found.clone())
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), ApiError> {
        self.enter("delete_message")?;
        let mut state = self.state.lock().unwrap();
        for messages in state.messages.values_mut() {
            messages.retain(|m| &m.id != id);
        }
        Ok(())
    }

    async fn mark_read(&self, conversation_id: &ConversationId, reader: &UserId) -> Result<(), ApiError> {
        self.enter("mark_read")?;
        let mut state = self.state.lock().unwrap();
        if let Some(messages) = state.messages.get_mut(conversation_id) {
            for m in messages.iter_mut().filter(|m| &m.sender_id != reader) {
                m.is_read = true;
            }
        }
        Ok(())
    }

    async fn find_conversation(
        &self,
        sender: &UserId,
        receiver: &UserId,
    ) -> Result<Option<Conversation>, ApiError> {
        self.enter("find_conversation")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .iter()
            .find(|c| c.is_between(sender, receiver))
            .cloned())
    }

    async fn create_conversation(
        &self,
        sender: &UserId,
        receiver: &UserId,
    ) -> Result<Conversation, ApiError> {
        self.enter("create_conversation")?;
        let mut state = self.state.lock().unwrap();
        let conversation = Conversation {
            id: ConversationId::from(format!("c{}", state.conversations.len() + 1)),
            participant_a: sender.clone(),
            participant_b: receiver.clone(),
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }
}

// ---------------------------------------------------------------------------
// PushChannel
// ---------------------------------------------------------------------------

/// A push channel that records emissions and lets tests deliver events.
#[derive(Default)]
pub struct FakeChannel {
    hub: EventHub,
    emitted: Mutex<Vec<OutboundEvent>>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, event: InboundEvent) -> usize {
        self.hub.dispatch(&event)
    }

    pub fn emitted(&self) -> Vec<OutboundEvent> {
        self.emitted.lock().unwrap().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.hub.subscription_count()
    }
}

impl PushChannel for FakeChannel {
    fn subscribe(&self, kind: PushEventKind, handler: EventHandler) -> Subscription {
        self.hub.subscribe(kind, handler)
    }

    fn emit(&self, event: OutboundEvent) {
        self.emitted.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// CredentialSource
// ---------------------------------------------------------------------------

pub struct CountingCredentials {
    token: Arc<Mutex<Option<String>>>,
    calls: Arc<AtomicUsize>,
}

impl CountingCredentials {
    pub fn new(token: &str) -> Self {
        Self {
            token: Arc::new(Mutex::new(Some(token.to_string()))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            token: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared slot for rotating the credential from a test.
    pub fn token_slot(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.token)
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl CredentialSource for CountingCredentials {
    fn name(&self) -> &str {
        "counting"
    }

    async fn credential(&self) -> Option<SecretString> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let token = self.token.lock().unwrap().clone();
        token.map(SecretString::from)
    }
}

// ---------------------------------------------------------------------------
// PushTransport
// ---------------------------------------------------------------------------

/// Scripted outcome of one `open` call.
pub enum OpenScript {
    Accept,
    Reject(PushError),
}

#[derive(Default)]
struct LinkCounters {
    /// Calls to `next` that started.
    polls: usize,
    /// Items handed out by `next`.
    consumed: usize,
    /// Value of `polls` when the last item was handed out.
    polls_at_last_item: usize,
}

#[derive(Default)]
struct TransportState {
    scripts: Mutex<VecDeque<OpenScript>>,
    opens: AtomicUsize,
    handshakes: Mutex<Vec<(String, String)>>,
    closed_links: AtomicUsize,
}

/// Read-only view of what a [`FakeTransport`] saw.
#[derive(Clone)]
pub struct TransportProbe {
    state: Arc<TransportState>,
}

impl TransportProbe {
    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// `(user, credential)` of every handshake attempt.
    pub fn handshakes(&self) -> Vec<(String, String)> {
        self.state.handshakes.lock().unwrap().clone()
    }

    pub fn closed_links(&self) -> usize {
        self.state.closed_links.load(Ordering::SeqCst)
    }
}

/// The server side of one accepted [`FakeLink`].
pub struct FakeRemote {
    inbound: mpsc::UnboundedSender<Result<InboundEvent, PushError>>,
    pushed: Arc<AtomicUsize>,
    counters: Arc<Mutex<LinkCounters>>,
    pub outbound: mpsc::UnboundedReceiver<OutboundEvent>,
}

impl FakeRemote {
    pub fn push(&self, item: Result<InboundEvent, PushError>) {
        self.pushed.fetch_add(1, Ordering::SeqCst);
        let _ = self.inbound.send(item);
    }

    /// Wait until the driver has handled everything pushed so far.
    pub async fn flushed(&self) {
        loop {
            {
                let counters = self.counters.lock().unwrap();
                if counters.consumed >= self.pushed.load(Ordering::SeqCst)
                    && counters.polls > counters.polls_at_last_item
                {
                    return;
                }
            }
            tokio::task::yield_now().await;
        }
    }
}

pub struct FakeLink {
    inbound: mpsc::UnboundedReceiver<Result<InboundEvent, PushError>>,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    counters: Arc<Mutex<LinkCounters>>,
    state: Arc<TransportState>,
}

impl PushLink for FakeLink {
    async fn send(&mut self, event: &OutboundEvent) -> Result<(), PushError> {
        self.outbound
            .send(event.clone())
            .map_err(|_| PushError::Transport("remote gone".into()))
    }

    async fn next(&mut self) -> Option<Result<InboundEvent, PushError>> {
        self.counters.lock().unwrap().polls += 1;
        let item = self.inbound.recv().await;
        let mut counters = self.counters.lock().unwrap();
        counters.consumed += 1;
        counters.polls_at_last_item = counters.polls;
        item
    }

    async fn close(&mut self) {
        self.state.closed_links.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeTransport {
    state: Arc<TransportState>,
    remotes_tx: mpsc::UnboundedSender<FakeRemote>,
    remotes_rx: Mutex<Option<mpsc::UnboundedReceiver<FakeRemote>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(TransportState::default()),
            remotes_tx,
            remotes_rx: Mutex::new(Some(remotes_rx)),
        }
    }

    /// Queue the outcome of the next unscripted `open`.
    pub fn script(&self, outcome: OpenScript) {
        self.state.scripts.lock().unwrap().push_back(outcome);
    }

    pub fn probe(&self) -> TransportProbe {
        TransportProbe {
            state: Arc::clone(&self.state),
        }
    }

    /// Receiver of the remote end of every accepted link. Until taken,
    /// remotes are buffered and their links stay open.
    pub fn take_remotes(&self) -> mpsc::UnboundedReceiver<FakeRemote> {
        self.remotes_rx
            .lock()
            .unwrap()
            .take()
            .expect("remotes already taken")
    }
}

impl PushTransport for FakeTransport {
    type Link = FakeLink;

    async fn open(&self, user: &UserId, credential: &SecretString) -> Result<FakeLink, PushError> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        self.state
            .handshakes
            .lock()
            .unwrap()
            .push((user.to_string(), credential.expose_secret().to_string()));

        let script = self.state.scripts.lock().unwrap().pop_front();
        match script {
            Some(OpenScript::Accept) => {}
            Some(OpenScript::Reject(error)) => return Err(error),
            None => return Err(PushError::Handshake("no scripted outcome".into())),
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Mutex::new(LinkCounters::default()));

        let _ = self.remotes_tx.send(FakeRemote {
            inbound: inbound_tx,
            pushed: Arc::new(AtomicUsize::new(0)),
            counters: Arc::clone(&counters),
            outbound: outbound_rx,
        });

        Ok(FakeLink {
            inbound: inbound_rx,
            outbound: outbound_tx,
            counters,
            state: Arc::clone(&self.state),
        })
    }
}
