//! ConversationController: the UI-facing orchestrator.
//!
//! The controller owns the active conversation, its [`MessageStore`] and the
//! [`TypingTracker`]. It is mutated only through `&mut self` by its owner;
//! nothing else touches the store.
//!
//! Work that completes later (REST calls on spawned tasks, push deliveries
//! from the connection driver) is funnelled into one internal queue and
//! applied by [`ConversationController::next_update`], which yields a
//! [`ControllerUpdate`] for the UI. Every queued item carries the
//! conversation it was issued for, and items for a conversation that is no
//! longer active are dropped without touching the store.
//!
//! Mutations are dual-written: a REST call (authoritative) and a push
//! emission (low latency) run independently. A REST failure rolls the
//! optimistic change back; a push failure never does.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use parley_types::config::ClientConfig;
use parley_types::error::ApiError;
use parley_types::event::{
    DeletedMessage, InboundEvent, OutboundEvent, OutgoingMessage, PushEventKind, ReadReceipt,
    TypingSignal,
};
use parley_types::id::{ConversationId, MessageId, TEMP_ID_PREFIX, TempId, UserId};
use parley_types::message::{Message, NewMessage};

use crate::api::MessageApi;
use crate::connection::{PushChannel, Subscription};
use crate::resolver::{ConversationResolver, HeldConversation, ResolveError};
use crate::store::{Entry, MessageStore, Reconciled, RemovedEntry};
use crate::typing::TypingTracker;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("no active conversation")]
    NoActiveConversation,

    #[error("message is empty")]
    EmptyMessage,

    #[error("unknown message {0}")]
    UnknownMessage(MessageId),

    #[error("message {0} is still being sent")]
    PendingMessage(MessageId),

    #[error("only the author can change message {0}")]
    NotAuthor(MessageId),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ControllerError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ControllerError::Api(e) | ControllerError::Resolve(ResolveError::Api(e)) => {
                e.user_message()
            }
            other => other.to_string(),
        }
    }
}

/// Something the UI should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerUpdate {
    /// Entries were added, removed or changed.
    MessagesChanged,
    /// A pending entry now carries its durable id.
    Reconciled { temp_id: TempId, id: MessageId },
    /// A send was rolled back.
    SendFailed { temp_id: TempId, error: ApiError },
    /// An edit was rolled back to the previous content.
    EditFailed { id: MessageId, error: ApiError },
    /// A delete was rolled back and the entry restored.
    DeleteFailed { id: MessageId, error: ApiError },
    /// Read flags were reverted.
    MarkReadFailed { error: ApiError },
    /// The set of counterparts currently typing.
    TypingChanged(Vec<UserId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub typing_idle: Duration,
    pub remote_typing_ttl: Duration,
}

impl ControllerSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            typing_idle: config.typing_idle(),
            remote_typing_ttl: config.remote_typing_ttl(),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

enum Internal {
    Push(ConversationId, InboundEvent),
    Sent {
        conversation_id: ConversationId,
        temp_id: TempId,
        result: Result<Message, ApiError>,
    },
    Edited {
        conversation_id: ConversationId,
        id: MessageId,
        revision: u64,
        result: Result<Message, ApiError>,
    },
    Deleted {
        conversation_id: ConversationId,
        removed: RemovedEntry,
        result: Result<(), ApiError>,
    },
    ReadMarked {
        conversation_id: ConversationId,
        flipped: Vec<MessageId>,
        result: Result<(), ApiError>,
    },
}

impl Internal {
    fn conversation_id(&self) -> &ConversationId {
        match self {
            Internal::Push(id, _) => id,
            Internal::Sent {
                conversation_id, ..
            }
            | Internal::Edited {
                conversation_id, ..
            }
            | Internal::Deleted {
                conversation_id, ..
            }
            | Internal::ReadMarked {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Which push events belong to the active conversation.
struct Scope {
    conversation_id: ConversationId,
    self_id: UserId,
    counterpart: UserId,
}

impl Scope {
    fn accepts(&self, event: &InboundEvent) -> bool {
        match event {
            InboundEvent::ReceiveMessage(m) | InboundEvent::MessageUpdated(m) => {
                m.conversation_id == self.conversation_id
            }
            InboundEvent::UserTyping(signal) => {
                signal.user_id != self.self_id
                    && match &signal.conversation_id {
                        Some(id) => id == &self.conversation_id,
                        None => signal.user_id == self.counterpart,
                    }
            }
            // Untagged deletes are matched by id in the store.
            InboundEvent::MessageDeleted(deleted) => deleted
                .conversation_id
                .as_ref()
                .is_none_or(|id| id == &self.conversation_id),
            InboundEvent::MessagesRead(receipt) => receipt.conversation_id == self.conversation_id,
        }
    }
}

struct ActiveConversation {
    id: ConversationId,
    counterpart: UserId,
    store: MessageStore,
    edits: HashMap<MessageId, EditChain>,
    /// Dropping these unsubscribes.
    bindings: Vec<Subscription>,
}

/// Local edits of one message that the server has not all answered.
///
/// The store shows the newest local edit until it is answered, then the
/// newest content the server confirmed. Answers may arrive in any order.
struct EditChain {
    settled: Message,
    settled_revision: u64,
    /// Revision of the newest local edit, while it is unanswered.
    optimistic: Option<u64>,
    latest: u64,
    in_flight: usize,
}

impl EditChain {
    fn new(settled: Message) -> Self {
        Self {
            settled,
            settled_revision: 0,
            optimistic: None,
            latest: 0,
            in_flight: 0,
        }
    }

    fn begin(&mut self) -> u64 {
        self.latest += 1;
        self.in_flight += 1;
        self.optimistic = Some(self.latest);
        self.latest
    }

    /// Record the answer to `revision`. Returns what the store should show
    /// now, or `None` while a newer local edit is unanswered.
    fn finish(&mut self, revision: u64, confirmed: Option<Message>) -> Option<&Message> {
        self.in_flight = self.in_flight.saturating_sub(1);
        if let Some(message) = confirmed {
            if revision > self.settled_revision {
                self.settled = message;
                self.settled_revision = revision;
            }
        }
        if self.optimistic == Some(revision) {
            self.optimistic = None;
        }
        self.optimistic.is_none().then_some(&self.settled)
    }

    /// A push update is what the server holds now.
    fn observe(&mut self, message: Message) -> bool {
        self.settled = message;
        self.optimistic.is_none()
    }
}

pub struct ConversationController<A: MessageApi> {
    self_id: UserId,
    api: Arc<A>,
    push: Arc<dyn PushChannel>,
    resolver: ConversationResolver<A>,
    active: Option<ActiveConversation>,
    typing: TypingTracker,
    tx: mpsc::UnboundedSender<Internal>,
    rx: mpsc::UnboundedReceiver<Internal>,
}

impl<A: MessageApi + 'static> ConversationController<A> {
    pub fn new(
        self_id: UserId,
        api: Arc<A>,
        push: Arc<dyn PushChannel>,
        settings: ControllerSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            typing: TypingTracker::new(
                self_id.clone(),
                settings.typing_idle,
                settings.remote_typing_ttl,
            ),
            resolver: ConversationResolver::new(Arc::clone(&api)),
            self_id,
            api,
            push,
            active: None,
            tx,
            rx,
        }
    }

    pub fn self_id(&self) -> &UserId {
        &self.self_id
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref().map(|a| &a.id)
    }

    pub fn counterpart(&self) -> Option<&UserId> {
        self.active.as_ref().map(|a| &a.counterpart)
    }

    pub fn store(&self) -> Option<&MessageStore> {
        self.active.as_ref().map(|a| &a.store)
    }

    /// Visible entries of the active conversation, in arrival order.
    pub fn entries(&self) -> Vec<&Entry> {
        self.store()
            .map(|store| store.entries().collect())
            .unwrap_or_default()
    }

    pub fn typing_users(&self) -> Vec<UserId> {
        self.typing.active()
    }

    /// Resolve the conversation with `counterpart` and make it active.
    ///
    /// Opening the conversation that is already active and loaded does not
    /// reload it.
    pub async fn open_with(
        &mut self,
        counterpart: &UserId,
    ) -> Result<ConversationId, ControllerError> {
        let held = self
            .active
            .as_ref()
            .filter(|a| &a.counterpart == counterpart)
            .map(|a| HeldConversation {
                id: &a.id,
                loaded_messages: a.store.len(),
            });
        let (id, resolution) = self
            .resolver
            .resolve_or_create(&self.self_id, counterpart, held)
            .await?;
        debug!(conversation_id = %id, ?resolution, "conversation resolved");

        let already_active = self
            .active
            .as_ref()
            .is_some_and(|a| a.id == id && a.store.is_loaded());
        if !already_active {
            self.activate(id.clone(), counterpart.clone()).await?;
        }
        Ok(id)
    }

    /// Make `conversation_id` the active conversation.
    ///
    /// The previous conversation is deactivated first. The store is loaded,
    /// then push bindings scoped to this conversation are created, then the
    /// counterpart's messages are marked read.
    pub async fn activate(
        &mut self,
        conversation_id: ConversationId,
        counterpart: UserId,
    ) -> Result<(), ControllerError> {
        self.deactivate();

        let messages = self.api.list_messages(&conversation_id).await?;
        let mut store = MessageStore::new(conversation_id.clone());
        store.replace_all(messages);

        let bindings = self.bind(&conversation_id, &counterpart);
        info!(conversation_id = %conversation_id, %counterpart, messages = store.len(), "conversation active");
        self.active = Some(ActiveConversation {
            id: conversation_id,
            counterpart,
            store,
            edits: HashMap::new(),
            bindings,
        });

        self.mark_read_if_unread();
        Ok(())
    }

    /// Re-fetch the active conversation from the persistence service.
    pub async fn load(&mut self) -> Result<(), ControllerError> {
        let id = self
            .active
            .as_ref()
            .map(|a| a.id.clone())
            .ok_or(ControllerError::NoActiveConversation)?;

        let messages = self.api.list_messages(&id).await?;
        let active = self
            .active
            .as_mut()
            .ok_or(ControllerError::NoActiveConversation)?;
        active.store.replace_all(messages);
        active.edits.clear();
        debug!(conversation_id = %id, messages = active.store.len(), "conversation reloaded");

        self.mark_read_if_unread();
        Ok(())
    }

    /// Drop the active conversation. Push bindings are removed before this
    /// returns. In-flight REST work is left to finish and then ignored.
    pub fn deactivate(&mut self) -> Option<ConversationId> {
        let active = self.active.take()?;
        let ActiveConversation { id, bindings, .. } = active;
        drop(bindings);

        if let Some(is_typing) = self.typing.clear() {
            self.emit_typing(&id, is_typing);
        }
        debug!(conversation_id = %id, "conversation inactive");
        Some(id)
    }

    /// Send `content` optimistically. Returns the pending entry's temporary id.
    pub fn send(&mut self, content: &str) -> Result<TempId, ControllerError> {
        if content.trim().is_empty() {
            return Err(ControllerError::EmptyMessage);
        }
        let active = self
            .active
            .as_mut()
            .ok_or(ControllerError::NoActiveConversation)?;

        let temp_id = active
            .store
            .push_pending(content.to_string(), self.self_id.clone());
        let conversation_id = active.id.clone();

        let request = NewMessage {
            content: content.to_string(),
            conversation_id: conversation_id.clone(),
            sender_id: self.self_id.clone(),
        };
        let api = Arc::clone(&self.api);
        let issued_for = conversation_id.clone();
        spawn_request(self.tx.clone(), async move {
            let result = api.create_message(&request).await;
            Internal::Sent {
                conversation_id: issued_for,
                temp_id,
                result,
            }
        });

        let now = Utc::now();
        self.push.emit(OutboundEvent::SendMessage(OutgoingMessage {
            conversation_id: conversation_id.clone(),
            content: content.to_string(),
            sender_id: self.self_id.clone(),
            created_at: now,
            updated_at: now,
            is_read: false,
        }));

        if let Some(is_typing) = self.typing.on_send() {
            self.emit_typing(&conversation_id, is_typing);
        }
        debug!(conversation_id = %conversation_id, %temp_id, "message sent optimistically");
        Ok(temp_id)
    }

    /// Change the content of one of the local user's confirmed messages.
    pub fn edit(&mut self, id: &MessageId, content: &str) -> Result<(), ControllerError> {
        if content.trim().is_empty() {
            return Err(ControllerError::EmptyMessage);
        }
        let active = self.authored_entry(id)?;

        let previous = active
            .store
            .edit_content(id, content.to_string())
            .ok_or_else(|| ControllerError::UnknownMessage(id.clone()))?;
        let edited = active
            .store
            .get(id)
            .map(|entry| entry.message.clone())
            .ok_or_else(|| ControllerError::UnknownMessage(id.clone()))?;
        let conversation_id = active.id.clone();
        let revision = active
            .edits
            .entry(id.clone())
            .or_insert_with(|| EditChain::new(previous))
            .begin();

        let api = Arc::clone(&self.api);
        let message_id = id.clone();
        let new_content = content.to_string();
        spawn_request(self.tx.clone(), async move {
            let result = api.update_message(&message_id, &new_content).await;
            Internal::Edited {
                conversation_id,
                id: message_id,
                revision,
                result,
            }
        });

        self.push.emit(OutboundEvent::UpdateMessage(edited));
        Ok(())
    }

    /// Delete one of the local user's confirmed messages.
    pub fn delete(&mut self, id: &MessageId) -> Result<(), ControllerError> {
        let active = self.authored_entry(id)?;

        let removed = active
            .store
            .apply_remote_delete(id)
            .ok_or_else(|| ControllerError::UnknownMessage(id.clone()))?;
        let conversation_id = active.id.clone();

        self.push.emit(OutboundEvent::DeleteMessage(DeletedMessage {
            id: id.clone(),
            conversation_id: Some(conversation_id.clone()),
        }));

        let api = Arc::clone(&self.api);
        let message_id = id.clone();
        spawn_request(self.tx.clone(), async move {
            let result = api.delete_message(&message_id).await;
            Internal::Deleted {
                conversation_id,
                removed,
                result,
            }
        });
        Ok(())
    }

    /// Mark every counterpart message of the active conversation as read.
    ///
    /// Returns the number of entries that flipped locally.
    pub fn mark_read(&mut self) -> Result<usize, ControllerError> {
        let active = self
            .active
            .as_mut()
            .ok_or(ControllerError::NoActiveConversation)?;
        let flipped = active.store.mark_all_counterpart_read(&self.self_id);
        let count = flipped.len();
        let conversation_id = active.id.clone();

        let api = Arc::clone(&self.api);
        let reader = self.self_id.clone();
        let issued_for = conversation_id.clone();
        spawn_request(self.tx.clone(), async move {
            let result = api.mark_read(&issued_for, &reader).await;
            Internal::ReadMarked {
                conversation_id: issued_for,
                flipped,
                result,
            }
        });

        self.push.emit(OutboundEvent::MarkRead(ReadReceipt {
            conversation_id,
            user_id: self.self_id.clone(),
        }));
        Ok(count)
    }

    /// Report local typing activity. Signals are debounced.
    pub fn set_typing(&mut self, is_typing: bool) -> Result<(), ControllerError> {
        let id = self
            .active
            .as_ref()
            .map(|a| a.id.clone())
            .ok_or(ControllerError::NoActiveConversation)?;
        if let Some(signal) = self.typing.set_local(is_typing, Instant::now()) {
            self.emit_typing(&id, signal);
        }
        Ok(())
    }

    /// Wait for the next change worth showing.
    ///
    /// Cancel safe: nothing is lost if the future is dropped before it
    /// resolves.
    pub async fn next_update(&mut self) -> ControllerUpdate {
        loop {
            let deadline = self.typing.next_deadline();
            tokio::select! {
                Some(internal) = self.rx.recv() => {
                    if let Some(update) = self.apply(internal) {
                        return update;
                    }
                }
                _ = deadline_elapsed(deadline) => {
                    if let Some(update) = self.on_typing_deadline() {
                        return update;
                    }
                }
            }
        }
    }

    /// Apply whatever is already queued, without waiting.
    pub fn try_next_update(&mut self) -> Option<ControllerUpdate> {
        if self
            .typing
            .next_deadline()
            .is_some_and(|deadline| deadline <= Instant::now())
        {
            if let Some(update) = self.on_typing_deadline() {
                return Some(update);
            }
        }
        while let Ok(internal) = self.rx.try_recv() {
            if let Some(update) = self.apply(internal) {
                return Some(update);
            }
        }
        None
    }

    fn apply(&mut self, internal: Internal) -> Option<ControllerUpdate> {
        let Some(active) = self
            .active
            .as_mut()
            .filter(|a| &a.id == internal.conversation_id())
        else {
            return self.apply_stale(internal);
        };

        match internal {
            Internal::Push(_, event) => match event {
                InboundEvent::ReceiveMessage(message) => {
                    let cleared = self.typing.on_remote_message(&message.sender_id);
                    if active.store.apply_remote_insert(message) {
                        Some(ControllerUpdate::MessagesChanged)
                    } else if cleared {
                        Some(ControllerUpdate::TypingChanged(self.typing.active()))
                    } else {
                        None
                    }
                }
                InboundEvent::MessageUpdated(message) => {
                    if let Some(chain) = active.edits.get_mut(&message.id) {
                        if !chain.observe(message.clone()) {
                            // The local edit stays on screen until answered.
                            return None;
                        }
                    }
                    active
                        .store
                        .apply_remote_edit(message)
                        .map(|_| ControllerUpdate::MessagesChanged)
                }
                InboundEvent::MessageDeleted(deleted) => active
                    .store
                    .apply_remote_delete(&deleted.id)
                    .map(|_| ControllerUpdate::MessagesChanged),
                InboundEvent::MessagesRead(receipt) => {
                    let flipped = active.store.mark_read_by(&receipt.user_id);
                    (!flipped.is_empty()).then_some(ControllerUpdate::MessagesChanged)
                }
                InboundEvent::UserTyping(signal) => self
                    .typing
                    .on_remote_typing(&signal.user_id, signal.is_typing, Instant::now())
                    .then(|| ControllerUpdate::TypingChanged(self.typing.active())),
            },

            Internal::Sent {
                temp_id, result, ..
            } => match result {
                Ok(message) => {
                    let id = message.id.clone();
                    match active.store.reconcile(temp_id, message.clone()) {
                        Reconciled::InPlace | Reconciled::MergedWithEcho => {}
                        Reconciled::Missing => {
                            // A reload replaced the store while the send was in flight.
                            active.store.apply_remote_insert(message);
                        }
                    }
                    debug!(%temp_id, message_id = %id, "send confirmed");
                    Some(ControllerUpdate::Reconciled { temp_id, id })
                }
                Err(error) => {
                    active.store.rollback(temp_id);
                    warn!(%temp_id, error = %error, "send failed, rolled back");
                    Some(ControllerUpdate::SendFailed { temp_id, error })
                }
            },

            Internal::Edited {
                id,
                revision,
                result,
                ..
            } => {
                let (confirmed, error) = match result {
                    Ok(message) => (Some(message), None),
                    Err(error) => (None, Some(error)),
                };
                let shown = match active.edits.get_mut(&id) {
                    Some(chain) => {
                        let shown = chain.finish(revision, confirmed).cloned();
                        if chain.in_flight == 0 {
                            active.edits.remove(&id);
                        }
                        shown
                    }
                    // A reload dropped the chain; only a confirmation is news.
                    None => confirmed,
                };
                let changed = shown
                    .and_then(|message| active.store.apply_remote_edit(message))
                    .is_some();

                match error {
                    Some(error) => {
                        warn!(message_id = %id, revision, error = %error, "edit failed, rolled back");
                        Some(ControllerUpdate::EditFailed { id, error })
                    }
                    None => changed.then_some(ControllerUpdate::MessagesChanged),
                }
            }

            Internal::Deleted {
                removed, result, ..
            } => match result {
                Ok(()) => None,
                Err(error) => {
                    let id = removed.entry.message.id.clone();
                    active.store.restore(removed);
                    warn!(message_id = %id, error = %error, "delete failed, restored");
                    Some(ControllerUpdate::DeleteFailed { id, error })
                }
            },

            Internal::ReadMarked {
                flipped, result, ..
            } => match result {
                Ok(()) => None,
                Err(error) => {
                    active.store.mark_unread(&flipped);
                    warn!(error = %error, "mark read failed, flags reverted");
                    Some(ControllerUpdate::MarkReadFailed { error })
                }
            },
        }
    }

    /// Completions for a conversation that is no longer active never touch
    /// state, but failures are still surfaced.
    fn apply_stale(&mut self, internal: Internal) -> Option<ControllerUpdate> {
        debug!(conversation_id = %internal.conversation_id(), "work for inactive conversation discarded");
        match internal {
            Internal::Push(..) => None,
            Internal::Sent {
                temp_id,
                result: Err(error),
                ..
            } => Some(ControllerUpdate::SendFailed { temp_id, error }),
            Internal::Edited {
                id,
                result: Err(error),
                ..
            } => Some(ControllerUpdate::EditFailed { id, error }),
            Internal::Deleted {
                removed,
                result: Err(error),
                ..
            } => Some(ControllerUpdate::DeleteFailed {
                id: removed.entry.message.id,
                error,
            }),
            Internal::ReadMarked {
                result: Err(error), ..
            } => Some(ControllerUpdate::MarkReadFailed { error }),
            _ => None,
        }
    }

    fn on_typing_deadline(&mut self) -> Option<ControllerUpdate> {
        let tick = self.typing.poll(Instant::now());
        if let Some(is_typing) = tick.local_signal {
            if let Some(id) = self.active.as_ref().map(|a| a.id.clone()) {
                self.emit_typing(&id, is_typing);
            }
        }
        tick.remote_changed
            .then(|| ControllerUpdate::TypingChanged(self.typing.active()))
    }

    fn mark_read_if_unread(&mut self) {
        let has_unread = self.active.as_ref().is_some_and(|a| {
            a.store
                .messages()
                .any(|m| !m.is_read && !m.is_authored_by(&self.self_id))
        });
        if has_unread {
            if let Err(e) = self.mark_read() {
                debug!(error = %e, "mark read after load skipped");
            }
        }
    }

    /// The active conversation, if `id` is a confirmed message the local
    /// user wrote.
    fn authored_entry(
        &mut self,
        id: &MessageId,
    ) -> Result<&mut ActiveConversation, ControllerError> {
        if id.as_str().starts_with(TEMP_ID_PREFIX) {
            return Err(ControllerError::PendingMessage(id.clone()));
        }
        let active = self
            .active
            .as_mut()
            .ok_or(ControllerError::NoActiveConversation)?;
        let entry = active
            .store
            .get(id)
            .ok_or_else(|| ControllerError::UnknownMessage(id.clone()))?;
        if entry.is_pending() {
            return Err(ControllerError::PendingMessage(id.clone()));
        }
        if !entry.message.is_authored_by(&self.self_id) {
            return Err(ControllerError::NotAuthor(id.clone()));
        }
        Ok(active)
    }

    fn emit_typing(&self, conversation_id: &ConversationId, is_typing: bool) {
        self.push.emit(OutboundEvent::Typing(TypingSignal {
            conversation_id: Some(conversation_id.clone()),
            user_id: self.self_id.clone(),
            is_typing,
        }));
    }

    fn bind(&self, conversation_id: &ConversationId, counterpart: &UserId) -> Vec<Subscription> {
        let scope = Arc::new(Scope {
            conversation_id: conversation_id.clone(),
            self_id: self.self_id.clone(),
            counterpart: counterpart.clone(),
        });
        PushEventKind::ALL
            .into_iter()
            .map(|kind| {
                let scope = Arc::clone(&scope);
                let tx = self.tx.clone();
                self.push.subscribe(
                    kind,
                    Arc::new(move |event: &InboundEvent| {
                        if !scope.accepts(event) {
                            debug!(%kind, conversation_id = %scope.conversation_id, "push event outside active conversation discarded");
                            return;
                        }
                        if tx
                            .send(Internal::Push(scope.conversation_id.clone(), event.clone()))
                            .is_err()
                        {
                            debug!(%kind, "controller gone, push event dropped");
                        }
                    }),
                )
            })
            .collect()
    }
}

impl<A: MessageApi> Drop for ConversationController<A> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            if self.typing.clear() == Some(false) {
                self.push.emit(OutboundEvent::Typing(TypingSignal {
                    conversation_id: Some(active.id),
                    user_id: self.self_id.clone(),
                    is_typing: false,
                }));
            }
        }
    }
}

fn spawn_request<F>(tx: mpsc::UnboundedSender<Internal>, work: F)
where
    F: Future<Output = Internal> + Send + 'static,
{
    tokio::spawn(async move {
        let done = work.await;
        if tx.send(done).is_err() {
            debug!("controller gone, completion dropped");
        }
    });
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
