//! MessageStore: the ordered view of one conversation.
//!
//! Three sources race to mutate the store: the bulk load, optimistic local
//! sends awaiting confirmation, and push events. The store is the single
//! merge point, and it enforces two rules regardless of arrival order:
//!
//! - at most one visible entry per durable message id
//! - a pending entry is replaced in place by its durable counterpart
//!
//! Entries live in stable slots. Removal leaves a tombstone so the slot of
//! every other entry, and therefore every index in `by_id`/`by_temp`, stays
//! valid. Reconciliation is an O(1) slot update.

use std::collections::HashMap;

use tracing::debug;

use parley_types::id::{ConversationId, MessageId, TempId, UserId};
use parley_types::message::Message;

/// Identity of an entry: a client temporary id until confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Pending(TempId),
    Confirmed(MessageId),
}

/// One visible entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: EntryKey,
    pub message: Message,
}

impl Entry {
    pub fn is_pending(&self) -> bool {
        matches!(self.key, EntryKey::Pending(_))
    }

    pub fn temp_id(&self) -> Option<TempId> {
        match self.key {
            EntryKey::Pending(temp) => Some(temp),
            EntryKey::Confirmed(_) => None,
        }
    }
}

/// How a confirmation was merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The pending slot now holds the durable message.
    InPlace,
    /// The pending slot now holds the durable message and an earlier
    /// push echo of the same message was dropped.
    MergedWithEcho,
    /// No pending entry with that temporary id exists anymore.
    Missing,
}

/// An entry taken out by a remote delete, kept so it can be restored.
#[derive(Debug, Clone)]
pub struct RemovedEntry {
    slot: usize,
    /// Visible entries that preceded it, for restoring after a relayout.
    rank: usize,
    epoch: u64,
    generation: u64,
    pub entry: Entry,
}

/// The ordered message collection for one conversation.
#[derive(Debug)]
pub struct MessageStore {
    conversation_id: ConversationId,
    slots: Vec<Option<Entry>>,
    by_id: HashMap<MessageId, usize>,
    by_temp: HashMap<TempId, usize>,
    loaded: bool,
    /// Bumped whenever slot positions are invalidated (reload, compaction).
    epoch: u64,
    /// Bumped on reload only; compaction keeps relative order.
    generation: u64,
    live: usize,
}

impl MessageStore {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            slots: Vec::new(),
            by_id: HashMap::new(),
            by_temp: HashMap::new(),
            loaded: false,
            epoch: 0,
            generation: 0,
            live: 0,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Whether a bulk load has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Visible entries in local arrival order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.slots.iter().flatten()
    }

    /// Visible messages in local arrival order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries().map(|entry| &entry.message)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Entry> {
        self.by_id.get(id).and_then(|&slot| self.slots[slot].as_ref())
    }

    pub fn get_pending(&self, temp: TempId) -> Option<&Entry> {
        self.by_temp
            .get(&temp)
            .and_then(|&slot| self.slots[slot].as_ref())
    }

    /// Visible position (0-based, tombstones skipped) of a durable id.
    pub fn position(&self, id: &MessageId) -> Option<usize> {
        let slot = *self.by_id.get(id)?;
        Some(self.slots[..slot].iter().filter(|s| s.is_some()).count())
    }

    /// Visible position of a pending entry.
    pub fn pending_position(&self, temp: TempId) -> Option<usize> {
        let slot = *self.by_temp.get(&temp)?;
        Some(self.slots[..slot].iter().filter(|s| s.is_some()).count())
    }

    /// Replace the whole sequence with an authoritative load result.
    ///
    /// Messages of other conversations are ignored and duplicate ids keep
    /// their first occurrence. Pending entries are discarded along with
    /// everything else.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.clear();
        for message in messages {
            if message.conversation_id != self.conversation_id {
                debug!(
                    conversation_id = %self.conversation_id,
                    message_id = %message.id,
                    "load returned a message of another conversation, ignored"
                );
                continue;
            }
            if self.by_id.contains_key(&message.id) {
                continue;
            }
            self.append(Entry {
                key: EntryKey::Confirmed(message.id.clone()),
                message,
            });
        }
        self.loaded = true;
    }

    /// Drop every entry and forget the loaded flag.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_id.clear();
        self.by_temp.clear();
        self.live = 0;
        self.loaded = false;
        self.epoch += 1;
        self.generation += 1;
    }

    /// Append an optimistic entry and return its temporary id.
    pub fn push_pending(&mut self, content: String, sender: UserId) -> TempId {
        let temp = TempId::new();
        let message = Message::pending(temp, self.conversation_id.clone(), sender, content);
        self.append(Entry {
            key: EntryKey::Pending(temp),
            message,
        });
        temp
    }

    /// Swap the pending entry `temp` for its durable `message`, in place.
    pub fn reconcile(&mut self, temp: TempId, message: Message) -> Reconciled {
        let Some(slot) = self.by_temp.remove(&temp) else {
            return Reconciled::Missing;
        };

        let mut outcome = Reconciled::InPlace;
        if let Some(echo_slot) = self.by_id.remove(&message.id) {
            // The push echo won the race; the confirmation keeps the
            // original slot and the echo goes.
            if echo_slot != slot {
                self.slots[echo_slot] = None;
                self.live -= 1;
                outcome = Reconciled::MergedWithEcho;
            }
        }

        self.by_id.insert(message.id.clone(), slot);
        self.slots[slot] = Some(Entry {
            key: EntryKey::Confirmed(message.id.clone()),
            message,
        });
        outcome
    }

    /// Remove a pending entry whose persist failed.
    pub fn rollback(&mut self, temp: TempId) -> Option<Entry> {
        let slot = self.by_temp.remove(&temp)?;
        let entry = self.slots[slot].take();
        if entry.is_some() {
            self.live -= 1;
        }
        self.maybe_compact();
        entry
    }

    /// Merge a message delivered by push.
    ///
    /// Returns false when the message belongs to another conversation or an
    /// entry with the same durable id is already present.
    pub fn apply_remote_insert(&mut self, message: Message) -> bool {
        if message.conversation_id != self.conversation_id {
            return false;
        }
        if self.by_id.contains_key(&message.id) {
            return false;
        }
        self.append(Entry {
            key: EntryKey::Confirmed(message.id.clone()),
            message,
        });
        true
    }

    /// Remove a confirmed entry by durable id. No-op if absent.
    pub fn apply_remote_delete(&mut self, id: &MessageId) -> Option<RemovedEntry> {
        let slot = self.by_id.remove(id)?;
        let rank = self.slots[..slot].iter().filter(|s| s.is_some()).count();
        let entry = self.slots[slot].take()?;
        self.live -= 1;
        let removed = RemovedEntry {
            slot,
            rank,
            epoch: self.epoch,
            generation: self.generation,
            entry,
        };
        self.maybe_compact();
        Some(removed)
    }

    /// Put a removed entry back at its old position.
    ///
    /// Returns false when an entry with the same id reappeared meanwhile.
    pub fn restore(&mut self, removed: RemovedEntry) -> bool {
        let id = removed.entry.message.id.clone();
        if self.by_id.contains_key(&id) {
            return false;
        }
        let fits = removed.epoch == self.epoch
            && self
                .slots
                .get(removed.slot)
                .is_some_and(|slot| slot.is_none());
        if fits {
            self.slots[removed.slot] = Some(removed.entry);
            self.by_id.insert(id, removed.slot);
            self.live += 1;
        } else if removed.generation == self.generation {
            self.insert_at_rank(removed.rank, removed.entry);
        } else {
            self.append(removed.entry);
        }
        true
    }

    /// Replace a confirmed entry with an edited version. No-op if absent.
    ///
    /// Returns the message that was replaced.
    pub fn apply_remote_edit(&mut self, message: Message) -> Option<Message> {
        if message.conversation_id != self.conversation_id {
            return None;
        }
        let slot = *self.by_id.get(&message.id)?;
        let entry = self.slots[slot].as_mut()?;
        Some(std::mem::replace(&mut entry.message, message))
    }

    /// Change the content of a confirmed entry locally.
    ///
    /// Returns the message as it was before the change.
    pub fn edit_content(&mut self, id: &MessageId, content: String) -> Option<Message> {
        let slot = *self.by_id.get(id)?;
        let entry = self.slots[slot].as_mut()?;
        let previous = entry.message.clone();
        entry.message.content = content;
        entry.message.updated_at = Some(chrono::Utc::now());
        Some(previous)
    }

    /// Mark every entry not authored by `reader` as read.
    ///
    /// Returns the ids that actually flipped, so the change can be undone.
    pub fn mark_read_by(&mut self, reader: &UserId) -> Vec<MessageId> {
        let mut flipped = Vec::new();
        for entry in self.slots.iter_mut().flatten() {
            if entry.message.is_read || entry.message.is_authored_by(reader) {
                continue;
            }
            if let EntryKey::Confirmed(id) = &entry.key {
                entry.message.is_read = true;
                flipped.push(id.clone());
            }
        }
        flipped
    }

    /// Mark every counterpart message as read. Self-authored entries are
    /// never touched. Idempotent.
    pub fn mark_all_counterpart_read(&mut self, self_id: &UserId) -> Vec<MessageId> {
        self.mark_read_by(self_id)
    }

    /// Undo a read flip for the given ids.
    pub fn mark_unread(&mut self, ids: &[MessageId]) {
        for id in ids {
            if let Some(&slot) = self.by_id.get(id) {
                if let Some(entry) = self.slots[slot].as_mut() {
                    entry.message.is_read = false;
                }
            }
        }
    }

    fn append(&mut self, entry: Entry) {
        let slot = self.slots.len();
        match &entry.key {
            EntryKey::Pending(temp) => {
                self.by_temp.insert(*temp, slot);
            }
            EntryKey::Confirmed(id) => {
                self.by_id.insert(id.clone(), slot);
            }
        }
        self.slots.push(Some(entry));
        self.live += 1;
    }

    /// Reclaim tombstones once they outnumber the live entries.
    /// Rebuild the slots with `entry` as the `rank`-th visible entry.
    fn insert_at_rank(&mut self, rank: usize, entry: Entry) {
        let mut entries: Vec<Entry> = std::mem::take(&mut self.slots).into_iter().flatten().collect();
        entries.insert(rank.min(entries.len()), entry);
        self.by_id.clear();
        self.by_temp.clear();
        self.live = 0;
        for entry in entries {
            self.append(entry);
        }
        self.epoch += 1;
    }

    fn maybe_compact(&mut self) {
        let tombstones = self.slots.len() - self.live;
        if tombstones < 32 || tombstones < self.live {
            return;
        }
        let slots = std::mem::take(&mut self.slots);
        self.by_id.clear();
        self.by_temp.clear();
        self.live = 0;
        for entry in slots.into_iter().flatten() {
            self.append(entry);
        }
        self.epoch += 1;
    }
}
