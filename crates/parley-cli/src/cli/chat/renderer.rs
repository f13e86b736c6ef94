//! Terminal rendering for the chat loop.
//!
//! The controller only says *that* entries changed. [`Transcript`] keeps a
//! copy of what has been printed and turns each change into the lines worth
//! printing: new messages, edits, deletions and read receipts.

use std::collections::{HashMap, HashSet};

use console::style;

use parley_core::store::{Entry, EntryKey};
use parley_types::id::{MessageId, TempId, UserId};
use parley_types::message::Message;

/// Characters of a message id shown next to each line.
pub const SHORT_ID_LEN: usize = 8;

/// A visible change between two snapshots of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    Added { message: Message, pending: bool },
    Edited(Message),
    Removed(Message),
    /// This many of the local user's messages were newly read.
    Read(usize),
}

/// What has been printed so far.
#[derive(Debug)]
pub struct Transcript {
    self_id: UserId,
    shown: Vec<Entry>,
}

impl Transcript {
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            shown: Vec::new(),
        }
    }

    /// Diff `entries` against what was shown, then remember `entries`.
    ///
    /// A pending entry that disappears is a failed send, which the caller
    /// reports from the controller's error, so it yields no event here.
    pub fn sync(&mut self, entries: &[&Entry]) -> Vec<TranscriptEvent> {
        let current: HashSet<&EntryKey> = entries.iter().map(|e| &e.key).collect();
        let previous: HashMap<&EntryKey, &Message> =
            self.shown.iter().map(|e| (&e.key, &e.message)).collect();
        let pending_contents: HashSet<&str> = entries
            .iter()
            .filter(|e| e.is_pending())
            .map(|e| e.message.content.as_str())
            .collect();

        let mut events: Vec<TranscriptEvent> = self
            .shown
            .iter()
            .filter(|e| !e.is_pending() && !current.contains(&e.key))
            .map(|e| TranscriptEvent::Removed(e.message.clone()))
            .collect();

        let mut newly_read = 0;
        for entry in entries {
            match previous.get(&entry.key) {
                None => {
                    // A push echo of a message still awaiting confirmation
                    // is already on screen as the pending line.
                    let echo = !entry.is_pending()
                        && entry.message.sender_id == self.self_id
                        && pending_contents.contains(entry.message.content.as_str());
                    if !echo {
                        events.push(TranscriptEvent::Added {
                            message: entry.message.clone(),
                            pending: entry.is_pending(),
                        });
                    }
                }
                Some(old) if old.content != entry.message.content => {
                    events.push(TranscriptEvent::Edited(entry.message.clone()));
                }
                Some(old) => {
                    if !old.is_read
                        && entry.message.is_read
                        && entry.message.sender_id == self.self_id
                    {
                        newly_read += 1;
                    }
                }
            }
        }
        if newly_read > 0 {
            events.push(TranscriptEvent::Read(newly_read));
        }

        self.shown = entries.iter().map(|e| (*e).clone()).collect();
        events
    }

    /// Record that the pending entry `temp_id` is now `id`, so the
    /// confirmation is not mistaken for a new message.
    pub fn confirm(&mut self, temp_id: TempId, id: &MessageId) {
        let pending = EntryKey::Pending(temp_id);
        for entry in self.shown.iter_mut().filter(|e| e.key == pending) {
            entry.key = EntryKey::Confirmed(id.clone());
            entry.message.id = id.clone();
        }
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    /// Forget everything printed, so the next sync prints it all again.
    pub fn reset(&mut self) {
        self.shown.clear();
    }
}

pub fn short_id(id: &MessageId) -> &str {
    let s = id.as_str();
    match s.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// One message line: time, author, content, id and delivery marker.
pub fn format_message(message: &Message, self_id: &UserId, pending: bool) -> String {
    let time = message.created_at.with_timezone(&chrono::Local).format("%H:%M");
    let author = if &message.sender_id == self_id {
        style("you".to_string()).green().bold()
    } else {
        let name = message
            .sender
            .as_ref()
            .map(|s| s.full_name.clone())
            .unwrap_or_else(|| message.sender_id.to_string());
        style(name).cyan().bold()
    };

    if pending {
        return format!(
            "  {} {} {} {}",
            style(time).dim(),
            author,
            style(&message.content).dim(),
            style("(sending...)").dim().italic()
        );
    }

    let marker = if &message.sender_id == self_id {
        if message.is_read { " ✓✓" } else { " ✓" }
    } else {
        ""
    };
    let edited = if message.updated_at.is_some_and(|u| u > message.created_at) {
        format!(" {}", style("(edited)").dim())
    } else {
        String::new()
    };
    format!(
        "  {} {} {}{} {}{}",
        style(time).dim(),
        author,
        message.content,
        edited,
        style(short_id(&message.id)).dim(),
        style(marker).dim()
    )
}

pub fn format_event(event: &TranscriptEvent, self_id: &UserId) -> String {
    match event {
        TranscriptEvent::Added { message, pending } => format_message(message, self_id, *pending),
        TranscriptEvent::Edited(message) => format!(
            "  {} {}",
            style("~").yellow(),
            format_message(message, self_id, false).trim_start()
        ),
        TranscriptEvent::Removed(message) => format!(
            "  {} {}",
            style("-").red(),
            style(format!("message {} deleted", short_id(&message.id))).dim()
        ),
        TranscriptEvent::Read(count) => {
            let noun = if *count == 1 { "message" } else { "messages" };
            format!("  {}", style(format!("✓✓ {count} {noun} read")).dim())
        }
    }
}

/// The typing indicator line, or `None` when nobody is typing.
pub fn format_typing(users: &[UserId]) -> Option<String> {
    let names: Vec<&str> = users.iter().map(|u| u.as_str()).collect();
    let text = match names.as_slice() {
        [] => return None,
        [one] => format!("{one} is typing..."),
        many => format!("{} are typing...", many.join(", ")),
    };
    Some(format!("  {}", style(text).dim().italic()))
}

pub fn format_error(message: &str) -> String {
    format!("  {} {}", style("!").red().bold(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(id: &str, sender: &str, content: &str) -> Message {
        Message {
            id: MessageId::from(id),
            content: content.to_string(),
            sender_id: UserId::from(sender),
            conversation_id: "c1".into(),
            created_at: Utc::now(),
            updated_at: None,
            is_read: false,
            sender: None,
        }
    }

    fn confirmed(id: &str, sender: &str, content: &str) -> Entry {
        Entry {
            key: EntryKey::Confirmed(MessageId::from(id)),
            message: message(id, sender, content),
        }
    }

    fn pending(temp: TempId, content: &str) -> Entry {
        Entry {
            key: EntryKey::Pending(temp),
            message: Message::pending(temp, "c1".into(), "u1".into(), content.to_string()),
        }
    }

    #[test]
    fn first_sync_adds_everything() {
        let mut transcript = Transcript::new("u1".into());
        let a = confirmed("m1", "u2", "hi");
        let b = confirmed("m2", "u1", "hello");

        let events = transcript.sync(&[&a, &b]);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], TranscriptEvent::Added { message, pending: false } if message.id.as_str() == "m1"));
        assert_eq!(transcript.len(), 2);
        assert!(transcript.sync(&[&a, &b]).is_empty());
    }

    #[test]
    fn edits_and_deletes_are_reported() {
        let mut transcript = Transcript::new("u1".into());
        let a = confirmed("m1", "u2", "hi");
        let b = confirmed("m2", "u2", "typo");
        transcript.sync(&[&a, &b]);

        let fixed = confirmed("m2", "u2", "fixed");
        let events = transcript.sync(&[&fixed]);

        assert_eq!(
            events,
            vec![
                TranscriptEvent::Removed(a.message.clone()),
                TranscriptEvent::Edited(fixed.message.clone()),
            ]
        );
    }

    #[test]
    fn confirmation_is_not_a_new_message() {
        let mut transcript = Transcript::new("u1".into());
        let temp = TempId::new();
        let sending = pending(temp, "hello");
        let events = transcript.sync(&[&sending]);
        assert!(matches!(&events[0], TranscriptEvent::Added { pending: true, .. }));

        transcript.confirm(temp, &MessageId::from("m1"));
        let done = confirmed("m1", "u1", "hello");
        assert!(transcript.sync(&[&done]).is_empty());
    }

    #[test]
    fn rolled_back_send_is_not_a_deletion() {
        let mut transcript = Transcript::new("u1".into());
        let sending = pending(TempId::new(), "lost");
        transcript.sync(&[&sending]);

        assert!(transcript.sync(&[]).is_empty());
        assert_eq!(transcript.len(), 0);
    }

    #[test]
    fn early_echo_of_pending_message_is_not_printed_twice() {
        let mut transcript = Transcript::new("u1".into());
        let temp = TempId::new();
        let sending = pending(temp, "hello");
        transcript.sync(&[&sending]);

        let echo = confirmed("m1", "u1", "hello");
        assert!(transcript.sync(&[&sending, &echo]).is_empty());
    }

    #[test]
    fn read_receipts_count_own_messages_only() {
        let mut transcript = Transcript::new("u1".into());
        let mine = confirmed("m1", "u1", "a");
        let theirs = confirmed("m2", "u2", "b");
        transcript.sync(&[&mine, &theirs]);

        let mut mine_read = mine.clone();
        mine_read.message.is_read = true;
        let mut theirs_read = theirs.clone();
        theirs_read.message.is_read = true;

        assert_eq!(
            transcript.sync(&[&mine_read, &theirs_read]),
            vec![TranscriptEvent::Read(1)]
        );
    }

    #[test]
    fn reset_reprints_on_next_sync() {
        let mut transcript = Transcript::new("u1".into());
        let a = confirmed("m1", "u2", "hi");
        transcript.sync(&[&a]);
        transcript.reset();
        assert_eq!(transcript.sync(&[&a]).len(), 1);
    }

    #[test]
    fn short_id_truncates_long_ids() {
        assert_eq!(short_id(&MessageId::from("65f1c0ffee0123456789abcd")), "65f1c0ff");
        assert_eq!(short_id(&MessageId::from("m1")), "m1");
    }

    #[test]
    fn typing_line_names_everyone_typing() {
        assert_eq!(format_typing(&[]), None);
        let line = format_typing(&["u2".into()]).unwrap();
        assert!(line.contains("u2 is typing"));
        let line = format_typing(&["u2".into(), "u3".into()]).unwrap();
        assert!(line.contains("u2, u3 are typing"));
    }

    #[test]
    fn pending_lines_are_marked() {
        let temp = TempId::new();
        let entry = pending(temp, "on its way");
        let line = format_message(&entry.message, &"u1".into(), true);
        assert!(line.contains("on its way"));
        assert!(line.contains("sending"));
    }
}
