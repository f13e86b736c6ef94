//! Push channel event types.
//!
//! Every frame on the push channel is a JSON object `{"event": <name>, "data": <payload>}`.
//! `OutboundEvent` is what this client emits, `InboundEvent` is what the
//! server pushes. Both are Clone + Send + Sync so they can cross task
//! boundaries freely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ConversationId, MessageId, UserId};
use crate::message::Message;

use std::fmt;

/// Payload of the outbound `send_message` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub conversation_id: ConversationId,
    pub content: String,
    pub sender_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_read: bool,
}

/// A typing signal, sent by this client or pushed for the counterpart.
///
/// The server does not always tag inbound signals with a conversation, so
/// `conversation_id` is optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub user_id: UserId,
    pub is_typing: bool,
}

/// A message deletion, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessage {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// `user_id` has read every message addressed to them in `conversation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
}

/// Events emitted by this client over the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    SendMessage(OutgoingMessage),
    Typing(TypingSignal),
    UpdateMessage(Message),
    DeleteMessage(DeletedMessage),
    MarkRead(ReadReceipt),
}

impl OutboundEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::SendMessage(_) => "send_message",
            OutboundEvent::Typing(_) => "typing",
            OutboundEvent::UpdateMessage(_) => "update_message",
            OutboundEvent::DeleteMessage(_) => "delete_message",
            OutboundEvent::MarkRead(_) => "mark_read",
        }
    }
}

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    ReceiveMessage(Message),
    UserTyping(TypingSignal),
    MessageDeleted(DeletedMessage),
    MessageUpdated(Message),
    MessagesRead(ReadReceipt),
}

impl InboundEvent {
    pub fn kind(&self) -> PushEventKind {
        match self {
            InboundEvent::ReceiveMessage(_) => PushEventKind::MessageReceived,
            InboundEvent::UserTyping(_) => PushEventKind::Typing,
            InboundEvent::MessageDeleted(_) => PushEventKind::MessageDeleted,
            InboundEvent::MessageUpdated(_) => PushEventKind::MessageUpdated,
            InboundEvent::MessagesRead(_) => PushEventKind::MessagesRead,
        }
    }

    /// The conversation this event belongs to, when the payload says so.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            InboundEvent::ReceiveMessage(m) | InboundEvent::MessageUpdated(m) => {
                Some(&m.conversation_id)
            }
            InboundEvent::UserTyping(t) => t.conversation_id.as_ref(),
            InboundEvent::MessageDeleted(d) => d.conversation_id.as_ref(),
            InboundEvent::MessagesRead(r) => Some(&r.conversation_id),
        }
    }
}

/// The inbound event categories a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    MessageReceived,
    MessageDeleted,
    MessageUpdated,
    Typing,
    MessagesRead,
}

impl PushEventKind {
    pub const ALL: [PushEventKind; 5] = [
        PushEventKind::MessageReceived,
        PushEventKind::MessageDeleted,
        PushEventKind::MessageUpdated,
        PushEventKind::Typing,
        PushEventKind::MessagesRead,
    ];
}

impl fmt::Display for PushEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushEventKind::MessageReceived => write!(f, "receive_message"),
            PushEventKind::MessageDeleted => write!(f, "message_deleted"),
            PushEventKind::MessageUpdated => write!(f, "message_updated"),
            PushEventKind::Typing => write!(f, "user_typing"),
            PushEventKind::MessagesRead => write!(f, "messages_read"),
        }
    }
}
