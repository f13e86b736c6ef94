//! Message domain types for Parley.
//!
//! `Message` mirrors the persistence service's JSON shape (camelCase keys).
//! The same struct is used for REST responses and push payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ConversationId, MessageId, TempId, UserId};

/// Public profile of a message author, embedded by the server when available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
    pub id: UserId,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A single message within a conversation.
///
/// For a pending entry `id` holds the rendered temporary id (`tmp-...`);
/// once confirmed it holds the durable server id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender_id: UserId,
    pub conversation_id: ConversationId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderProfile>,
}

impl Message {
    /// Build the optimistic placeholder for a message that is being sent.
    pub fn pending(
        temp_id: TempId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
    ) -> Self {
        Self {
            id: temp_id.as_message_id(),
            content,
            sender_id,
            conversation_id,
            created_at: Utc::now(),
            updated_at: None,
            is_read: false,
            sender: None,
        }
    }

    pub fn is_authored_by(&self, user_id: &UserId) -> bool {
        &self.sender_id == user_id
    }
}

/// Request body for `POST /messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub content: String,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
}
