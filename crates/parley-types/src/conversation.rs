//! Two-party conversation types.

use serde::{Deserialize, Serialize};

use crate::id::{ConversationId, UserId};

/// A conversation between exactly two participants.
///
/// The server is expected to keep at most one conversation per unordered
/// participant pair, but nothing on the client enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participant_a: UserId,
    pub participant_b: UserId,
}

impl Conversation {
    /// Whether this conversation is between `a` and `b`, in either order.
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (&self.participant_a == a && &self.participant_b == b)
            || (&self.participant_a == b && &self.participant_b == a)
    }

    /// The other participant, if `user_id` takes part in this conversation.
    pub fn counterpart_of(&self, user_id: &UserId) -> Option<&UserId> {
        if &self.participant_a == user_id {
            Some(&self.participant_b)
        } else if &self.participant_b == user_id {
            Some(&self.participant_a)
        } else {
            None
        }
    }
}

/// Request body for the conversation check and create endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPair {
    pub sender_id: UserId,
    pub receiver_id: UserId,
}
