//! Opaque identifier newtypes.
//!
//! Server-issued identifiers are opaque strings. Wrapping them keeps a
//! `UserId` from being passed where a `ConversationId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Durable, server-issued message identifier.
    MessageId
);

string_id!(
    /// Identifier of an authenticated user.
    UserId
);

string_id!(
    /// Identifier of a two-party conversation.
    ConversationId
);

/// Prefix that marks client-issued temporary ids when rendered as strings.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Client-issued temporary identifier for a message awaiting confirmation.
///
/// UUID v7 keeps temporary ids time-sortable within one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(pub Uuid);

impl TempId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The placeholder `MessageId` shown for a pending entry.
    pub fn as_message_id(&self) -> MessageId {
        MessageId(self.to_string())
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TEMP_ID_PREFIX}{}", self.0)
    }
}
