//! ConversationResolver: find-or-create for the conversation between two users.
//!
//! The check-then-create sequence is not atomic. Two clients making first
//! contact at the same moment can both see "none" and both create; the only
//! real fix is a uniqueness constraint on the participant pair server-side.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use parley_types::error::ApiError;
use parley_types::id::{ConversationId, UserId};

use crate::api::MessageApi;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("cannot open a conversation with yourself")]
    SelfConversation,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A conversation the caller already holds.
#[derive(Debug, Clone, Copy)]
pub struct HeldConversation<'a> {
    pub id: &'a ConversationId,
    /// Number of messages currently loaded for it.
    pub loaded_messages: usize,
}

/// How a conversation id was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The held id was trusted without a network call.
    Held,
    Found,
    Created,
}

pub struct ConversationResolver<A: MessageApi> {
    api: Arc<A>,
}

impl<A: MessageApi> ConversationResolver<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// Resolve the conversation between `self_id` and `counterpart`.
    ///
    /// A held conversation with at least one loaded message is trusted as is.
    /// Otherwise the server is asked for an existing conversation (404 means
    /// none), and one is created when there is none.
    pub async fn resolve_or_create(
        &self,
        self_id: &UserId,
        counterpart: &UserId,
        held: Option<HeldConversation<'_>>,
    ) -> Result<(ConversationId, Resolution), ResolveError> {
        if self_id == counterpart {
            return Err(ResolveError::SelfConversation);
        }

        if let Some(held) = held.filter(|h| h.loaded_messages > 0) {
            debug!(conversation_id = %held.id, "reusing held conversation");
            return Ok((held.id.clone(), Resolution::Held));
        }

        let existing = match self.api.find_conversation(self_id, counterpart).await {
            Ok(found) => found,
            Err(ApiError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(conversation) = existing {
            debug!(conversation_id = %conversation.id, %counterpart, "found existing conversation");
            return Ok((conversation.id, Resolution::Found));
        }

        let created = self.api.create_conversation(self_id, counterpart).await?;
        info!(conversation_id = %created.id, %counterpart, "created conversation");
        Ok((created.id, Resolution::Created))
    }
}
