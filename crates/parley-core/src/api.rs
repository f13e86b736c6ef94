//! MessageApi trait definition.
//!
//! The persistence service is the authority for every durable write. The
//! infrastructure layer implements this trait over HTTP
//! (`parley_infra::http::HttpMessageApi`); tests use an in-memory fake.

use parley_types::conversation::Conversation;
use parley_types::error::ApiError;
use parley_types::id::{ConversationId, MessageId, UserId};
use parley_types::message::{Message, NewMessage};

/// Port to the REST persistence collaborator.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Every future
/// is `Send` so calls can run on spawned tasks.
pub trait MessageApi: Send + Sync {
    /// All messages of a conversation, in server order.
    fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, ApiError>> + Send;

    /// Persist a new message and return its durable form.
    fn create_message(
        &self,
        message: &NewMessage,
    ) -> impl std::future::Future<Output = Result<Message, ApiError>> + Send;

    /// Replace the content of a message.
    fn update_message(
        &self,
        id: &MessageId,
        content: &str,
    ) -> impl std::future::Future<Output = Result<Message, ApiError>> + Send;

    fn delete_message(
        &self,
        id: &MessageId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Mark every message addressed to `reader` in the conversation as read.
    fn mark_read(
        &self,
        conversation_id: &ConversationId,
        reader: &UserId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Look up the conversation between two users.
    ///
    /// Returns `Ok(None)` when the server answers 404.
    fn find_conversation(
        &self,
        sender: &UserId,
        receiver: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, ApiError>> + Send;

    fn create_conversation(
        &self,
        sender: &UserId,
        receiver: &UserId,
    ) -> impl std::future::Future<Output = Result<Conversation, ApiError>> + Send;
}
