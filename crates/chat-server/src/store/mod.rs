//! Conversation storage boundary.
//!
//! The core consumes a document-store contract: idempotent create-or-fetch
//! keyed by the canonical conversation key, ordered append with
//! server-assigned timestamps, and live snapshot subscription. The default
//! implementation is the JSON document store in `json_store`.

pub mod json_store;

pub use json_store::JsonConversationStore;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ChatError;
use crate::models::{Conversation, ConversationSnapshot, Message, MessageCategory};

/// Store contract consumed by the chat core.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Idempotent create-or-fetch keyed by the derived conversation key.
    ///
    /// Concurrent calls racing to create the same key converge to a single
    /// record.
    async fn ensure_conversation(
        &self,
        id_a: &str,
        id_b: &str,
    ) -> Result<Conversation, ChatError>;

    /// Fetch a conversation record if it exists.
    async fn get_conversation(&self, key: &str) -> Result<Option<Conversation>, ChatError>;

    /// Conversations containing `user`, newest activity first.
    async fn list_conversations(&self, user: &str) -> Result<Vec<Conversation>, ChatError>;

    /// Append a message with a server-assigned timestamp that is >= every
    /// previously assigned timestamp for this key.
    ///
    /// Fails with `ConversationNotFound` for unknown keys and `EmptyBody`
    /// for blank bodies.
    async fn append_message(
        &self,
        key: &str,
        sender: &str,
        body: &str,
        category: MessageCategory,
    ) -> Result<Message, ChatError>;

    /// Full ordered message history for a conversation.
    async fn get_messages(&self, key: &str) -> Result<Vec<Message>, ChatError>;

    /// Subscribe to live snapshots for a conversation.
    ///
    /// Every append publishes the full ordered message list. Delivery is
    /// at-least-once; a lagged receiver skips to the newest snapshot.
    async fn subscribe(&self, key: &str) -> broadcast::Receiver<ConversationSnapshot>;
}
