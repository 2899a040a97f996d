//! Consumer boundary for the chat core.
//!
//! The UI layer (and any other collaborator) talks to the core through this
//! service only: start or fetch a conversation, send, observe, toggle
//! blocks, clear assistant context. Sends are rejected at send time when a
//! block exists — the stricter of the two behaviors the product showed.

use std::sync::Arc;

use tracing::warn;

use crate::assistant::AssistantOrchestrator;
use crate::blocks::BlockRegistry;
use crate::error::ChatError;
use crate::models::{
    BlockRelation, Conversation, Message, MessageCategory, VisibilityState,
};
use crate::store::ConversationStore;
use crate::stream::{MessageStream, ObserverId, SnapshotCallback};
use crate::visibility::filter_messages;

pub struct ChatService {
    store: Arc<dyn ConversationStore>,
    blocks: Arc<BlockRegistry>,
    stream: MessageStream,
    assistant: AssistantOrchestrator,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        blocks: Arc<BlockRegistry>,
        stream: MessageStream,
        assistant: AssistantOrchestrator,
    ) -> Self {
        Self {
            store,
            blocks,
            stream,
            assistant,
        }
    }

    /// Idempotent create-or-fetch; returns the canonical conversation key.
    pub async fn start_or_get_conversation(
        &self,
        id_a: &str,
        id_b: &str,
    ) -> Result<String, ChatError> {
        let conversation = self.store.ensure_conversation(id_a, id_b).await?;
        Ok(conversation.key)
    }

    /// Send a message into a conversation.
    ///
    /// Rejected at send time when a block exists in either direction. Store
    /// failures propagate to the caller so the UI can surface a retry; the
    /// assistant dispatch that follows never does.
    pub async fn send(
        &self,
        key: &str,
        sender: &str,
        body: &str,
        category: MessageCategory,
    ) -> Result<Message, ChatError> {
        let conversation = self
            .store
            .get_conversation(key)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(key.to_string()))?;

        if let Some(other) = conversation.other_participant(sender) {
            match self.blocks.visibility_state(sender, other).await? {
                VisibilityState::BlockedByViewer => return Err(ChatError::BlockedByViewer),
                VisibilityState::BlockedByOther => return Err(ChatError::BlockedByOther),
                VisibilityState::None => {}
            }
        }

        let message = self.store.append_message(key, sender, body, category).await?;

        // Fire-and-observe: a generation failure must never fail the send.
        if let Err(e) = self.assistant.handle_message(&conversation, &message).await {
            warn!("[Service] Assistant dispatch failed for {}: {}", key, e);
        }

        Ok(message)
    }

    /// One-shot filtered history for a viewer.
    pub async fn snapshot(&self, key: &str, viewer: &str) -> Result<Vec<Message>, ChatError> {
        let conversation = self
            .store
            .get_conversation(key)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(key.to_string()))?;

        let state = match conversation.other_participant(viewer) {
            Some(other) => self.blocks.visibility_state(viewer, other).await?,
            None => VisibilityState::None,
        };

        let messages = self.store.get_messages(key).await?;
        Ok(filter_messages(&messages, viewer, state))
    }

    /// Register a live observer; replaces any previous registration for the
    /// same (conversation, viewer).
    pub async fn observe(
        &self,
        key: &str,
        viewer: &str,
        on_snapshot: SnapshotCallback,
    ) -> Result<ObserverId, ChatError> {
        self.stream.observe(key, viewer, on_snapshot).await
    }

    /// Idempotent observer teardown. In-flight assistant generation for the
    /// conversation is not cancelled; replies are durable history.
    pub fn unobserve(&self, key: &str, viewer: &str) {
        self.stream.unobserve(key, viewer);
    }

    /// Teardown that respects replacement: only removes the registration
    /// still identified by `id`.
    pub fn unobserve_id(&self, key: &str, viewer: &str, id: ObserverId) {
        self.stream.unobserve_id(key, viewer, id);
    }

    pub async fn set_blocked(
        &self,
        blocker: &str,
        target: &str,
        blocked: bool,
    ) -> Result<(), ChatError> {
        self.blocks.set_blocked(blocker, target, blocked).await
    }

    pub async fn list_blocked(&self, blocker: &str) -> Result<Vec<BlockRelation>, ChatError> {
        self.blocks.list_blocked(blocker).await
    }

    pub async fn list_conversations(&self, user: &str) -> Result<Vec<Conversation>, ChatError> {
        self.store.list_conversations(user).await
    }

    /// Reset assistant memory for a conversation; durable history stays.
    pub fn clear_context(&self, key: &str) {
        self.assistant.clear_context(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantConfig, ContextTurn, ResponseGenerator};
    use crate::config::ChatServerConfig;
    use crate::error::GenerationError;
    use crate::models::ASSISTANT_SENDER;
    use crate::store::JsonConversationStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct EchoGenerator;

    #[async_trait]
    impl ResponseGenerator for EchoGenerator {
        async fn generate(
            &self,
            _config: &AssistantConfig,
            turns: &[ContextTurn],
        ) -> Result<String, GenerationError> {
            Ok(format!("answer to: {}", turns.last().unwrap().text))
        }
    }

    async fn service(temp: &TempDir) -> ChatService {
        let config = ChatServerConfig::with_base_dir(temp.path());
        let store = Arc::new(JsonConversationStore::new(config.clone()).await.unwrap());
        let blocks = Arc::new(BlockRegistry::new(&config.blocks_db_path).await.unwrap());
        let stream = MessageStream::new(store.clone(), blocks.clone());
        let assistant = AssistantOrchestrator::new(
            AssistantConfig::default(),
            store.clone(),
            blocks.clone(),
            Arc::new(EchoGenerator),
        );
        ChatService::new(store, blocks, stream, assistant)
    }

    #[tokio::test]
    async fn send_requires_existing_conversation_and_nonempty_body() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp).await;

        assert!(matches!(
            service
                .send("alice_bob", "alice", "hi", MessageCategory::Plain)
                .await,
            Err(ChatError::ConversationNotFound(_))
        ));

        let key = service
            .start_or_get_conversation("alice", "bob")
            .await
            .unwrap();
        assert!(matches!(
            service.send(&key, "alice", "  ", MessageCategory::Plain).await,
            Err(ChatError::EmptyBody)
        ));
        service
            .send(&key, "alice", "hi", MessageCategory::Plain)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn blocked_pairs_are_rejected_at_send_time() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp).await;
        let key = service
            .start_or_get_conversation("alice", "bob")
            .await
            .unwrap();

        service.set_blocked("alice", "bob", true).await.unwrap();

        assert!(matches!(
            service.send(&key, "alice", "hi", MessageCategory::Plain).await,
            Err(ChatError::BlockedByViewer)
        ));
        assert!(matches!(
            service.send(&key, "bob", "hello", MessageCategory::Plain).await,
            Err(ChatError::BlockedByOther)
        ));

        service.set_blocked("alice", "bob", false).await.unwrap();
        service
            .send(&key, "bob", "hello again", MessageCategory::Plain)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn end_to_end_assistant_flow_is_visible_to_both_participants() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp).await;

        let key = service
            .start_or_get_conversation("u1", "u2")
            .await
            .unwrap();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let cb1: SnapshotCallback = Arc::new(move |s| {
            let _ = tx1.send(s);
        });
        service.observe(&key, "u1", cb1).await.unwrap();

        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let cb2: SnapshotCallback = Arc::new(move |s| {
            let _ = tx2.send(s);
        });
        service.observe(&key, "u2", cb2).await.unwrap();

        service
            .send(&key, "u1", "@ai explain closures", MessageCategory::Plain)
            .await
            .unwrap();

        // Both viewers eventually observe the human message and the reply.
        for rx in [&mut rx1, &mut rx2] {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
            loop {
                let snapshot = tokio::time::timeout_at(deadline, rx.recv())
                    .await
                    .expect("timed out waiting for assistant reply")
                    .expect("observer channel closed");
                if snapshot.len() == 2 {
                    assert_eq!(snapshot[0].body, "@ai explain closures");
                    assert_eq!(snapshot[1].sender, ASSISTANT_SENDER);
                    assert_eq!(snapshot[1].category, MessageCategory::AssistantReply);
                    assert_eq!(snapshot[1].body, "answer to: explain closures");
                    break;
                }
            }
        }

        let filtered = service.snapshot(&key, "u2").await.unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[tokio::test]
    async fn conversation_list_carries_denormalized_preview() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp).await;

        let key = service
            .start_or_get_conversation("alice", "bob")
            .await
            .unwrap();
        service
            .send(&key, "alice", "see you tomorrow", MessageCategory::Plain)
            .await
            .unwrap();

        let conversations = service.list_conversations("alice").await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].last_message, "see you tomorrow");

        assert!(service.list_conversations("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn meeting_invites_flow_through_the_same_send_path() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp).await;
        let key = service
            .start_or_get_conversation("alice", "bob")
            .await
            .unwrap();

        let message = service
            .send(
                &key,
                "alice",
                "Meeting Invitation\n\nTitle: Rust pairing\nDate: 2026-09-01",
                MessageCategory::MeetingInvite,
            )
            .await
            .unwrap();
        assert_eq!(message.category, MessageCategory::MeetingInvite);
    }
}
