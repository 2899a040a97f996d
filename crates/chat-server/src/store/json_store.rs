//! JSON document store for conversations.
//!
//! One JSON file per conversation, written atomically (temp file + rename),
//! with an in-memory cache of loaded conversations and a bounded broadcast
//! channel per conversation for live snapshot delivery.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ChatServerConfig;
use crate::error::ChatError;
use crate::identity;
use crate::models::{Conversation, ConversationSnapshot, Message, MessageCategory};
use crate::store::ConversationStore;

/// Broadcast channel for a conversation's live snapshots.
#[derive(Clone)]
struct SnapshotChannel {
    tx: broadcast::Sender<ConversationSnapshot>,
}

/// Durable form of a conversation: metadata plus the ordered message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationDoc {
    conversation: Conversation,
    messages: Vec<Message>,
}

/// JSON-file-backed conversation store.
pub struct JsonConversationStore {
    config: ChatServerConfig,
    /// In-memory cache of loaded conversations.
    conversations: RwLock<HashMap<String, Arc<RwLock<ConversationDoc>>>>,
    /// Snapshot channels, one per conversation key.
    channels: RwLock<HashMap<String, SnapshotChannel>>,
}

impl JsonConversationStore {
    /// Create a new store, loading any existing conversation documents.
    pub async fn new(config: ChatServerConfig) -> Result<Self, ChatError> {
        config
            .ensure_dirs()
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))?;

        let store = Self {
            config,
            conversations: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        };

        store.load_existing().await?;

        info!(
            "JSON conversation store initialized with {} conversations",
            store.conversations.read().await.len()
        );

        Ok(store)
    }

    fn doc_path(&self, key: &str) -> PathBuf {
        self.config.storage_dir.join(format!("{}.json", key))
    }

    async fn load_existing(&self) -> Result<(), ChatError> {
        let mut entries = fs::read_dir(&self.config.storage_dir).await?;
        let mut count = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match Self::load_doc(&path).await {
                Ok(doc) => {
                    let key = doc.conversation.key.clone();
                    self.conversations
                        .write()
                        .await
                        .insert(key, Arc::new(RwLock::new(doc)));
                    count += 1;
                }
                Err(e) => {
                    warn!("Failed to load conversation from {:?}: {}", path, e);
                }
            }
        }

        info!("Loaded {} existing conversations from disk", count);
        Ok(())
    }

    async fn load_doc(path: &Path) -> Result<ConversationDoc, ChatError> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist a conversation document atomically.
    async fn save_doc(&self, doc: &ConversationDoc) -> Result<(), ChatError> {
        let path = self.doc_path(&doc.conversation.key);
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    async fn get_doc(&self, key: &str) -> Option<Arc<RwLock<ConversationDoc>>> {
        self.conversations.read().await.get(key).cloned()
    }

    async fn channel(&self, key: &str) -> SnapshotChannel {
        let mut channels = self.channels.write().await;
        channels
            .entry(key.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.config.snapshot_capacity);
                SnapshotChannel { tx }
            })
            .clone()
    }

    async fn publish_snapshot(&self, key: &str, messages: Vec<Message>) {
        let channel = self.channel(key).await;
        // No receivers is fine; the send result is intentionally ignored.
        let _ = channel.tx.send(ConversationSnapshot {
            conversation_key: key.to_string(),
            messages,
        });
    }

    fn preview(&self, body: &str) -> String {
        if body.chars().count() <= self.config.preview_len {
            body.to_string()
        } else {
            body.chars().take(self.config.preview_len).collect()
        }
    }
}

#[async_trait]
impl ConversationStore for JsonConversationStore {
    async fn ensure_conversation(
        &self,
        id_a: &str,
        id_b: &str,
    ) -> Result<Conversation, ChatError> {
        let key = identity::conversation_key(id_a, id_b)?;
        let participants = identity::participant_pair(id_a, id_b)?;

        // Fast path: already loaded.
        if let Some(doc) = self.get_doc(&key).await {
            return Ok(doc.read().await.conversation.clone());
        }

        // Slow path under the map write lock: concurrent first contact from
        // both participants converges to a single record here.
        let mut conversations = self.conversations.write().await;
        if let Some(doc) = conversations.get(&key) {
            return Ok(doc.read().await.conversation.clone());
        }

        let path = self.doc_path(&key);
        let doc = if path.exists() {
            Self::load_doc(&path).await?
        } else {
            let doc = ConversationDoc {
                conversation: Conversation::new(&key, participants),
                messages: Vec::new(),
            };
            self.save_doc(&doc).await?;
            info!("Created conversation {}", key);
            doc
        };

        let conversation = doc.conversation.clone();
        conversations.insert(key, Arc::new(RwLock::new(doc)));
        Ok(conversation)
    }

    async fn get_conversation(&self, key: &str) -> Result<Option<Conversation>, ChatError> {
        if let Some(doc) = self.get_doc(key).await {
            return Ok(Some(doc.read().await.conversation.clone()));
        }

        let path = self.doc_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let doc = Self::load_doc(&path).await?;
        let conversation = doc.conversation.clone();
        self.conversations
            .write()
            .await
            .insert(key.to_string(), Arc::new(RwLock::new(doc)));
        Ok(Some(conversation))
    }

    async fn list_conversations(&self, user: &str) -> Result<Vec<Conversation>, ChatError> {
        let conversations = self.conversations.read().await;
        let mut result = Vec::new();
        for doc in conversations.values() {
            let doc = doc.read().await;
            if doc.conversation.participants.iter().any(|p| p == user) {
                result.push(doc.conversation.clone());
            }
        }
        drop(conversations);

        result.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        Ok(result)
    }

    async fn append_message(
        &self,
        key: &str,
        sender: &str,
        body: &str,
        category: MessageCategory,
    ) -> Result<Message, ChatError> {
        if body.trim().is_empty() {
            return Err(ChatError::EmptyBody);
        }

        let doc_lock = self
            .get_doc(key)
            .await
            .ok_or_else(|| ChatError::ConversationNotFound(key.to_string()))?;
        let mut doc = doc_lock.write().await;

        // Server-assigned timestamp, monotone non-decreasing within the
        // conversation. Ties are broken by vector order.
        let now = Utc::now();
        let created_at = match doc.messages.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            body: body.to_string(),
            category,
            created_at,
        };

        doc.messages.push(message.clone());
        doc.conversation.last_message = self.preview(body);
        doc.conversation.last_message_time = created_at;

        self.save_doc(&doc).await?;
        // Publish before releasing the doc lock. Publishing after release
        // would let a concurrent append broadcast a longer list first, and
        // subscribers would then see this one as a stale regression.
        self.publish_snapshot(key, doc.messages.clone()).await;
        drop(doc);

        info!("Appended message {} to conversation {}", message.id, key);
        Ok(message)
    }

    async fn get_messages(&self, key: &str) -> Result<Vec<Message>, ChatError> {
        let doc_lock = self
            .get_doc(key)
            .await
            .ok_or_else(|| ChatError::ConversationNotFound(key.to_string()))?;
        let doc = doc_lock.read().await;
        Ok(doc.messages.clone())
    }

    async fn subscribe(&self, key: &str) -> broadcast::Receiver<ConversationSnapshot> {
        self.channel(key).await.tx.subscribe()
    }
}
