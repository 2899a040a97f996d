//! Chat server configuration and shared handler state.

use std::path::PathBuf;
use std::sync::Arc;

use crate::service::ChatService;

/// Configuration for the chat core.
#[derive(Clone, Debug)]
pub struct ChatServerConfig {
    /// Directory holding one JSON document per conversation.
    pub storage_dir: PathBuf,
    /// Sqlite database for block relations.
    pub blocks_db_path: PathBuf,
    /// Max length of the denormalized last-message preview.
    pub preview_len: usize,
    /// Capacity of each per-conversation snapshot channel.
    /// Overflow drops the oldest snapshot; snapshots are idempotent.
    pub snapshot_capacity: usize,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        let base = std::env::var("CHAT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("chat_data"));
        Self::with_base_dir(base)
    }
}

impl ChatServerConfig {
    /// Create config rooted at a custom base directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            storage_dir: base_dir.join("conversations"),
            blocks_db_path: base_dir.join("blocks.sqlite"),
            preview_len: 80,
            snapshot_capacity: 64,
        }
    }

    /// Ensure all directories exist.
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        if let Some(parent) = self.blocks_db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// App state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
}
