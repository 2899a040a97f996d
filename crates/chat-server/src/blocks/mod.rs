//! Block registry.
//!
//! Tracks directed block relations between identity pairs in sqlite and
//! derives the merged visibility state for a viewer/other pair. Changes are
//! published on a broadcast channel so live streams react to block and
//! unblock without polling.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::ChatError;
use crate::models::{BlockRelation, VisibilityState};

/// A change to the block graph.
#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub blocker: String,
    pub target: String,
    pub blocked: bool,
}

impl BlockEvent {
    /// Whether this event affects the (viewer, other) pair, in either
    /// direction.
    pub fn touches_pair(&self, viewer: &str, other: &str) -> bool {
        (self.blocker == viewer && self.target == other)
            || (self.blocker == other && self.target == viewer)
    }
}

/// Block registry handles all block-relation operations.
pub struct BlockRegistry {
    db_path: PathBuf,
    events: broadcast::Sender<BlockEvent>,
}

impl BlockRegistry {
    /// Create a new registry backed by the given sqlite file.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let db_path = db_path.as_ref().to_path_buf();
        let (events, _) = broadcast::channel(64);

        let registry = Self { db_path, events };
        registry.init_db().await?;

        info!("[Blocks] Initialized");
        Ok(registry)
    }

    async fn get_pool(&self) -> Result<sqlx::SqlitePool, ChatError> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", self.db_path.display()))
                .map_err(|e| ChatError::Storage(e.to_string()))?
                .create_if_missing(true);
        Ok(SqlitePoolOptions::new().connect_with(options).await?)
    }

    async fn init_db(&self) -> Result<(), ChatError> {
        let pool = self.get_pool().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS block_relations (
                blocker_id TEXT NOT NULL,
                blocked_id TEXT NOT NULL,
                blocked_at TEXT NOT NULL,
                PRIMARY KEY (blocker_id, blocked_id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        pool.close().await;
        Ok(())
    }

    /// Whether `blocker` currently blocks `target`.
    pub async fn is_blocked(&self, blocker: &str, target: &str) -> Result<bool, ChatError> {
        let pool = self.get_pool().await?;

        let row: Option<(String,)> = sqlx::query_as(
            "SELECT blocked_at FROM block_relations WHERE blocker_id = ? AND blocked_id = ?",
        )
        .bind(blocker)
        .bind(target)
        .fetch_optional(&pool)
        .await?;

        pool.close().await;
        Ok(row.is_some())
    }

    /// Toggle a directed block relation. Last write wins; unblocking removes
    /// the edge entirely.
    pub async fn set_blocked(
        &self,
        blocker: &str,
        target: &str,
        blocked: bool,
    ) -> Result<(), ChatError> {
        if blocker == target {
            return Err(ChatError::SelfBlock);
        }

        let pool = self.get_pool().await?;

        if blocked {
            sqlx::query(
                "INSERT OR REPLACE INTO block_relations (blocker_id, blocked_id, blocked_at)
                 VALUES (?, ?, ?)",
            )
            .bind(blocker)
            .bind(target)
            .bind(Utc::now().to_rfc3339())
            .execute(&pool)
            .await?;
        } else {
            sqlx::query("DELETE FROM block_relations WHERE blocker_id = ? AND blocked_id = ?")
                .bind(blocker)
                .bind(target)
                .execute(&pool)
                .await?;
        }

        pool.close().await;

        info!(
            "[Blocks] {} {} {}",
            blocker,
            if blocked { "blocked" } else { "unblocked" },
            target
        );

        let _ = self.events.send(BlockEvent {
            blocker: blocker.to_string(),
            target: target.to_string(),
            blocked,
        });

        Ok(())
    }

    /// Merged visibility state for a viewer against the other participant.
    ///
    /// `BlockedByViewer` takes precedence over `BlockedByOther`.
    pub async fn visibility_state(
        &self,
        viewer: &str,
        other: &str,
    ) -> Result<VisibilityState, ChatError> {
        if self.is_blocked(viewer, other).await? {
            Ok(VisibilityState::BlockedByViewer)
        } else if self.is_blocked(other, viewer).await? {
            Ok(VisibilityState::BlockedByOther)
        } else {
            Ok(VisibilityState::None)
        }
    }

    /// Whether a block exists in either direction between the pair.
    pub async fn any_block(&self, a: &str, b: &str) -> Result<bool, ChatError> {
        Ok(self.visibility_state(a, b).await? != VisibilityState::None)
    }

    /// All targets currently blocked by `blocker`.
    pub async fn list_blocked(&self, blocker: &str) -> Result<Vec<BlockRelation>, ChatError> {
        let pool = self.get_pool().await?;

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT blocked_id, blocked_at FROM block_relations
             WHERE blocker_id = ? ORDER BY blocked_at DESC",
        )
        .bind(blocker)
        .fetch_all(&pool)
        .await?;

        pool.close().await;

        Ok(rows
            .into_iter()
            .map(|(target, blocked_at)| BlockRelation {
                blocker: blocker.to_string(),
                target,
                blocked_at: blocked_at
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }

    /// Subscribe to block graph changes.
    pub fn subscribe(&self) -> broadcast::Receiver<BlockEvent> {
        self.events.subscribe()
    }
}
