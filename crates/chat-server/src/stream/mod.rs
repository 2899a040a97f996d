//! Live per-conversation message streams.
//!
//! Wraps the store's snapshot subscription and applies visibility filtering
//! per viewer. Exactly one live registration exists per
//! (conversation, viewer) pair: re-registering aborts the previous delivery
//! task before the new one starts, so a reconnecting viewer never receives
//! duplicate callbacks from a stale registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::blocks::BlockRegistry;
use crate::error::ChatError;
use crate::models::{Message, VisibilityState};
use crate::store::ConversationStore;
use crate::visibility::filter_messages;

/// Callback receiving filtered snapshots. Snapshots are idempotent: the
/// same list may be delivered more than once.
pub type SnapshotCallback = Arc<dyn Fn(Vec<Message>) + Send + Sync>;

/// Token identifying one live registration. A replaced registration's token
/// goes stale, so its owner can tear down without touching the replacement.
pub type ObserverId = u64;

/// Registry of live (conversation, viewer) delivery tasks.
pub struct MessageStream {
    store: Arc<dyn ConversationStore>,
    blocks: Arc<BlockRegistry>,
    observers: Mutex<HashMap<(String, String), (ObserverId, JoinHandle<()>)>>,
    next_id: AtomicU64,
}

impl MessageStream {
    pub fn new(store: Arc<dyn ConversationStore>, blocks: Arc<BlockRegistry>) -> Self {
        Self {
            store,
            blocks,
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a live observer for a conversation.
    ///
    /// Delivers the current filtered snapshot immediately, then again on
    /// every append and on every block change touching the pair. Replaces
    /// any previous registration for the same (conversation, viewer).
    pub async fn observe(
        &self,
        key: &str,
        viewer: &str,
        on_snapshot: SnapshotCallback,
    ) -> Result<ObserverId, ChatError> {
        let conversation = self
            .store
            .get_conversation(key)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(key.to_string()))?;
        let other = conversation
            .other_participant(viewer)
            .map(|s| s.to_string());

        let mut snapshots = self.store.subscribe(key).await;
        let mut block_events = self.blocks.subscribe();

        // Abort the previous registration before the new task starts, so the
        // old observer receives no further callbacks from this point on.
        if let Some((_, previous)) = self
            .observers
            .lock()
            .remove(&(key.to_string(), viewer.to_string()))
        {
            previous.abort();
            debug!("[Stream] Replaced registration for {}:{}", key, viewer);
        }

        let store = self.store.clone();
        let blocks = self.blocks.clone();
        let key_owned = key.to_string();
        let viewer_owned = viewer.to_string();

        let task = tokio::spawn(async move {
            let mut state = match other.as_deref() {
                Some(o) => blocks
                    .visibility_state(&viewer_owned, o)
                    .await
                    .unwrap_or(VisibilityState::None),
                None => VisibilityState::None,
            };

            let mut latest = store.get_messages(&key_owned).await.unwrap_or_default();
            on_snapshot(filter_messages(&latest, &viewer_owned, state));

            let mut block_feed_open = true;
            loop {
                tokio::select! {
                    snapshot = snapshots.recv() => {
                        match snapshot {
                            Ok(snapshot) => {
                                latest = snapshot.messages;
                                on_snapshot(filter_messages(&latest, &viewer_owned, state));
                            }
                            // Lagged: skip to the newest snapshot; nothing is
                            // lost because snapshots carry the full list.
                            Err(RecvError::Lagged(skipped)) => {
                                debug!(
                                    "[Stream] {}:{} lagged, skipped {} snapshots",
                                    key_owned, viewer_owned, skipped
                                );
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                    event = block_events.recv(), if block_feed_open => {
                        match event {
                            Ok(event) => {
                                let touches = other
                                    .as_deref()
                                    .map(|o| event.touches_pair(&viewer_owned, o))
                                    .unwrap_or(false);
                                if touches {
                                    state = match other.as_deref() {
                                        Some(o) => blocks
                                            .visibility_state(&viewer_owned, o)
                                            .await
                                            .unwrap_or(state),
                                        None => VisibilityState::None,
                                    };
                                    on_snapshot(filter_messages(&latest, &viewer_owned, state));
                                }
                            }
                            Err(RecvError::Lagged(_)) => {
                                // Recompute; intermediate toggles collapse to
                                // the current state anyway.
                                if let Some(o) = other.as_deref() {
                                    if let Ok(s) =
                                        blocks.visibility_state(&viewer_owned, o).await
                                    {
                                        state = s;
                                        on_snapshot(filter_messages(
                                            &latest,
                                            &viewer_owned,
                                            state,
                                        ));
                                    }
                                }
                            }
                            Err(RecvError::Closed) => {
                                block_feed_open = false;
                            }
                        }
                    }
                }
            }
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .observers
            .lock()
            .insert((key.to_string(), viewer.to_string()), (id, task));
        if let Some((_, previous)) = previous {
            // A racing observe slipped in between the removal above and this
            // insert; the newest registration wins.
            previous.abort();
        }

        info!("[Stream] Observer registered for {}:{}", key, viewer);
        Ok(id)
    }

    /// Tear down the registration for a (conversation, viewer) pair.
    /// Idempotent: unknown pairs are ignored.
    pub fn unobserve(&self, key: &str, viewer: &str) {
        let removed = self
            .observers
            .lock()
            .remove(&(key.to_string(), viewer.to_string()));
        if let Some((_, task)) = removed {
            task.abort();
            info!("[Stream] Observer removed for {}:{}", key, viewer);
        }
    }

    /// Tear down a registration only if it is still the one identified by
    /// `id`. Lets a replaced observer clean up without cancelling its
    /// replacement.
    pub fn unobserve_id(&self, key: &str, viewer: &str, id: ObserverId) {
        let mut observers = self.observers.lock();
        let entry_key = (key.to_string(), viewer.to_string());
        if observers.get(&entry_key).map(|(current, _)| *current) == Some(id) {
            if let Some((_, task)) = observers.remove(&entry_key) {
                task.abort();
                info!("[Stream] Observer removed for {}:{}", key, viewer);
            }
        }
    }

    /// Number of live registrations, for tests and diagnostics.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatServerConfig;
    use crate::models::MessageCategory;
    use crate::store::JsonConversationStore;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    async fn fixture(temp: &TempDir) -> (Arc<JsonConversationStore>, Arc<BlockRegistry>, MessageStream) {
        let config = ChatServerConfig::with_base_dir(temp.path());
        let store = Arc::new(JsonConversationStore::new(config.clone()).await.unwrap());
        let blocks = Arc::new(BlockRegistry::new(&config.blocks_db_path).await.unwrap());
        let stream = MessageStream::new(store.clone(), blocks.clone());
        (store, blocks, stream)
    }

    fn channel_callback() -> (SnapshotCallback, mpsc::UnboundedReceiver<Vec<Message>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: SnapshotCallback = Arc::new(move |snapshot| {
            let _ = tx.send(snapshot);
        });
        (callback, rx)
    }

    async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<Vec<Message>>) -> Vec<Message> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("snapshot channel closed")
    }

    #[tokio::test]
    async fn observe_delivers_initial_and_live_snapshots() {
        let temp = TempDir::new().unwrap();
        let (store, _blocks, stream) = fixture(&temp).await;
        let conv = store.ensure_conversation("alice", "bob").await.unwrap();

        store
            .append_message(&conv.key, "alice", "hi", MessageCategory::Plain)
            .await
            .unwrap();

        let (callback, mut rx) = channel_callback();
        stream.observe(&conv.key, "bob", callback).await.unwrap();

        let initial = next_snapshot(&mut rx).await;
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].body, "hi");

        store
            .append_message(&conv.key, "bob", "hello", MessageCategory::Plain)
            .await
            .unwrap();

        let live = next_snapshot(&mut rx).await;
        assert_eq!(live.len(), 2);
        assert_eq!(live[1].body, "hello");
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_registration() {
        let temp = TempDir::new().unwrap();
        let (store, _blocks, stream) = fixture(&temp).await;
        let conv = store.ensure_conversation("alice", "bob").await.unwrap();

        let (old_callback, mut old_rx) = channel_callback();
        stream.observe(&conv.key, "bob", old_callback).await.unwrap();
        let _ = next_snapshot(&mut old_rx).await;

        let (new_callback, mut new_rx) = channel_callback();
        stream.observe(&conv.key, "bob", new_callback).await.unwrap();
        let _ = next_snapshot(&mut new_rx).await;

        assert_eq!(stream.observer_count(), 1);

        store
            .append_message(&conv.key, "alice", "after reconnect", MessageCategory::Plain)
            .await
            .unwrap();

        let live = next_snapshot(&mut new_rx).await;
        assert_eq!(live.last().unwrap().body, "after reconnect");

        // The old registration's task is aborted; its callback sender is
        // dropped, so the channel closes without delivering the new append.
        let leftover = tokio::time::timeout(Duration::from_millis(500), old_rx.recv()).await;
        match leftover {
            Ok(None) => {}
            Ok(Some(snapshot)) => {
                assert!(snapshot.iter().all(|m| m.body != "after reconnect"));
                assert!(old_rx.recv().await.is_none());
            }
            Err(_) => panic!("old registration still alive"),
        }
    }

    #[tokio::test]
    async fn unobserve_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let (store, _blocks, stream) = fixture(&temp).await;
        let conv = store.ensure_conversation("alice", "bob").await.unwrap();

        let (callback, mut rx) = channel_callback();
        stream.observe(&conv.key, "bob", callback).await.unwrap();
        let _ = next_snapshot(&mut rx).await;

        stream.unobserve(&conv.key, "bob");
        stream.unobserve(&conv.key, "bob");
        assert_eq!(stream.observer_count(), 0);
    }

    #[tokio::test]
    async fn block_change_reemits_filtered_snapshot() {
        let temp = TempDir::new().unwrap();
        let (store, blocks, stream) = fixture(&temp).await;
        let conv = store.ensure_conversation("alice", "bob").await.unwrap();

        store
            .append_message(&conv.key, "alice", "from alice", MessageCategory::Plain)
            .await
            .unwrap();
        store
            .append_message(&conv.key, "bob", "from bob", MessageCategory::Plain)
            .await
            .unwrap();

        let (callback, mut rx) = channel_callback();
        stream.observe(&conv.key, "alice", callback).await.unwrap();

        let initial = next_snapshot(&mut rx).await;
        assert_eq!(initial.len(), 2);

        blocks.set_blocked("alice", "bob", true).await.unwrap();

        let filtered = next_snapshot(&mut rx).await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].sender, "alice");

        blocks.set_blocked("alice", "bob", false).await.unwrap();

        let restored = next_snapshot(&mut rx).await;
        assert_eq!(restored.len(), 2);
    }

    #[tokio::test]
    async fn stale_token_does_not_remove_replacement() {
        let temp = TempDir::new().unwrap();
        let (store, _blocks, stream) = fixture(&temp).await;
        let conv = store.ensure_conversation("alice", "bob").await.unwrap();

        let (cb1, mut rx1) = channel_callback();
        let old_id = stream.observe(&conv.key, "bob", cb1).await.unwrap();
        let _ = next_snapshot(&mut rx1).await;

        let (cb2, mut rx2) = channel_callback();
        stream.observe(&conv.key, "bob", cb2).await.unwrap();
        let _ = next_snapshot(&mut rx2).await;

        stream.unobserve_id(&conv.key, "bob", old_id);
        assert_eq!(stream.observer_count(), 1);

        store
            .append_message(&conv.key, "alice", "still streaming", MessageCategory::Plain)
            .await
            .unwrap();
        let live = next_snapshot(&mut rx2).await;
        assert_eq!(live.last().unwrap().body, "still streaming");
    }

    #[tokio::test]
    async fn observe_unknown_conversation_fails() {
        let temp = TempDir::new().unwrap();
        let (_store, _blocks, stream) = fixture(&temp).await;

        let (callback, _rx) = channel_callback();
        let result = stream.observe("nobody_noone", "alice", callback).await;
        assert!(matches!(result, Err(ChatError::ConversationNotFound(_))));
    }
}
