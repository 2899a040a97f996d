//! Live subscription endpoint.
//!
//! Streams filtered conversation snapshots as `data: <json>` lines with
//! periodic blank-line heartbeats. One live registration per
//! (conversation, viewer): reconnecting replaces the previous stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::AppState;
use crate::handlers::caller;
use crate::models::Message;
use crate::service::ChatService;
use crate::stream::{ObserverId, SnapshotCallback};

const HEARTBEAT_SECS: u64 = 30;

/// Tears the stream registration down when the response body is dropped.
/// In-flight assistant generation is unaffected; replies are durable.
struct ObserverGuard {
    service: Arc<ChatService>,
    key: String,
    viewer: String,
    id: ObserverId,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        // Token-checked so a reconnect's replacement registration survives
        // the old stream's teardown.
        self.service.unobserve_id(&self.key, &self.viewer, self.id);
    }
}

/// GET /chat/{key}/subscribe
pub async fn subscribe(
    Path(key): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    let viewer = caller(&headers);
    info!("[Subscribe] /chat/{} (viewer {})", key, viewer);

    let (tx, mut rx) = mpsc::channel(16);
    let callback: SnapshotCallback = Arc::new(move |snapshot| {
        // A full channel means the client is far behind; drop this snapshot,
        // the next one carries the full list anyway.
        let _ = tx.try_send(snapshot);
    });

    let id = state
        .service
        .observe(&key, &viewer, callback)
        .await
        .map_err(|e| {
            error!("[Subscribe] Failed to register observer: {}", e);
            e.status_code()
        })?;

    let guard = ObserverGuard {
        service: state.service.clone(),
        key,
        viewer,
        id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));

        loop {
            tokio::select! {
                snapshot = rx.recv() => {
                    match snapshot {
                        Some(snapshot) => {
                            if let Some(line) = encode_event(&snapshot) {
                                yield Ok::<_, Infallible>(line);
                            }
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok::<_, Infallible>("\n".to_string());
                }
            }
        }
    };

    let response = axum::response::Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(|e| {
            error!("[Subscribe] Failed to build response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(response)
}

/// Render a snapshot as one `data:` line. Returns None on encoding failure
/// so the stream skips the event rather than emitting a bare `data:` line;
/// the next snapshot carries the full list.
fn encode_event(snapshot: &[Message]) -> Option<String> {
    match serde_json::to_string(snapshot) {
        Ok(json) => Some(format!("data: {}\n\n", json)),
        Err(e) => {
            error!("[Subscribe] Failed to encode snapshot: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageCategory;
    use chrono::Utc;

    #[test]
    fn encode_event_wraps_snapshot_in_data_line() {
        let messages = vec![Message {
            id: "m1".to_string(),
            sender: "alice".to_string(),
            body: "hi".to_string(),
            category: MessageCategory::Plain,
            created_at: Utc::now(),
        }];

        let line = encode_event(&messages).unwrap();
        assert!(line.starts_with("data: ["));
        assert!(line.ends_with("\n\n"));
        assert!(line.contains("\"body\":\"hi\""));
    }

    #[test]
    fn encode_event_of_empty_snapshot_is_well_formed() {
        assert_eq!(encode_event(&[]).unwrap(), "data: []\n\n");
    }
}
