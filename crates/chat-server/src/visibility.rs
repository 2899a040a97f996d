//! Visibility filtering.
//!
//! Applies the merged block state to a raw message sequence, producing the
//! subset a viewer may see. Pure and idempotent, so it tests without the
//! store.

use crate::models::{Message, VisibilityState};

/// Filter a message list for a viewer under the given visibility state.
///
/// Rules, per message:
/// - always keep the viewer's own messages;
/// - always keep assistant messages;
/// - drop the other party's messages when the viewer has blocked them;
/// - keep everything else.
pub fn filter_messages(
    messages: &[Message],
    viewer: &str,
    state: VisibilityState,
) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| is_visible(m, viewer, state))
        .cloned()
        .collect()
}

fn is_visible(message: &Message, viewer: &str, state: VisibilityState) -> bool {
    if message.sender == viewer {
        return true;
    }
    if message.is_assistant() {
        return true;
    }
    !matches!(state, VisibilityState::BlockedByViewer)
}
