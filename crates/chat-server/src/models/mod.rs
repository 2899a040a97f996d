use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved sender identity for automated assistant responses.
///
/// Messages from this sender are exempt from block-based filtering and
/// never re-trigger the assistant.
pub const ASSISTANT_SENDER: &str = "ai-assistant";

/// A two-party conversation.
///
/// The id is a pure function of the participant pair (see `identity`),
/// so at most one record exists per unordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub key: String,
    /// Exactly two distinct identities, stored sorted.
    pub participants: [String; 2],
    pub created_at: DateTime<Utc>,
    /// Denormalized preview of the newest message, for list views.
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
}

impl Conversation {
    pub fn new(key: impl Into<String>, participants: [String; 2]) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            participants,
            created_at: now,
            last_message: String::new(),
            last_message_time: now,
        }
    }

    /// The participant that is not `viewer`, if `viewer` is a participant.
    pub fn other_participant(&self, viewer: &str) -> Option<&str> {
        let [a, b] = &self.participants;
        if a == viewer {
            Some(b)
        } else if b == viewer {
            Some(a)
        } else {
            None
        }
    }
}

/// A single message, owned by exactly one conversation. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub body: String,
    #[serde(default)]
    pub category: MessageCategory,
    /// Server-assigned, monotone non-decreasing within a conversation.
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_assistant(&self) -> bool {
        self.sender == ASSISTANT_SENDER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    #[default]
    Plain,
    MeetingInvite,
    AssistantReply,
}

/// A directed block edge, owned by the blocker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRelation {
    pub blocker: String,
    pub target: String,
    pub blocked_at: DateTime<Utc>,
}

/// Merged block relationship between a viewer and the other participant.
///
/// `BlockedByViewer` takes precedence in filtering: a viewer who has
/// blocked someone sees no new exchange regardless of the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityState {
    None,
    BlockedByViewer,
    BlockedByOther,
}

/// Full ordered message list for a conversation, published on every append.
///
/// Consumers must treat this as an idempotent snapshot, not a delta: the
/// store may redeliver an unchanged list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub conversation_key: String,
    pub messages: Vec<Message>,
}

/// Input for sending a message over the HTTP surface.
#[derive(Debug, Deserialize)]
pub struct SendMessageInput {
    pub content: String,
    #[serde(default)]
    pub category: MessageCategory,
}

/// Input for starting (or fetching) a conversation.
#[derive(Debug, Deserialize)]
pub struct StartConversationInput {
    pub user_a: String,
    pub user_b: String,
}

#[derive(Debug, Serialize)]
pub struct StartConversationResponse {
    pub conversation_key: String,
}

/// Input for toggling a block relation.
#[derive(Debug, Deserialize)]
pub struct SetBlockedInput {
    pub blocked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_participant_resolves_both_sides() {
        let conv = Conversation::new("alice_bob", ["alice".into(), "bob".into()]);
        assert_eq!(conv.other_participant("alice"), Some("bob"));
        assert_eq!(conv.other_participant("bob"), Some("alice"));
        assert_eq!(conv.other_participant("carol"), None);
    }

    #[test]
    fn message_category_serializes_snake_case() {
        let json = serde_json::to_string(&MessageCategory::AssistantReply).unwrap();
        assert_eq!(json, "\"assistant_reply\"");
        let parsed: MessageCategory = serde_json::from_str("\"meeting_invite\"").unwrap();
        assert_eq!(parsed, MessageCategory::MeetingInvite);
    }
}
