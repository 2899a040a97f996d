//! Canonical conversation identity.
//!
//! A conversation key is the sorted-and-joined pair of the two participant
//! identifiers, so both sides derive the same key no matter who initiates.

use crate::error::ChatError;

/// Derive the canonical key for a pair of participants.
///
/// Symmetric: `conversation_key(a, b) == conversation_key(b, a)`.
/// Fails with `InvalidIdentity` when either id is blank or the ids are equal.
pub fn conversation_key(id_a: &str, id_b: &str) -> Result<String, ChatError> {
    let a = id_a.trim();
    let b = id_b.trim();

    if a.is_empty() || b.is_empty() {
        return Err(ChatError::InvalidIdentity(
            "participant id must not be empty".to_string(),
        ));
    }
    if a == b {
        return Err(ChatError::InvalidIdentity(format!(
            "conversation requires two distinct participants, got '{}' twice",
            a
        )));
    }

    let mut pair = [a, b];
    pair.sort_unstable();
    Ok(pair.join("_"))
}

/// The sorted participant pair behind a key derivation.
pub fn participant_pair(id_a: &str, id_b: &str) -> Result<[String; 2], ChatError> {
    // Validates the same way as conversation_key.
    conversation_key(id_a, id_b)?;
    let mut pair = [id_a.trim().to_string(), id_b.trim().to_string()];
    pair.sort_unstable();
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        let k1 = conversation_key("bob", "alice").unwrap();
        let k2 = conversation_key("alice", "bob").unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1, "alice_bob");
    }

    #[test]
    fn rejects_empty_and_self_pairs() {
        assert!(matches!(
            conversation_key("", "bob"),
            Err(ChatError::InvalidIdentity(_))
        ));
        assert!(matches!(
            conversation_key("alice", "   "),
            Err(ChatError::InvalidIdentity(_))
        ));
        assert!(matches!(
            conversation_key("alice", "alice"),
            Err(ChatError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn pair_is_sorted() {
        let pair = participant_pair("zoe", "adam").unwrap();
        assert_eq!(pair, ["adam".to_string(), "zoe".to_string()]);
    }
}
