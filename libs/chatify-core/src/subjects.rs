//! Partition-key and log-subject helpers.

use crate::types::ScopeType;

/// Deterministic partition key for a scope: `{scopeType}:{scopeId}`.
///
/// All events for the same scope land in the same log partition because the
/// producer hashes this string to pick a partition (see `chatify-producer`).
///
/// ```
/// use chatify_core::{scope_key, ScopeType};
///
/// assert_eq!(scope_key(ScopeType::Channel, "general"), "0:general");
/// assert_eq!(scope_key(ScopeType::DirectMessage, "u1-u2"), "1:u1-u2");
/// ```
pub fn scope_key(scope_type: ScopeType, scope_id: &str) -> String {
    format!("{}:{}", scope_type.as_tag(), scope_id)
}

/// Default log topic name, overridable via `Log.TopicName` / `LOG_TOPIC_NAME`.
pub const DEFAULT_TOPIC: &str = "chat-events";

/// Consumer group id for the broadcast topology: unique per replica so every
/// replica receives every event.
///
/// ```
/// use chatify_core::broadcast_group_id;
///
/// assert_eq!(broadcast_group_id("chat-broadcast", "replica-a"), "chat-broadcast-replica-a");
/// ```
pub fn broadcast_group_id(prefix: &str, replica_id: &str) -> String {
    format!("{prefix}-{replica_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_key_tags_channel_and_dm_differently() {
        assert_eq!(scope_key(ScopeType::Channel, "x"), "0:x");
        assert_eq!(scope_key(ScopeType::DirectMessage, "x"), "1:x");
    }

    #[test]
    fn broadcast_group_id_is_unique_per_replica() {
        let a = broadcast_group_id("chat-broadcast", "replica-a");
        let b = broadcast_group_id("chat-broadcast", "replica-b");
        assert_ne!(a, b);
    }
}
