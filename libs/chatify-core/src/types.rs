use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// The two addressable conversation kinds. Serializes to the wire integers
/// `0` and `1`, matching the external wire contract.
///
/// ```
/// use chatify_core::ScopeType;
///
/// assert_eq!(serde_json::to_string(&ScopeType::Channel).unwrap(), "0");
/// assert_eq!(serde_json::to_string(&ScopeType::DirectMessage).unwrap(), "1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeType {
    Channel,
    DirectMessage,
}

impl ScopeType {
    /// Short tag used in partition-key serialization (see [`crate::subjects::scope_key`]).
    pub fn as_tag(&self) -> &'static str {
        match self {
            ScopeType::Channel => "0",
            ScopeType::DirectMessage => "1",
        }
    }

    fn as_wire(&self) -> u8 {
        match self {
            ScopeType::Channel => 0,
            ScopeType::DirectMessage => 1,
        }
    }

    fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(ScopeType::Channel),
            1 => Some(ScopeType::DirectMessage),
            _ => None,
        }
    }
}

impl Serialize for ScopeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for ScopeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        ScopeType::from_wire(value)
            .ok_or_else(|| de::Error::custom(format!("invalid scopeType {value}")))
    }
}

/// The atomic unit produced to the log and consumed by every replica.
///
/// Immutable once produced; `(scope_type, scope_id, created_at_utc, message_id)`
/// is the total-order key used by the history store's clustering columns.
///
/// ```
/// use chatify_core::{ChatEvent, ScopeType};
/// use time::OffsetDateTime;
/// use uuid::Uuid;
///
/// let event = ChatEvent {
///     message_id: Uuid::new_v4(),
///     scope_type: ScopeType::Channel,
///     scope_id: "general".into(),
///     sender_id: "u-1".into(),
///     text: "hi".into(),
///     created_at_utc: OffsetDateTime::now_utc(),
///     origin_pod_id: "replica-a".into(),
/// };
/// assert_eq!(event.scope_id, "general");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub message_id: Uuid,
    pub scope_type: ScopeType,
    pub scope_id: String,
    pub sender_id: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at_utc: OffsetDateTime,
    pub origin_pod_id: String,
}

/// A [`ChatEvent`] annotated with the position it landed at on the log,
/// returned to the caller on a successful produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: ChatEvent,
    pub partition: i32,
    pub offset: i64,
}

/// Request payload accepted at the chat submission surface. Sender identity
/// comes from the auth context, not from the body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub scope_type: ScopeType,
    pub scope_id: String,
    pub text: String,
}

/// A live connection's identity, used for presence and subscription bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
