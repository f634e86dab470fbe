//! Clock & correlation carrier (C2).
//!
//! The correlation id is carried via a task-local value so it flows across
//! `.await` suspension points without threading it through every function
//! signature. Every log line emitted inside `with_correlation_id` can read it
//! back with [`current_correlation_id`].

use std::fmt;
use uuid::Uuid;

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Parses an `X-Correlation-ID` header value, accepting it if syntactically
/// valid (non-empty, ASCII, ≤128 bytes) or minting a fresh one otherwise.
///
/// ```
/// use chatify_core::correlation_id_from_header;
///
/// assert_eq!(correlation_id_from_header(Some("abc-123")), "abc-123");
/// assert_ne!(correlation_id_from_header(Some("")), "");
/// assert_ne!(correlation_id_from_header(None), "");
/// ```
pub fn correlation_id_from_header(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() && v.len() <= 128 && v.is_ascii() => v.to_string(),
        _ => new_correlation_id(),
    }
}

/// Mints a fresh correlation id.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Runs `fut` with `id` bound as the ambient correlation id for the duration
/// of the future, including across every `.await` point inside it.
pub async fn with_correlation_id<F, T>(id: String, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CORRELATION_ID.scope(id, fut).await
}

/// Reads the ambient correlation id, or `"-"` when called outside of
/// [`with_correlation_id`] (e.g. in a unit test or a one-shot CLI path).
pub fn current_correlation_id() -> String {
    CORRELATION_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| "-".to_string())
}

/// Monotonic UTC clock, isolated behind a trait so tests can substitute a
/// fixed instant.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now_utc(&self) -> time::OffsetDateTime;
}

/// The real wall clock, backed by [`time::OffsetDateTime::now_utc`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> time::OffsetDateTime {
        time::OffsetDateTime::now_utc()
    }
}
