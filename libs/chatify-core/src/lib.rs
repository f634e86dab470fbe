//! Chatify core contracts and value types.
//!
//! This crate exposes the domain model shared between the gateway, the broadcast
//! consumer, and the persister consumer: the `ChatEvent` wire type, scope-id
//! serialization, input validation, the correlation/clock carrier, and the
//! closed error-kind union mapped onto transport status codes.
pub mod context;
pub mod error;
pub mod subjects;
pub mod types;
pub mod validate;

pub use context::*;
pub use error::*;
pub use subjects::*;
pub use types::*;
pub use validate::*;

/// Returns the semantic version advertised by this crate.
///
/// ```
/// assert_eq!(chatify_core::version(), "0.1.0");
/// ```
pub fn version() -> &'static str {
    "0.1.0"
}
