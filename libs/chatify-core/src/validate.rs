//! Scope domain policy (C1). Pure functions, no I/O.

use crate::error::ChatifyError;
use crate::types::SendRequest;

const MAX_ID_LEN: usize = 256;
const MAX_TEXT_LEN: usize = 4096;

/// Validates a non-empty, non-whitespace-only identifier of bounded length.
/// Used for `scopeId`, `senderId`, and `originPodId`. Colons are rejected
/// since they're the separator used to build the log partition key (see
/// `scope_key`) and a colon inside a `scopeId` would make that key ambiguous.
///
/// ```
/// use chatify_core::validate_id;
///
/// assert!(validate_id("scopeId", "general").is_ok());
/// assert!(validate_id("scopeId", "   ").is_err());
/// assert!(validate_id("scopeId", "").is_err());
/// assert!(validate_id("scopeId", "u1:u2").is_err());
/// ```
pub fn validate_id(field: &'static str, value: &str) -> Result<(), ChatifyError> {
    if value.is_empty() || value.trim().is_empty() {
        return Err(ChatifyError::InvalidArgument {
            field,
            reason: "must not be empty or whitespace-only".into(),
        });
    }
    if value.len() > MAX_ID_LEN {
        return Err(ChatifyError::InvalidArgument {
            field,
            reason: format!("must be at most {MAX_ID_LEN} bytes"),
        });
    }
    if !value.is_ascii() {
        return Err(ChatifyError::InvalidArgument {
            field,
            reason: "must be ASCII".into(),
        });
    }
    if value.contains(':') {
        return Err(ChatifyError::InvalidArgument {
            field,
            reason: "must not contain ':'".into(),
        });
    }
    Ok(())
}

/// Validates message text: any length from 0 to 4096 UTF-8 code units
/// (bytes) is accepted, matching the byte-based bound `validate_id` uses.
///
/// ```
/// use chatify_core::validate_text;
///
/// assert!(validate_text("").is_ok());
/// assert!(validate_text(&"x".repeat(4096)).is_ok());
/// assert!(validate_text(&"x".repeat(4097)).is_err());
/// ```
pub fn validate_text(value: &str) -> Result<(), ChatifyError> {
    if value.len() > MAX_TEXT_LEN {
        return Err(ChatifyError::InvalidArgument {
            field: "text",
            reason: format!("must be at most {MAX_TEXT_LEN} bytes"),
        });
    }
    Ok(())
}

/// Validates a full send request, short-circuiting on the first failing field.
pub fn validate_send_request(
    req: &SendRequest,
    sender_id: &str,
) -> Result<(), ChatifyError> {
    validate_id("scopeId", &req.scope_id)?;
    validate_id("senderId", sender_id)?;
    validate_text(&req.text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScopeType;

    #[test]
    fn rejects_whitespace_only_scope_id() {
        let err = validate_id("scopeId", "   ").unwrap_err();
        assert!(matches!(err, ChatifyError::InvalidArgument { field: "scopeId", .. }));
    }

    #[test]
    fn rejects_oversized_id() {
        let long = "x".repeat(257);
        assert!(validate_id("senderId", &long).is_err());
    }

    #[test]
    fn accepts_boundary_length_id() {
        let boundary = "x".repeat(256);
        assert!(validate_id("senderId", &boundary).is_ok());
    }

    #[test]
    fn accepts_empty_text() {
        assert!(validate_text("").is_ok());
    }

    #[test]
    fn rejects_text_over_4096_chars() {
        let text = "a".repeat(4097);
        assert!(validate_text(&text).is_err());
    }

    #[test]
    fn validate_send_request_checks_all_fields() {
        let req = SendRequest {
            scope_type: ScopeType::Channel,
            scope_id: "general".into(),
            text: "hi".into(),
        };
        assert!(validate_send_request(&req, "u-1").is_ok());

        let bad = SendRequest {
            scope_type: ScopeType::Channel,
            scope_id: "   ".into(),
            text: "hi".into(),
        };
        assert!(validate_send_request(&bad, "u-1").is_err());
    }
}
