//! Authentication, per-user key derivation, encryption at rest, and
//! GDPR data-subject operations (C9, spec §4.9)
//!
//! Grounded on the pack's key-derivation (`pbkdf2_hmac`, teacher-style
//! constant-time comparisons) and AES-GCM field encryption patterns.

mod auth;
mod cipher;
mod gdpr;

pub use auth::{verify_bearer_token, AuthClaims, TokenError};
pub use cipher::{ContentCipher, PlaintextCipher, VaultCipher};
pub use gdpr::GdprOps;

use crate::error::{MemoryError, Result};

/// Identifiers only ever compared against a fixed allow-list, never
/// interpolated into SQL (spec §4.9's "parameter sanitization" —
/// column/table names can't be bound as SQLite parameters, so any code
/// path that needs a dynamic identifier must check it against this
/// list first).
pub const ALLOWED_ORDER_COLUMNS: &[&str] = &["created_at", "importance_score", "last_accessed"];

pub fn assert_allowed_identifier(candidate: &str) -> Result<&str> {
    ALLOWED_ORDER_COLUMNS
        .iter()
        .find(|&&c| c == candidate)
        .copied()
        .ok_or_else(|| MemoryError::Forbidden(format!("identifier '{candidate}' not on allow-list")))
}

/// Cross-character access control: a memory is visible to a request
/// scoped to `requested_character_id` when it belongs to that
/// character, has no character at all, or was explicitly marked
/// shared (spec §4.9: "cross-character ACL ... fails closed").
pub fn character_visible(
    memory_character_id: Option<&str>,
    memory_shared: bool,
    requested_character_id: Option<&str>,
) -> bool {
    match (memory_character_id, requested_character_id) {
        (None, _) => true,
        (Some(_), None) => memory_shared,
        (Some(owner), Some(requested)) => owner == requested || memory_shared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_rejects_unknown_identifier() {
        assert!(assert_allowed_identifier("user_id; DROP TABLE memories;--").is_err());
        assert!(assert_allowed_identifier("created_at").is_ok());
    }

    #[test]
    fn character_visibility_matrix() {
        assert!(character_visible(None, false, Some("bob")));
        assert!(character_visible(Some("alice"), false, None) == false);
        assert!(character_visible(Some("alice"), true, None));
        assert!(character_visible(Some("alice"), false, Some("alice")));
        assert!(!character_visible(Some("alice"), false, Some("bob")));
        assert!(character_visible(Some("alice"), true, Some("bob")));
    }
}
