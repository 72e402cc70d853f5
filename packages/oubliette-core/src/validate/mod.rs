//! # Input Validation
//!
//! Validation for everything a client can hand the core. All input crosses
//! one of these functions before it touches a store; the rules are strict
//! enough that a validated value can be used as a map key or echoed back
//! without further escaping.
//!
//! | Input | Rule |
//! |-------|------|
//! | File id | exactly 16 hex chars, normalised lowercase |
//! | Session token | exactly 64 hex chars, normalised lowercase |
//! | Filename | 1-255 chars, no traversal, no control bytes |
//! | MIME type | allowlist or `application/octet-stream` fallback |
//! | Clipboard text | ≤ 1 MiB, trimmed |
//! | Password | base64 → locked buffer, 1-1024 decoded bytes |

mod filename;
mod mime;
mod password;

pub use filename::{filename, filename_strict, MAX_FILENAME_LENGTH};
pub use mime::{is_image_mime_type, is_mime_type_allowed, mime_type, mime_type_or_default};
pub use password::{
    password_from_base64, password_from_base64_url, validate_password_strength,
    MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
};

use crate::error::{Error, Result};

/// Expected length of a file id in hex characters.
pub const FILE_ID_LENGTH: usize = 16;

/// Expected length of a session token in hex characters.
pub const SESSION_TOKEN_LENGTH: usize = 64;

/// Maximum size of clipboard content (1 MiB).
pub const MAX_CLIPBOARD_SIZE: usize = 1024 * 1024;

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validates and normalizes a file id.
///
/// File ids are exactly 16 hex characters (64 bits). Returns the lowercase
/// normalized id.
pub fn file_id(id: &str) -> Result<String> {
    let id = id.trim();

    if id.len() != FILE_ID_LENGTH || !is_hex(id) {
        return Err(Error::InvalidFileId);
    }

    Ok(id.to_ascii_lowercase())
}

/// Validates and normalizes a session token.
///
/// Session tokens are exactly 64 hex characters (256 bits). Returns the
/// lowercase normalized token.
pub fn session_token(token: &str) -> Result<String> {
    let token = token.trim();

    if token.len() != SESSION_TOKEN_LENGTH || !is_hex(token) {
        return Err(Error::InvalidSessionToken);
    }

    Ok(token.to_ascii_lowercase())
}

/// Validates clipboard text content: at most 1 MiB, trimmed of surrounding
/// whitespace with internal formatting preserved.
pub fn clipboard_text(content: &str) -> Result<String> {
    if content.len() > MAX_CLIPBOARD_SIZE {
        return Err(Error::ClipboardTooLarge);
    }

    Ok(content.trim().to_string())
}

/// Validates clipboard binary content against the 1 MiB cap.
pub fn clipboard_bytes(content: &[u8]) -> Result<()> {
    if content.len() > MAX_CLIPBOARD_SIZE {
        return Err(Error::ClipboardTooLarge);
    }
    Ok(())
}

/// Validates that a string is non-empty after trimming.
pub fn non_empty(s: &str) -> Result<String> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::EmptyInput);
    }
    Ok(s.to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_accepts_and_normalizes() {
        assert_eq!(file_id("0123456789abcdef").unwrap(), "0123456789abcdef");
        assert_eq!(file_id("0123456789ABCDEF").unwrap(), "0123456789abcdef");
        assert_eq!(file_id("  0123456789abcdef  ").unwrap(), "0123456789abcdef");
    }

    #[test]
    fn test_file_id_rejects_bad_input() {
        for bad in ["", "short", "0123456789abcde", "0123456789abcdef0", "0123456789abcdeg"] {
            assert!(matches!(file_id(bad), Err(Error::InvalidFileId)), "{:?}", bad);
        }
    }

    #[test]
    fn test_session_token() {
        let token = "ab".repeat(32);
        assert_eq!(session_token(&token).unwrap(), token);
        assert_eq!(session_token(&token.to_uppercase()).unwrap(), token);

        assert!(matches!(
            session_token("deadbeef"),
            Err(Error::InvalidSessionToken)
        ));
        assert!(matches!(
            session_token(&"zz".repeat(32)),
            Err(Error::InvalidSessionToken)
        ));
    }

    #[test]
    fn test_clipboard_text_trims_and_caps() {
        assert_eq!(clipboard_text("  hello\nworld  ").unwrap(), "hello\nworld");

        let big = "x".repeat(MAX_CLIPBOARD_SIZE + 1);
        assert!(matches!(
            clipboard_text(&big),
            Err(Error::ClipboardTooLarge)
        ));
    }

    #[test]
    fn test_clipboard_bytes_cap() {
        assert!(clipboard_bytes(&vec![0u8; MAX_CLIPBOARD_SIZE]).is_ok());
        assert!(matches!(
            clipboard_bytes(&vec![0u8; MAX_CLIPBOARD_SIZE + 1]),
            Err(Error::ClipboardTooLarge)
        ));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  x  ").unwrap(), "x");
        assert!(matches!(non_empty("   "), Err(Error::EmptyInput)));
    }
}
