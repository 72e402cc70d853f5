//! Password intake.
//!
//! Clients send passwords base64-encoded to sidestep string-handling issues
//! with special characters; the decoded bytes go straight into a locked
//! [`SecureBuffer`] and every intermediate copy is shredded. The password
//! itself never exists as a `String`.

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::secure::buffer::SecureBuffer;

/// Minimum password length in bytes.
pub const MIN_PASSWORD_LENGTH: usize = 1;

/// Maximum password length in bytes (before base64 encoding).
pub const MAX_PASSWORD_LENGTH: usize = 1024;

/// Maximum base64-encoded password length (4/3 expansion plus padding).
pub const MAX_BASE64_PASSWORD_LENGTH: usize = (MAX_PASSWORD_LENGTH * 4 / 3) + 4;

fn into_locked(decoded: Vec<u8>) -> Result<SecureBuffer> {
    let mut decoded = Zeroizing::new(decoded);

    if decoded.len() < MIN_PASSWORD_LENGTH {
        return Err(Error::PasswordTooShort);
    }
    if decoded.len() > MAX_PASSWORD_LENGTH {
        return Err(Error::PasswordTooLong);
    }

    SecureBuffer::from_bytes(decoded.as_mut_slice())
}

/// Decodes a base64-encoded password into a locked buffer.
///
/// The encoded length is capped before decoding so oversized input is
/// rejected without ever allocating for it.
pub fn password_from_base64(encoded: &str) -> Result<SecureBuffer> {
    if encoded.is_empty() {
        return Err(Error::PasswordTooShort);
    }
    if encoded.len() > MAX_BASE64_PASSWORD_LENGTH {
        return Err(Error::PasswordTooLong);
    }

    let decoded = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| Error::PasswordInvalid)?;

    into_locked(decoded)
}

/// Decodes a URL-safe base64-encoded password, with or without padding.
/// Use this for passwords passed in URL parameters or headers.
pub fn password_from_base64_url(encoded: &str) -> Result<SecureBuffer> {
    if encoded.is_empty() {
        return Err(Error::PasswordTooShort);
    }
    if encoded.len() > MAX_BASE64_PASSWORD_LENGTH {
        return Err(Error::PasswordTooLong);
    }

    let decoded = URL_SAFE
        .decode(encoded.as_bytes())
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded.as_bytes()))
        .map_err(|_| Error::PasswordInvalid)?;

    into_locked(decoded)
}

/// Basic length validation for a password already sitting in a locked
/// buffer. Optional; for use when setting up a new lock.
pub fn validate_password_strength(password: &SecureBuffer) -> Result<()> {
    if password.is_destroyed() {
        return Err(Error::BufferDestroyed);
    }

    let size = password.size();
    if size < MIN_PASSWORD_LENGTH {
        return Err(Error::PasswordTooShort);
    }
    if size > MAX_PASSWORD_LENGTH {
        return Err(Error::PasswordTooLong);
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_into_locked_buffer() {
        // "correct horse" standard base64
        let buf = password_from_base64("Y29ycmVjdCBob3JzZQ==").unwrap();
        buf.open(|d| assert_eq!(d, b"correct horse")).unwrap();
        buf.destroy();
    }

    #[test]
    fn test_invalid_encoding_rejected() {
        assert!(matches!(
            password_from_base64("not!!valid@@base64"),
            Err(Error::PasswordInvalid)
        ));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            password_from_base64(""),
            Err(Error::PasswordTooShort)
        ));
    }

    #[test]
    fn test_oversized_rejected_before_decoding() {
        let huge = "A".repeat(MAX_BASE64_PASSWORD_LENGTH + 1);
        assert!(matches!(
            password_from_base64(&huge),
            Err(Error::PasswordTooLong)
        ));
    }

    #[test]
    fn test_url_safe_with_and_without_padding() {
        let padded = URL_SAFE.encode(b"p@ss/w?rd");
        let unpadded = URL_SAFE_NO_PAD.encode(b"p@ss/w?rd");

        for encoded in [padded, unpadded] {
            let buf = password_from_base64_url(&encoded).unwrap();
            buf.open(|d| assert_eq!(d, b"p@ss/w?rd")).unwrap();
        }
    }

    #[test]
    fn test_strength_validation() {
        let mut src = b"ok".to_vec();
        let buf = SecureBuffer::from_bytes(&mut src).unwrap();
        validate_password_strength(&buf).unwrap();

        buf.destroy();
        assert!(matches!(
            validate_password_strength(&buf),
            Err(Error::BufferDestroyed)
        ));
    }
}
