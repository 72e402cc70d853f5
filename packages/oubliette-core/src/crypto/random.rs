//! # Random Generation
//!
//! CSPRNG-backed identifiers, salts and buffers. Everything here reads from
//! [`OsRng`] and surfaces failures as [`Error::RandomGeneration`] — no
//! fallback randomness, no retries.

use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::secure::buffer::SecureBuffer;
use crate::secure::shred::shred;

/// Bytes in a file id (64 bits → 16 hex chars).
pub const FILE_ID_BYTES: usize = 8;

/// Bytes in a session token (256 bits → 64 hex chars).
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Standard AES-GCM nonce size (96 bits).
pub const NONCE_BYTES: usize = 12;

/// Standard PBKDF2 salt size (128 bits).
pub const SALT_BYTES: usize = 16;

/// Generates cryptographically secure random bytes into a locked buffer.
pub fn random_bytes(size: usize) -> Result<SecureBuffer> {
    let buf = SecureBuffer::new(size)?;

    let filled = buf.open_mut(|data| OsRng.try_fill_bytes(data).is_ok())?;
    if !filled {
        buf.destroy();
        return Err(Error::RandomGeneration);
    }

    Ok(buf)
}

/// Generates cryptographically secure random bytes on the heap.
///
/// The returned vector zeroizes on drop; prefer [`random_bytes`] when the
/// value must also stay off swap.
pub fn random_bytes_raw(size: usize) -> Result<Zeroizing<Vec<u8>>> {
    if size == 0 {
        return Err(Error::BufferEmpty);
    }

    let mut data = Zeroizing::new(vec![0u8; size]);
    OsRng
        .try_fill_bytes(data.as_mut_slice())
        .map_err(|_| Error::RandomGeneration)?;
    Ok(data)
}

/// Generates a random file id: 16 lowercase hex characters (64 bits).
pub fn generate_file_id() -> Result<String> {
    let mut raw = random_bytes_raw(FILE_ID_BYTES)?;
    let id = hex::encode(&*raw);
    shred(raw.as_mut_slice());
    Ok(id)
}

/// Generates a random session token: 64 lowercase hex characters (256 bits).
pub fn generate_session_token() -> Result<String> {
    let mut raw = random_bytes_raw(SESSION_TOKEN_BYTES)?;
    let token = hex::encode(&*raw);
    shred(raw.as_mut_slice());
    Ok(token)
}

/// Generates a random 16-byte salt for key derivation.
pub fn generate_salt() -> Result<Zeroizing<Vec<u8>>> {
    random_bytes_raw(SALT_BYTES)
}

/// Compares two byte slices in constant time.
///
/// Returns `false` for differing lengths. Use this for every comparison
/// that involves a secret, key hash included.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_format() {
        let id = generate_file_id().unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_file_ids_are_unique() {
        let a = generate_file_id().unwrap();
        let b = generate_file_id().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_token_format() {
        let token = generate_session_token().unwrap();
        assert_eq!(token.len(), 64);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_salt_length() {
        let salt = generate_salt().unwrap();
        assert_eq!(salt.len(), SALT_BYTES);
    }

    #[test]
    fn test_random_bytes_locked() {
        let buf = random_bytes(64).unwrap();
        assert_eq!(buf.size(), 64);
        // 64 random bytes are never all zero in practice
        let any_nonzero = buf.open(|d| d.iter().any(|&b| b != 0)).unwrap();
        assert!(any_nonzero);
        buf.destroy();
    }

    #[test]
    fn test_random_bytes_raw_rejects_zero() {
        assert!(matches!(random_bytes_raw(0), Err(Error::BufferEmpty)));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"same", b"same"));
        assert!(!constant_time_compare(b"same", b"diff"));
        assert!(!constant_time_compare(b"short", b"longer"));
        assert!(constant_time_compare(b"", b""));
    }
}
