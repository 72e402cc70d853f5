//! # AES-256-GCM
//!
//! Symmetric encryption over sealed keys. The ciphertext framing is pinned
//! to what the browser client produces with WebCrypto:
//!
//! ```text
//! ┌──────────────┬───────────────────────────────┬──────────────┐
//! │  IV (12 B)   │          ciphertext           │  tag (16 B)  │
//! └──────────────┴───────────────────────────────┴──────────────┘
//! ```
//!
//! The key only ever materialises inside [`SecureKey::with_key`]; these
//! helpers build the cipher in that frame and let it drop with it.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::crypto::kdf::AES256_KEY_SIZE;
use crate::crypto::random::{random_bytes_raw, NONCE_BYTES};
use crate::error::{Error, Result};
use crate::secure::buffer::SecureBuffer;
use crate::secure::key::SecureKey;
use crate::secure::shred::shred;

/// AES-GCM authentication tag size in bytes.
pub const TAG_BYTES: usize = 16;

/// Encrypts plaintext with AES-256-GCM under a sealed key.
///
/// Returns `IV(12) ‖ ciphertext ‖ tag(16)` with a fresh random nonce.
pub fn encrypt(key: &SecureKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = random_bytes_raw(NONCE_BYTES)?;

    let ciphertext = key.with_key(|key_bytes| {
        if key_bytes.len() != AES256_KEY_SIZE {
            return Err(Error::InvalidKeySize);
        }
        let cipher =
            Aes256Gcm::new_from_slice(key_bytes).map_err(|_| Error::InvalidKeySize)?;
        cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::EncryptionFailed)
    })??;

    let mut out = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts `IV(12) ‖ ciphertext ‖ tag(16)` produced by [`encrypt`] (or by
/// the client's WebCrypto counterpart).
pub fn decrypt(key: &SecureKey, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if ciphertext.len() < NONCE_BYTES + TAG_BYTES {
        return Err(Error::CiphertextTooShort);
    }

    let plaintext = key.with_key(|key_bytes| {
        if key_bytes.len() != AES256_KEY_SIZE {
            return Err(Error::InvalidKeySize);
        }
        let cipher =
            Aes256Gcm::new_from_slice(key_bytes).map_err(|_| Error::InvalidKeySize)?;

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_BYTES]);
        cipher
            .decrypt(nonce, &ciphertext[NONCE_BYTES..])
            .map_err(|_| Error::DecryptionFailed)
    })??;

    Ok(Zeroizing::new(plaintext))
}

/// Encrypts the contents of a locked buffer without modifying it.
pub fn encrypt_buffer(key: &SecureKey, plaintext: &SecureBuffer) -> Result<Vec<u8>> {
    plaintext.open(|data| encrypt(key, data))?
}

/// Decrypts ciphertext straight into a locked buffer.
pub fn decrypt_to_buffer(key: &SecureKey, ciphertext: &[u8]) -> Result<SecureBuffer> {
    let mut plaintext = decrypt(key, ciphertext)?;

    match SecureBuffer::from_bytes(plaintext.as_mut_slice()) {
        Ok(buf) => Ok(buf),
        Err(err) => {
            shred(plaintext.as_mut_slice());
            Err(err)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SecureKey {
        let mut key_bytes = [0x42u8; AES256_KEY_SIZE];
        SecureKey::new(&mut key_bytes).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = b"the vault keeps what the vault is given";

        let ciphertext = encrypt(&key, plaintext).unwrap();
        assert_eq!(ciphertext.len(), NONCE_BYTES + plaintext.len() + TAG_BYTES);

        let decrypted = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(&*decrypted, plaintext);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let mut ciphertext = encrypt(&key, b"integrity matters").unwrap();

        let mid = ciphertext.len() / 2;
        ciphertext[mid] ^= 0xFF;

        assert!(matches!(
            decrypt(&key, &ciphertext),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = test_key();
        let ciphertext = encrypt(&key, b"secret").unwrap();

        let mut other_bytes = [0x43u8; AES256_KEY_SIZE];
        let other = SecureKey::new(&mut other_bytes).unwrap();

        assert!(matches!(
            decrypt(&other, &ciphertext),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let key = test_key();
        assert!(matches!(
            decrypt(&key, &[0u8; NONCE_BYTES + TAG_BYTES - 1]),
            Err(Error::CiphertextTooShort)
        ));
    }

    #[test]
    fn test_nonces_never_repeat_across_calls() {
        let key = test_key();
        let a = encrypt(&key, b"same plaintext").unwrap();
        let b = encrypt(&key, b"same plaintext").unwrap();
        assert_ne!(a, b);
        assert_ne!(&a[..NONCE_BYTES], &b[..NONCE_BYTES]);
    }

    #[test]
    fn test_wrong_key_size_rejected() {
        let mut short = [1u8; 16];
        let key = SecureKey::new(&mut short).unwrap();
        assert!(matches!(
            encrypt(&key, b"data"),
            Err(Error::InvalidKeySize)
        ));
    }

    #[test]
    fn test_buffer_variants() {
        let key = test_key();

        let mut src = b"buffer to buffer".to_vec();
        let plain = SecureBuffer::from_bytes(&mut src).unwrap();

        let ciphertext = encrypt_buffer(&key, &plain).unwrap();
        let decrypted = decrypt_to_buffer(&key, &ciphertext).unwrap();

        decrypted
            .open(|d| assert_eq!(d, b"buffer to buffer"))
            .unwrap();
    }
}
