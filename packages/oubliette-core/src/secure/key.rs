//! # Sealed Key Enclave
//!
//! [`SecureKey`] keeps key material **encrypted at rest in RAM** with a
//! process-internal key, so a memory dump taken between uses captures only
//! ciphertext. The plaintext exists solely inside the [`SecureKey::with_key`]
//! callback frame, staged in a locked [`SecureBuffer`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SEALED KEY LIFECYCLE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  new(key_bytes)                                                         │
//! │    │  AES-256-GCM encrypt under the process key, shred the source      │
//! │    ▼                                                                    │
//! │  [ sealed: nonce ‖ ciphertext ‖ tag ]   ← at rest, dump-resistant      │
//! │    │                                                                    │
//! │    │  with_key(|k| ...)                                                │
//! │    ▼                                                                    │
//! │  decrypt → locked SecureBuffer → closure(&[u8]) → wipe + discard       │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  destroy()  — zeroizes the sealed bytes, idempotent                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! **Never store or copy the key slice outside the callback.** Any such
//! escape is a contract violation the type system cannot catch for you.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::secure::buffer::SecureBuffer;
use crate::secure::shred::shred;

/// Hard cap for sealed key material (512 bits).
pub const MAX_KEY_SIZE: usize = 64;

/// AES-GCM nonce size used for the sealing cipher.
const SEAL_NONCE_SIZE: usize = 12;

/// The process-internal sealing key, generated once and held in a locked
/// buffer for the lifetime of the process.
static PROCESS_KEY: OnceCell<SecureBuffer> = OnceCell::new();

fn process_key() -> Result<&'static SecureBuffer> {
    PROCESS_KEY.get_or_try_init(|| {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(&mut key[..])
            .map_err(|_| Error::RandomGeneration)?;
        SecureBuffer::from_bytes(&mut key[..])
    })
}

fn process_cipher() -> Result<Aes256Gcm> {
    let key = process_key()?;
    key.open(|k| Aes256Gcm::new_from_slice(k).map_err(|_| Error::InvalidKeySize))?
}

struct KeyInner {
    /// `nonce ‖ ciphertext ‖ tag` under the process key
    sealed: Option<Zeroizing<Vec<u8>>>,
    size: usize,
    destroyed: bool,
}

/// Key material encrypted at rest in RAM.
///
/// ## Contracts
///
/// - The plaintext never outlives the [`with_key`](Self::with_key) frame
/// - Concurrent `with_key` calls on the same key serialise
/// - Destruction zeroizes the sealed bytes and is idempotent
/// - [`try_clone`](Self::try_clone) produces an independent enclave
/// - Equality is constant-time
pub struct SecureKey {
    inner: Mutex<KeyInner>,
}

impl SecureKey {
    /// Seals the given key bytes, then shreds the source slice.
    ///
    /// Fails with [`Error::KeyEmpty`] for empty input and
    /// [`Error::KeyTooLarge`] above 64 bytes.
    pub fn new(key_data: &mut [u8]) -> Result<Self> {
        if key_data.is_empty() {
            return Err(Error::KeyEmpty);
        }
        if key_data.len() > MAX_KEY_SIZE {
            return Err(Error::KeyTooLarge);
        }

        let cipher = process_cipher()?;

        let mut nonce = [0u8; SEAL_NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| Error::RandomGeneration)?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), &*key_data)
            .map_err(|_| Error::EncryptionFailed)?;

        let size = key_data.len();
        shred(key_data);

        let mut sealed = Vec::with_capacity(SEAL_NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(Self {
            inner: Mutex::new(KeyInner {
                sealed: Some(Zeroizing::new(sealed)),
                size,
                destroyed: false,
            }),
        })
    }

    /// Seals the contents of a [`SecureBuffer`], destroying the buffer.
    ///
    /// Prefer this over [`new`](Self::new) when the key already lives in
    /// locked memory; the plaintext never touches unprotected pages.
    pub fn from_buffer(buf: SecureBuffer) -> Result<Self> {
        buf.seal()
    }

    /// Returns the size of the key in bytes, or 0 once destroyed.
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    /// Provides scoped access to the decrypted key.
    ///
    /// The key is decrypted into a transient locked buffer, handed to the
    /// closure, then wiped. This is the ONLY way to reach the key bytes.
    pub fn with_key<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let inner = self.inner.lock();
        if inner.destroyed {
            return Err(Error::KeyDestroyed);
        }
        let sealed = inner.sealed.as_ref().ok_or(Error::KeyDestroyed)?;

        let cipher = process_cipher()?;
        let nonce = Nonce::from_slice(&sealed[..SEAL_NONCE_SIZE]);
        let mut plain = Zeroizing::new(
            cipher
                .decrypt(nonce, &sealed[SEAL_NONCE_SIZE..])
                .map_err(|_| Error::DecryptionFailed)?,
        );

        // Stage the plaintext in a locked buffer for the closure frame.
        let buf = SecureBuffer::from_bytes(plain.as_mut_slice())?;
        let out = buf.open(|k| f(k));
        buf.destroy();
        out
    }

    /// Securely wipes the sealed key. Safe to call repeatedly.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return;
        }
        // Zeroizing wipes the sealed bytes as they drop.
        inner.sealed = None;
        inner.size = 0;
        inner.destroyed = true;
    }

    /// Returns whether the key has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// Creates an independent sealed copy of this key.
    pub fn try_clone(&self) -> Result<Self> {
        let mut plain = self.with_key(|k| Zeroizing::new(k.to_vec()))?;
        Self::new(plain.as_mut_slice())
    }

    /// Constant-time equality with another sealed key.
    ///
    /// Returns `false` without touching key material when the sizes differ;
    /// fails with [`Error::KeyDestroyed`] if either side is destroyed.
    pub fn ct_eq(&self, other: &SecureKey) -> Result<bool> {
        // Same object is always equal to itself (and avoids self-deadlock).
        if std::ptr::eq(self, other) {
            return Ok(true);
        }
        if self.is_destroyed() || other.is_destroyed() {
            return Err(Error::KeyDestroyed);
        }
        if self.size() != other.size() {
            return Ok(false);
        }

        let eq = self.with_key(|a| other.with_key(|b| bool::from(a.ct_eq(b))))??;
        Ok(eq)
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, sealed or otherwise.
        f.debug_struct("SecureKey")
            .field("size", &self.size())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
