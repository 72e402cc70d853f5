//! # Error Handling
//!
//! This module provides the error types for the entire Oubliette core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Secure Memory Errors (100-199)                                    │
//! │  │   ├── BufferDestroyed       - buffer already torn down              │
//! │  │   ├── KeyDestroyed          - sealed key already torn down          │
//! │  │   ├── BufferTooLarge        - over the 100 MiB hard cap             │
//! │  │   ├── Alloc                 - page lock / guard page refusal        │
//! │  │   └── MemoryLimitExceeded   - tracker refused the allocation        │
//! │  │                                                                      │
//! │  ├── Crypto Errors (200-299)                                           │
//! │  │   ├── RandomGeneration      - CSPRNG read failed                    │
//! │  │   ├── DecryptionFailed      - tag mismatch / wrong key              │
//! │  │   └── SaltInvalid           - salt shorter than 16 bytes            │
//! │  │                                                                      │
//! │  ├── Validation Errors (300-399)                                       │
//! │  │   ├── InvalidFileId         - not 16 hex characters                 │
//! │  │   ├── InvalidSessionToken   - not 64 hex characters                 │
//! │  │   ├── FilenamePathTraversal - filename contains ".."                │
//! │  │   └── ClipboardTooLarge     - clipboard text over 1 MiB             │
//! │  │                                                                      │
//! │  ├── Session Errors (400-499)                                          │
//! │  │   ├── SessionLocked         - operation requires unlocked state     │
//! │  │   ├── SessionNotLocked      - operation requires locked state       │
//! │  │   └── InvalidPassword       - constant-time key-hash check failed   │
//! │  │                                                                      │
//! │  ├── Store Errors (500-599)                                            │
//! │  │   ├── FileNotFound          - id unknown                            │
//! │  │   ├── FileExpired           - entry timestamp in the past           │
//! │  │   ├── FileTooLarge          - over the per-file limit               │
//! │  │   └── ClipboardEmpty        - slot holds nothing readable           │
//! │  │                                                                      │
//! │  └── Core Lifecycle Errors (900-999)                                   │
//! │      ├── NotInitialized        - core not initialized                  │
//! │      └── AlreadyInitialized    - core already initialized              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No error message ever contains secret bytes, and no operation retries on
//! error. Adapters map these kinds onto their own wire codes; the core never
//! formats transport-level messages itself.

use thiserror::Error;

/// Result type alias for Oubliette core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Oubliette core
///
/// All errors are categorized by module/domain to make error handling
/// clearer and to provide meaningful error messages to adapters.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Secure Memory Errors (100-199)
    // ========================================================================
    /// Buffer has already been securely wiped
    #[error("secure buffer has been destroyed")]
    BufferDestroyed,

    /// Sealed key has already been securely wiped
    #[error("secure key has been destroyed")]
    KeyDestroyed,

    /// Obfuscated buffer has already been securely wiped
    #[error("obfuscated buffer has been destroyed")]
    ObfuscatedDestroyed,

    /// Scattered buffer has already been securely wiped
    #[error("scattered buffer has been destroyed")]
    ScatteredDestroyed,

    /// Fortified buffer has already been securely wiped
    #[error("fortified buffer has been destroyed")]
    FortifiedDestroyed,

    /// An empty buffer was provided where content is required
    #[error("buffer cannot be empty")]
    BufferEmpty,

    /// The buffer exceeds the hard per-buffer cap
    #[error("buffer exceeds maximum size (100 MiB)")]
    BufferTooLarge,

    /// Key material was empty
    #[error("key data cannot be empty")]
    KeyEmpty,

    /// The key exceeds the sealed-enclave cap
    #[error("key exceeds maximum size (64 bytes)")]
    KeyTooLarge,

    /// The host refused a protected-memory operation (mmap/mlock/mprotect)
    #[error("failed to allocate protected memory: {0}")]
    Alloc(String),

    /// The memory tracker refused the allocation (storage full)
    #[error("secure memory limit exceeded")]
    MemoryLimitExceeded,

    /// Memory limit below the supported minimum
    #[error("memory limit must be at least 1 MiB")]
    InvalidMemoryLimit,

    // ========================================================================
    // Crypto Errors (200-299)
    // ========================================================================
    /// The CSPRNG failed to produce bytes
    #[error("failed to generate cryptographically secure random bytes")]
    RandomGeneration,

    /// An empty password was provided
    #[error("password cannot be empty")]
    PasswordEmpty,

    /// Salt does not meet the minimum length
    #[error("salt must be at least 16 bytes")]
    SaltInvalid,

    /// Key is not 32 bytes (AES-256)
    #[error("key must be 32 bytes for AES-256")]
    InvalidKeySize,

    /// Encryption operation failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption failed (wrong key or tampered data)
    #[error("decryption failed: data may be corrupted or key is wrong")]
    DecryptionFailed,

    /// Ciphertext shorter than nonce + tag
    #[error("ciphertext too short")]
    CiphertextTooShort,

    // ========================================================================
    // Validation Errors (300-399)
    // ========================================================================
    /// File id is not 16 lowercase hex characters
    #[error("invalid file ID: must be 16 hex characters")]
    InvalidFileId,

    /// Session token is not 64 lowercase hex characters
    #[error("invalid session token: must be 64 hex characters")]
    InvalidSessionToken,

    /// Key hash is not exactly 32 bytes
    #[error("invalid key hash: must be 32 bytes")]
    InvalidKeyHash,

    /// Empty filename
    #[error("filename cannot be empty")]
    FilenameEmpty,

    /// Filename over 255 characters
    #[error("filename too long")]
    FilenameTooLong,

    /// Filename contains characters that cannot be sanitised away
    #[error("filename contains invalid characters")]
    FilenameInvalid,

    /// Filename attempts path traversal
    #[error("filename contains path traversal")]
    FilenamePathTraversal,

    /// Clipboard content exceeds the 1 MiB cap
    #[error("clipboard content too large")]
    ClipboardTooLarge,

    /// Empty input where content is required
    #[error("input cannot be empty")]
    EmptyInput,

    /// Password shorter than the minimum
    #[error("password too short")]
    PasswordTooShort,

    /// Password longer than the 1 KiB cap
    #[error("password too long")]
    PasswordTooLong,

    /// Password was not valid base64
    #[error("invalid password encoding")]
    PasswordInvalid,

    // ========================================================================
    // Session Errors (400-499)
    // ========================================================================
    /// The session is locked; the plaintext path is unavailable
    #[error("session is locked")]
    SessionLocked,

    /// The session is not locked; the operation needs a locked session
    #[error("session is not locked")]
    SessionNotLocked,

    /// Constant-time key-hash verification failed
    #[error("invalid password")]
    InvalidPassword,

    // ========================================================================
    // Store Errors (500-599)
    // ========================================================================
    /// No file with that id (or the entry holds only ciphertext)
    #[error("file not found")]
    FileNotFound,

    /// The file's expiry timestamp is in the past
    #[error("file expired")]
    FileExpired,

    /// File content exceeds the per-file limit
    #[error("file too large")]
    FileTooLarge,

    /// The clipboard slot is empty (or holds only ciphertext)
    #[error("clipboard is empty")]
    ClipboardEmpty,

    /// The clipboard entry's expiry timestamp is in the past
    #[error("clipboard content expired")]
    ClipboardExpired,

    // ========================================================================
    // Core Lifecycle Errors (900-999)
    // ========================================================================
    /// Core has not been initialized
    #[error("oubliette core has not been initialized")]
    NotInitialized,

    /// Core has already been initialized
    #[error("oubliette core has already been initialized")]
    AlreadyInitialized,
}

impl Error {
    /// Get the numeric error code for adapters
    ///
    /// Error codes are organized by category:
    /// - 100-199: Secure memory
    /// - 200-299: Crypto
    /// - 300-399: Validation
    /// - 400-499: Session
    /// - 500-599: Stores
    /// - 900-999: Core lifecycle
    pub fn code(&self) -> i32 {
        match self {
            // Secure memory (100-199)
            Error::BufferDestroyed => 100,
            Error::KeyDestroyed => 101,
            Error::ObfuscatedDestroyed => 102,
            Error::ScatteredDestroyed => 103,
            Error::FortifiedDestroyed => 104,
            Error::BufferEmpty => 105,
            Error::BufferTooLarge => 106,
            Error::KeyEmpty => 107,
            Error::KeyTooLarge => 108,
            Error::Alloc(_) => 109,
            Error::MemoryLimitExceeded => 110,
            Error::InvalidMemoryLimit => 111,

            // Crypto (200-299)
            Error::RandomGeneration => 200,
            Error::PasswordEmpty => 201,
            Error::SaltInvalid => 202,
            Error::InvalidKeySize => 203,
            Error::EncryptionFailed => 204,
            Error::DecryptionFailed => 205,
            Error::CiphertextTooShort => 206,

            // Validation (300-399)
            Error::InvalidFileId => 300,
            Error::InvalidSessionToken => 301,
            Error::InvalidKeyHash => 302,
            Error::FilenameEmpty => 303,
            Error::FilenameTooLong => 304,
            Error::FilenameInvalid => 305,
            Error::FilenamePathTraversal => 306,
            Error::ClipboardTooLarge => 307,
            Error::EmptyInput => 308,
            Error::PasswordTooShort => 309,
            Error::PasswordTooLong => 310,
            Error::PasswordInvalid => 311,

            // Session (400-499)
            Error::SessionLocked => 400,
            Error::SessionNotLocked => 401,
            Error::InvalidPassword => 402,

            // Stores (500-599)
            Error::FileNotFound => 500,
            Error::FileExpired => 501,
            Error::FileTooLarge => 502,
            Error::ClipboardEmpty => 503,
            Error::ClipboardExpired => 504,

            // Core lifecycle (900-999)
            Error::NotInitialized => 900,
            Error::AlreadyInitialized => 901,
        }
    }

    /// Whether the error indicates the target object was already torn down
    ///
    /// Destroyed-state errors are expected only during shutdown races; seeing
    /// one anywhere else is a bug in the caller.
    pub fn is_destroyed(&self) -> bool {
        matches!(
            self,
            Error::BufferDestroyed
                | Error::KeyDestroyed
                | Error::ObfuscatedDestroyed
                | Error::ScatteredDestroyed
                | Error::FortifiedDestroyed
        )
    }

    /// Whether the error is an input-validation failure
    pub fn is_invalid_input(&self) -> bool {
        (300..400).contains(&self.code())
    }

    /// Whether the error means "nothing stored under that key"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FileNotFound | Error::ClipboardEmpty)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::BufferDestroyed.code(), 100);
        assert_eq!(Error::RandomGeneration.code(), 200);
        assert_eq!(Error::InvalidFileId.code(), 300);
        assert_eq!(Error::SessionLocked.code(), 400);
        assert_eq!(Error::FileNotFound.code(), 500);
        assert_eq!(Error::NotInitialized.code(), 900);
    }

    #[test]
    fn test_destroyed_classification() {
        assert!(Error::BufferDestroyed.is_destroyed());
        assert!(Error::FortifiedDestroyed.is_destroyed());
        assert!(!Error::FileNotFound.is_destroyed());
    }

    #[test]
    fn test_invalid_input_classification() {
        assert!(Error::InvalidFileId.is_invalid_input());
        assert!(Error::FilenamePathTraversal.is_invalid_input());
        assert!(!Error::SessionLocked.is_invalid_input());
    }

    #[test]
    fn test_messages_contain_no_secret_bytes() {
        // Every message is a fixed string (or carries only an OS error string)
        let msg = Error::InvalidPassword.to_string();
        assert_eq!(msg, "invalid password");
        let msg = Error::DecryptionFailed.to_string();
        assert!(!msg.is_empty());
    }
}
