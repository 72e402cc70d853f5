//! # Cryptography Module
//!
//! Cryptographic primitives over the secure-memory types.
//!
//! ## Algorithm Choices & Rationale
//!
//! | Algorithm | Purpose | Why Chosen |
//! |-----------|---------|------------|
//! | AES-256-GCM | Symmetric encryption | Hardware acceleration, AEAD |
//! | PBKDF2-HMAC-SHA256 | Password key derivation | OWASP-recommended at 600k iterations |
//! | OsRng | Randomness | Kernel CSPRNG, fails loudly |
//! | subtle | Secret comparison | Constant-time, prevents timing attacks |
//!
//! ## Identifier Entropy
//!
//! | Identifier | Bytes | Encoding | Entropy |
//! |------------|-------|----------|---------|
//! | File id | 8 | 16 lowercase hex chars | 64 bits |
//! | Session token | 32 | 64 lowercase hex chars | 256 bits |
//! | PBKDF2 salt | 16 | raw | 128 bits |
//! | AES-GCM nonce | 12 | raw | 96 bits |
//!
//! The wire-level ciphertext format is `IV(12) ‖ ciphertext ‖ tag(16)` — the
//! same framing the browser client produces with WebCrypto, so locked-mode
//! blobs round-trip bit-exactly.

mod aes;
mod kdf;
mod random;

pub use aes::{decrypt, decrypt_to_buffer, encrypt, encrypt_buffer};
pub use kdf::{derive_key, derive_key_from_bytes, AES256_KEY_SIZE, PBKDF2_ITERATIONS};
pub use random::{
    constant_time_compare, generate_file_id, generate_salt, generate_session_token, random_bytes,
    random_bytes_raw, FILE_ID_BYTES, NONCE_BYTES, SALT_BYTES, SESSION_TOKEN_BYTES,
};
