//! # Stores
//!
//! The stateful heart of the vault: the session lock state machine and the
//! two content stores.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          STORE TOPOLOGY                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SessionManager ──── gates which path is legal ────┐                   │
//! │   locked?                                           │                   │
//! │     │ no  → plaintext ops (fortified buffers)       ▼                   │
//! │     │ yes → encrypted ops (opaque client blobs)   FileStore            │
//! │     │                                             ClipboardStore       │
//! │     ▼                                                │                  │
//! │  verify_key_hash (constant-time) guards unlock       │                  │
//! │                                                      ▼                  │
//! │                                              MemoryTracker             │
//! │                                     every byte reserved and released   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each store exclusively owns its entries; each entry exclusively owns its
//! buffers. Reads copy out; destruction shreds in place. Expiry sweepers
//! run once a minute per store, and expiry is an absolute timestamp — a
//! late sweep never extends a lifetime.

pub mod clipboard;
pub mod files;
pub mod session;

pub use clipboard::{ClipboardInfo, ClipboardKind, ClipboardStore};
pub use files::{EncryptedFileRecord, FileInfo, FileStore, FileStoreStats};
pub use session::{SessionManager, SessionStatus, KEY_HASH_LENGTH, MIN_SALT_LENGTH};
