//! # Session Manager
//!
//! The locked/unlocked state machine that gates plaintext vs. ciphertext
//! operation across the whole vault.
//!
//! ## State Machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SESSION STATE MACHINE                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │            create_session                                               │
//! │   None ───────────────────► Unlocked                                    │
//! │    │                          │   ▲                                     │
//! │    │ lock(hash, salt)         │   │ unlock (after verify_key_hash)     │
//! │    │ (creates the session)    │   │ force_unlock (shreds stores)       │
//! │    ▼                          ▼   │                                     │
//! │    └────────────────────►  Locked ┘                                     │
//! │                               │                                         │
//! │              destroy          │  verify_key_hash: constant-time,        │
//! │   Any ──────────────────► Destroyed        no state change              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sealed-Mode Contract
//!
//! While locked the server holds only `key_hash` (SHA-256 of the client's
//! password-derived key) and the PBKDF2 `salt` it must hand back for key
//! re-derivation. Neither is sufficient to decrypt anything. `unlock` takes
//! no candidate itself — the adapter calls [`SessionManager::verify_key_hash`]
//! first so a failed password surfaces without any state change, and a
//! locked session can only reach Unlocked through a successful constant-time
//! verification.
//!
//! Session transitions are linearisable: once `lock` returns, every
//! subsequent read observes Locked, and likewise for `unlock`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::crypto::{constant_time_compare, generate_session_token};
use crate::error::{Error, Result};
use crate::secure::shred::shred;

/// Required key-hash length (SHA-256 output).
pub const KEY_HASH_LENGTH: usize = 32;

/// Minimum salt length accepted on lock.
pub const MIN_SALT_LENGTH: usize = 16;

type EventCallback = Arc<dyn Fn() + Send + Sync + 'static>;

struct Session {
    token: String,
    locked: bool,
    created_at: DateTime<Utc>,
    locked_at: Option<DateTime<Utc>>,

    // Sealed-mode verification material. The server can verify a candidate
    // key hash; it can never derive the key.
    key_hash: Option<Zeroizing<Vec<u8>>>,
    salt: Option<Zeroizing<Vec<u8>>>,
}

impl Session {
    fn clear_secrets(&mut self) {
        if let Some(mut hash) = self.key_hash.take() {
            shred(hash.as_mut_slice());
        }
        if let Some(mut salt) = self.salt.take() {
            shred(salt.as_mut_slice());
        }
    }
}

struct ManagerState {
    session: Option<Session>,
    on_lock: Option<EventCallback>,
    on_unlock: Option<EventCallback>,
}

/// Current session status for adapters.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Whether a session exists at all
    pub exists: bool,
    /// Whether the session is locked (sealed mode)
    pub locked: bool,
    /// When the session was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the session was locked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

/// Manages the vault's single session and its lock state.
pub struct SessionManager {
    state: RwLock<ManagerState>,
}

impl SessionManager {
    /// Creates a session manager with no session.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ManagerState {
                session: None,
                on_lock: None,
                on_unlock: None,
            }),
        }
    }

    /// Creates a new unlocked session, replacing any existing one.
    /// Returns the session token (64 lowercase hex chars, 256 bits).
    pub fn create_session(&self) -> Result<String> {
        let token = generate_session_token()?;

        let mut state = self.state.write();
        state.session = Some(Session {
            token: token.clone(),
            locked: false,
            created_at: Utc::now(),
            locked_at: None,
            key_hash: None,
            salt: None,
        });

        tracing::debug!("session created");
        Ok(token)
    }

    /// Returns whether the session is locked. No session reads as unlocked.
    pub fn is_locked(&self) -> bool {
        self.state
            .read()
            .session
            .as_ref()
            .map(|s| s.locked)
            .unwrap_or(false)
    }

    /// Locks the session, storing the client's key hash and salt.
    ///
    /// Creates a session first when none exists. Fails with
    /// [`Error::SessionLocked`] when already locked, and validates
    /// `key_hash` (exactly 32 bytes) and `salt` (≥ 16 bytes).
    pub fn lock(&self, key_hash: &[u8], salt: &[u8]) -> Result<()> {
        if key_hash.len() != KEY_HASH_LENGTH {
            return Err(Error::InvalidKeyHash);
        }
        if salt.len() < MIN_SALT_LENGTH {
            return Err(Error::SaltInvalid);
        }

        let callback;
        {
            let mut state = self.state.write();

            if state.session.is_none() {
                state.session = Some(Session {
                    token: generate_session_token()?,
                    locked: false,
                    created_at: Utc::now(),
                    locked_at: None,
                    key_hash: None,
                    salt: None,
                });
            }

            let session = state.session.as_mut().ok_or(Error::SessionNotLocked)?;
            if session.locked {
                return Err(Error::SessionLocked);
            }

            session.key_hash = Some(Zeroizing::new(key_hash.to_vec()));
            session.salt = Some(Zeroizing::new(salt.to_vec()));
            session.locked = true;
            session.locked_at = Some(Utc::now());

            callback = state.on_lock.clone();
        }

        tracing::info!("session locked (sealed mode)");
        if let Some(cb) = callback {
            cb();
        }
        Ok(())
    }

    /// Verifies a candidate key hash against the stored one in constant
    /// time. Never changes state.
    pub fn verify_key_hash(&self, candidate: &[u8]) -> Result<()> {
        let state = self.state.read();
        let session = state.session.as_ref().ok_or(Error::SessionNotLocked)?;

        if !session.locked {
            return Err(Error::SessionNotLocked);
        }
        let stored = session.key_hash.as_ref().ok_or(Error::SessionNotLocked)?;

        if !constant_time_compare(stored, candidate) {
            return Err(Error::InvalidPassword);
        }

        Ok(())
    }

    /// Unlocks the session, shredding the stored key hash and salt.
    ///
    /// The candidate must already have passed
    /// [`verify_key_hash`](Self::verify_key_hash); this method takes none.
    pub fn unlock(&self) -> Result<()> {
        let callback;
        {
            let mut state = self.state.write();
            let session = state.session.as_mut().ok_or(Error::SessionNotLocked)?;

            if !session.locked {
                return Err(Error::SessionNotLocked);
            }

            session.clear_secrets();
            session.locked = false;
            session.locked_at = None;

            callback = state.on_unlock.clone();
        }

        tracing::info!("session unlocked");
        if let Some(cb) = callback {
            cb();
        }
        Ok(())
    }

    /// Emergency unlock without a password: invokes `shred_all` so the
    /// stores destroy every entry, then clears the verification material.
    ///
    /// This is the path for a forgotten password — the data is gone, but
    /// the vault is usable again.
    pub fn force_unlock(&self, shred_all: impl FnOnce()) -> Result<()> {
        let mut state = self.state.write();
        let session = state.session.as_mut().ok_or(Error::SessionNotLocked)?;

        if !session.locked {
            return Err(Error::SessionNotLocked);
        }

        shred_all();

        session.clear_secrets();
        session.locked = false;
        session.locked_at = None;

        tracing::warn!("session force-unlocked, all sealed data shredded");
        Ok(())
    }

    /// Returns a copy of the PBKDF2 salt while locked, `None` otherwise.
    pub fn get_salt(&self) -> Option<Vec<u8>> {
        let state = self.state.read();
        let session = state.session.as_ref()?;
        if !session.locked {
            return None;
        }
        session.salt.as_ref().map(|s| s.to_vec())
    }

    /// Returns the session token, or an empty string when no session
    /// exists.
    pub fn get_token(&self) -> String {
        self.state
            .read()
            .session
            .as_ref()
            .map(|s| s.token.clone())
            .unwrap_or_default()
    }

    /// Returns the current session status.
    pub fn status(&self) -> SessionStatus {
        let state = self.state.read();
        match &state.session {
            None => SessionStatus {
                exists: false,
                locked: false,
                created_at: None,
                locked_at: None,
            },
            Some(session) => SessionStatus {
                exists: true,
                locked: session.locked,
                created_at: Some(session.created_at),
                locked_at: session.locked_at,
            },
        }
    }

    /// Sets the callback fired after each successful lock.
    pub fn set_lock_callback(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.state.write().on_lock = Some(Arc::new(cb));
    }

    /// Sets the callback fired after each successful unlock.
    pub fn set_unlock_callback(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.state.write().on_unlock = Some(Arc::new(cb));
    }

    /// Shreds all verification material and drops the session.
    pub fn destroy(&self) {
        let mut state = self.state.write();
        if let Some(session) = state.session.as_mut() {
            session.clear_secrets();
        }
        state.session = None;
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
