//! # Oubliette Core
//!
//! An ephemeral, in-memory vault for files and clipboard content on a
//! trusted local network, with an optional end-to-end-encrypted "sealed"
//! mode in which only the client holds the decryption key.
//!
//! Data never touches disk, lives only in protected memory, expires on a
//! timer, and is overwritten with a multi-pass pattern on deletion or
//! shutdown.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        OUBLIETTE CORE MODULES                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌──────────────┐  ┌──────────────────────────────┐   │
//! │  │  Session    │  │  FileStore   │  │  ClipboardStore              │   │
//! │  │             │  │              │  │                              │   │
//! │  │ - Lock FSM  │  │ - 64-bit ids │  │ - Text + image slots         │   │
//! │  │ - keyHash   │  │ - Expiry     │  │ - Swap-then-shred            │   │
//! │  │ - Salt      │  │ - E2EE blobs │  │ - E2EE blobs                 │   │
//! │  └──────┬──────┘  └──────┬───────┘  └──────────────┬───────────────┘   │
//! │         │                │                         │                   │
//! │         └────────────────┴─────────┬───────────────┘                   │
//! │                                    │                                    │
//! │  ┌─────────────────────────────────▼─────────────────────────────────┐ │
//! │  │                        Secure Memory                              │ │
//! │  │                                                                   │ │
//! │  │  FortifiedBuffer = scatter + XOR obfuscation + tripwire           │ │
//! │  │  SecureBuffer (mlock + guard pages)   SecureKey (sealed enclave)  │ │
//! │  │  MemoryTracker (hard cap)   DecoyPool (noise)   shred (DoD wipe)  │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │                                                                         │
//! │  Tripwire: TracerPid watcher → destroy fan-out → process exit          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Core configuration
//! - [`secure`] - Memory-protection primitives (components the stores build on)
//! - [`crypto`] - Random identifiers, PBKDF2, AES-256-GCM
//! - [`validate`] - Input validation for everything a client can send
//! - [`store`] - Session state machine, file store, clipboard store
//!
//! ## Sealed-Mode Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       LOCKED / UNLOCKED DUALITY                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Unlocked                         Locked (sealed)                      │
//! │  ────────────                     ────────────────                      │
//! │  Plaintext lives in fortified     Server holds ONLY:                   │
//! │  buffers (scattered, XOR-masked,  - SHA-256 of the derived key         │
//! │  pad rotating every 100 ms)       - the PBKDF2 salt                    │
//! │                                   - opaque AES-GCM blobs the client    │
//! │  get/store/list serve copies        encrypted locally                  │
//! │                                                                         │
//! │  No password, no plaintext: the server cannot decrypt its own memory.  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Adapter Boundary
//!
//! The HTTP transport, routing, rate limiting and the browser front-end are
//! external adapters. This crate exposes plain in-process calls taking
//! already-validated arguments and maps every failure onto [`Error`]; it
//! never formats wire-level messages itself. The process keeps no on-disk
//! state of any kind.

#![warn(missing_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod error;
pub mod secure;
pub mod store;
/// Time utilities shared by the stores.
pub mod time;
pub mod validate;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::CoreConfig;
pub use error::{Error, Result};
pub use secure::{
    FortifiedBuffer, FortifiedOptions, MemoryTracker, SecureBuffer, SecureKey,
};
pub use store::{
    ClipboardInfo, ClipboardStore, EncryptedFileRecord, FileInfo, FileStore, SessionManager,
    SessionStatus,
};

// ============================================================================
// CORE INSTANCE
// ============================================================================

use std::sync::Arc;

use once_cell::sync::OnceCell;

use secure::decoy::{global_decoy_pool, init_decoy_pool};
use secure::tripwire::global_tripwire;

/// Global core instance
static CORE_INSTANCE: OnceCell<Arc<OublietteCore>> = OnceCell::new();

/// The assembled vault: session manager, stores, tracker and the global
/// services, wired together in the order the teardown contract requires.
///
/// ## Lifecycle
///
/// ```text
/// initialize(config)
///   ├─ decoy pool up (noise starts immediately)
///   ├─ tripwire watching
///   ├─ memory tracker, session manager, stores
///   └─ tripwire callback: shred files → shred clipboard → destroy
///      session → exit(1)
///
/// shutdown()
///   ├─ shred all files
///   ├─ shred clipboard
///   ├─ destroy session
///   ├─ destroy decoy pool
///   └─ stop tripwire
/// ```
pub struct OublietteCore {
    config: CoreConfig,
    memory: Arc<MemoryTracker>,
    session: Arc<SessionManager>,
    files: Arc<FileStore>,
    clipboard: Arc<ClipboardStore>,
}

impl OublietteCore {
    /// Initializes the core with the given configuration.
    ///
    /// Call once at startup, inside a Tokio runtime. A second call fails
    /// with [`Error::AlreadyInitialized`].
    pub async fn initialize(config: CoreConfig) -> Result<Arc<Self>> {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            max_memory = config.max_memory,
            max_file_size = config.max_file_size,
            "initializing oubliette core"
        );

        // Noise first: decoys should be in place before any real secret.
        init_decoy_pool(
            config.decoy_count,
            config.decoy_min_size,
            config.decoy_max_size,
        );

        let tripwire = global_tripwire();

        let memory = Arc::new(MemoryTracker::new(config.max_memory)?);
        let session = Arc::new(SessionManager::new());
        let files = FileStore::new(Arc::clone(&memory), config.max_file_size, config.file_expiry);
        let clipboard = ClipboardStore::new(Arc::clone(&memory), config.clipboard_expiry);

        {
            let files = Arc::clone(&files);
            let clipboard = Arc::clone(&clipboard);
            let session = Arc::clone(&session);
            tripwire.register(move || {
                tracing::error!("intrusion detected, shredding all data");
                files.shred_all();
                clipboard.shred_all();
                session.destroy();
                std::process::exit(1);
            });
        }

        let core = Arc::new(Self {
            config,
            memory,
            session,
            files,
            clipboard,
        });

        CORE_INSTANCE
            .set(Arc::clone(&core))
            .map_err(|_| Error::AlreadyInitialized)?;

        tracing::info!("oubliette core initialized");
        Ok(core)
    }

    /// Returns the global core instance.
    pub fn instance() -> Result<Arc<Self>> {
        CORE_INSTANCE.get().cloned().ok_or(Error::NotInitialized)
    }

    /// Whether the core has been initialized.
    pub fn is_initialized() -> bool {
        CORE_INSTANCE.get().is_some()
    }

    /// Shreds everything and stops the background services.
    ///
    /// The adapter must have stopped accepting requests before calling
    /// this; the core tears down in the contract order regardless.
    pub async fn shutdown() -> Result<()> {
        let core = Self::instance()?;

        tracing::info!("shutting down, shredding all data");

        let file_count = core.files.shred_all();
        core.files.close();
        tracing::info!(count = file_count, "files shredded");

        core.clipboard.close();
        tracing::info!("clipboard shredded");

        core.session.destroy();
        tracing::info!("session destroyed");

        if let Some(pool) = global_decoy_pool() {
            pool.destroy();
        }
        global_tripwire().stop();

        tracing::info!("shutdown complete");
        Ok(())
    }

    /// The configuration the core was initialized with.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The global memory tracker.
    pub fn memory(&self) -> &Arc<MemoryTracker> {
        &self.memory
    }

    /// The session manager.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// The file store.
    pub fn files(&self) -> &Arc<FileStore> {
        &self.files
    }

    /// The clipboard store.
    pub fn clipboard(&self) -> &Arc<ClipboardStore> {
        &self.clipboard
    }

    /// Aggregate health snapshot for adapters.
    ///
    /// With `include_stats` the snapshot carries memory, store and session
    /// detail; without it only the liveness marker, which is what a probe
    /// endpoint should leak.
    pub fn status(&self, include_stats: bool) -> CoreStatus {
        if !include_stats {
            return CoreStatus {
                status: "ok",
                memory: None,
                files: None,
                clipboard: None,
                session: None,
            };
        }

        CoreStatus {
            status: "ok",
            memory: Some(self.memory.stats()),
            files: Some(self.files.stats()),
            clipboard: Some(self.clipboard.text_info()),
            session: Some(self.session.status()),
        }
    }
}

/// Aggregate health snapshot.
///
/// Everything in here is plain numbers and timestamps — no content, no
/// identifiers, no secret material.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CoreStatus {
    /// Liveness marker, always `"ok"` while the process serves
    pub status: &'static str,
    /// Memory tracker statistics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<secure::MemoryStats>,
    /// File store statistics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<store::FileStoreStats>,
    /// Clipboard text-slot metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clipboard: Option<ClipboardInfo>,
    /// Session state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStatus>,
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of the core crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    // Initialization is process-global, so the whole lifecycle lives in a
    // single test.
    #[tokio::test]
    async fn test_initialize_use_shutdown() {
        assert!(!OublietteCore::is_initialized());
        assert!(matches!(
            OublietteCore::instance(),
            Err(Error::NotInitialized)
        ));

        let config = CoreConfig {
            decoy_count: 4,
            decoy_min_size: 64,
            decoy_max_size: 128,
            ..CoreConfig::default()
        };
        let core = OublietteCore::initialize(config).await.unwrap();
        assert!(OublietteCore::is_initialized());

        // The stores are wired to the shared tracker
        let mut content = b"wired together".to_vec();
        let id = core
            .files()
            .store("wiring.txt", "text/plain", &mut content)
            .unwrap();
        assert_eq!(core.memory().allocated(), 14);

        let token = core.session().create_session().unwrap();
        assert_eq!(token.len(), 64);

        // Health snapshot: bare probe leaks nothing, stats variant carries
        // the counters
        let probe = serde_json::to_value(core.status(false)).unwrap();
        assert_eq!(probe, serde_json::json!({ "status": "ok" }));

        let full = serde_json::to_value(core.status(true)).unwrap();
        assert_eq!(full["status"], "ok");
        assert_eq!(full["memory"]["allocated"], 14);
        assert_eq!(full["files"]["file_count"], 1);
        assert_eq!(full["session"]["exists"], true);

        // Second initialization is rejected
        assert!(matches!(
            OublietteCore::initialize(CoreConfig::default()).await,
            Err(Error::AlreadyInitialized)
        ));

        OublietteCore::shutdown().await.unwrap();

        let core = OublietteCore::instance().unwrap();
        assert_eq!(core.files().count(), 0);
        assert_eq!(core.memory().allocated(), 0);
        assert!(matches!(core.files().get(&id), Err(Error::FileNotFound)));
        assert!(!core.session().status().exists);
    }
}
