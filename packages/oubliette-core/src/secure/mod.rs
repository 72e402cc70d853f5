//! # Secure Memory Primitives
//!
//! The in-memory data plane: every secret byte in the process lives behind
//! one of these types, with a single owner and a guaranteed wipe on the way
//! out.
//!
//! ## Layer Stack
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PROTECTION LAYERS                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  FortifiedBuffer           what the stores hold                 │   │
//! │  │  ──────────────────                                              │   │
//! │  │  scatter + per-chunk obfuscation + tripwire auto-destroy        │   │
//! │  └───────────────┬─────────────────────────┬───────────────────────┘   │
//! │                  │                         │                           │
//! │  ┌───────────────▼──────────┐  ┌───────────▼──────────────────────┐   │
//! │  │  ScatteredBuffer         │  │  ObfuscatedBuffer                │   │
//! │  │  chunks in shuffled      │  │  XOR pad, rotated every 100 ms   │   │
//! │  │  order                   │  │                                  │   │
//! │  └──────────────────────────┘  └──────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────────┐   │
//! │  │  SecureBuffer            │  │  SecureKey                       │   │
//! │  │  mlock'd pages, guard    │  │  encrypted at rest, plaintext    │   │
//! │  │  pages, wipe on drop     │  │  only inside with_key()          │   │
//! │  └──────────────────────────┘  └──────────────────────────────────┘   │
//! │                                                                         │
//! │  Cross-cutting: Tripwire (debugger watcher + destroy bus),             │
//! │  DecoyPool (noise), MemoryTracker (byte accounting), shred()           │
//! │  (DoD 5220.22-M four-pass wipe)                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership Model
//!
//! Every secret has exactly one owner in a tree (store → entry → fortified →
//! inner buffers). Borrowing is scoped through callbacks (`open`,
//! `with_key`, `with_data`); no long-lived references to secret bytes exist
//! anywhere. The tripwire holds only weak destroy handles, never buffers.

pub mod buffer;
pub mod decoy;
pub mod fortified;
pub mod key;
pub mod memory;
pub mod obfuscated;
pub mod scattered;
pub mod shred;
pub mod tripwire;

pub use buffer::{SecureBuffer, MAX_BUFFER_SIZE};
pub use decoy::{global_decoy_pool, init_decoy_pool, DecoyPool};
pub use fortified::{FortifiedBuffer, FortifiedOptions};
pub use key::{SecureKey, MAX_KEY_SIZE};
pub use memory::{default_tracker, MemoryStats, MemoryTracker, TrackedBuffer, TrackedKey};
pub use obfuscated::{ObfuscatedBuffer, DEFAULT_ROTATION_INTERVAL};
pub use scattered::{ScatteredBuffer, DEFAULT_CHUNK_SIZE};
pub use shred::{shred, Shredder};
pub use tripwire::{detect_intrusion, global_tripwire, Tripwire, TRIPWIRE_DISABLE_ENV};
