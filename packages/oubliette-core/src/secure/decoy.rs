//! # Decoy Pool
//!
//! A background pool of random-byte buffers that are indistinguishable from
//! ciphertext. Purely cosmetic memory pressure: anyone dumping the process
//! has to tell the real sealed data apart from the noise. No correctness
//! dependencies anywhere.
//!
//! One random slice is re-allocated with fresh random contents every 5
//! seconds so the pool never looks static across two dumps.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::secure::shred::shred;

/// Default number of decoy buffers.
pub const DEFAULT_DECOY_COUNT: usize = 50;

/// Default minimum decoy size (1 KiB).
pub const DEFAULT_DECOY_MIN_SIZE: usize = 1024;

/// Default maximum decoy size (512 KiB).
pub const DEFAULT_DECOY_MAX_SIZE: usize = 512 * 1024;

/// How often one random decoy is replaced.
pub const DECOY_ROTATION_INTERVAL: Duration = Duration::from_secs(5);

struct DecoyState {
    decoys: Vec<Zeroizing<Vec<u8>>>,
    min_size: usize,
    max_size: usize,
    count: usize,
    started: bool,
    rotation: Option<JoinHandle<()>>,
}

impl DecoyState {
    fn random_size(&self) -> usize {
        if self.max_size <= self.min_size {
            return self.min_size;
        }
        let mut raw = [0u8; 8];
        if OsRng.try_fill_bytes(&mut raw).is_err() {
            return self.min_size;
        }
        let span = (self.max_size - self.min_size) as u64;
        self.min_size + (u64::from_le_bytes(raw) % span) as usize
    }

    fn fresh_decoy(&self) -> Zeroizing<Vec<u8>> {
        let mut decoy = Zeroizing::new(vec![0u8; self.random_size()]);
        // A decoy that fails to fill stays zeroed; it still occupies space.
        let _ = OsRng.try_fill_bytes(decoy.as_mut_slice());
        decoy
    }

    fn rotate_random(&mut self) {
        if self.decoys.is_empty() {
            return;
        }

        let mut raw = [0u8; 8];
        if OsRng.try_fill_bytes(&mut raw).is_err() {
            return;
        }
        let idx = (u64::from_le_bytes(raw) % self.decoys.len() as u64) as usize;

        shred(self.decoys[idx].as_mut_slice());
        self.decoys[idx] = self.fresh_decoy();
    }
}

/// Pool of random buffers imitating ciphertext.
pub struct DecoyPool {
    state: Arc<RwLock<DecoyState>>,
}

impl DecoyPool {
    /// Creates a pool; call [`start`](Self::start) to allocate and rotate.
    /// Zero arguments fall back to the defaults.
    pub fn new(count: usize, min_size: usize, max_size: usize) -> Self {
        let count = if count == 0 { DEFAULT_DECOY_COUNT } else { count };
        let min_size = if min_size == 0 {
            DEFAULT_DECOY_MIN_SIZE
        } else {
            min_size
        };
        let max_size = if max_size == 0 {
            DEFAULT_DECOY_MAX_SIZE
        } else {
            max_size
        };
        let min_size = std::cmp::min(min_size, max_size);

        Self {
            state: Arc::new(RwLock::new(DecoyState {
                decoys: Vec::new(),
                min_size,
                max_size,
                count,
                started: false,
                rotation: None,
            })),
        }
    }

    /// Allocates the decoys and begins the rotation loop. Safe to call
    /// repeatedly. Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut state = self.state.write();
        if state.started {
            return;
        }
        state.started = true;

        let mut decoys = Vec::with_capacity(state.count);
        for _ in 0..state.count {
            decoys.push(state.fresh_decoy());
        }
        state.decoys = decoys;

        let weak = Arc::downgrade(&self.state);
        state.rotation = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DECOY_ROTATION_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(state) = weak.upgrade() else { return };
                state.write().rotate_random();
            }
        }));

        tracing::debug!(count = state.count, "decoy pool started");
    }

    /// Returns the number of decoys in the pool.
    pub fn count(&self) -> usize {
        self.state.read().decoys.len()
    }

    /// Returns the total memory used by all decoys.
    pub fn total_size(&self) -> usize {
        self.state.read().decoys.iter().map(|d| d.len()).sum()
    }

    /// Stops rotation and shreds all decoys. Safe to call repeatedly.
    pub fn destroy(&self) {
        let mut state = self.state.write();
        if let Some(handle) = state.rotation.take() {
            handle.abort();
        }
        for decoy in state.decoys.iter_mut() {
            shred(decoy.as_mut_slice());
        }
        state.decoys = Vec::new();
    }
}

// ============================================================================
// GLOBAL INSTANCE
// ============================================================================

static DECOY_POOL: OnceCell<DecoyPool> = OnceCell::new();

/// Initializes the global decoy pool. Safe to call multiple times —
/// subsequent calls are no-ops. Must be called within a Tokio runtime.
pub fn init_decoy_pool(count: usize, min_size: usize, max_size: usize) -> &'static DecoyPool {
    DECOY_POOL.get_or_init(|| {
        let pool = DecoyPool::new(count, min_size, max_size);
        pool.start();
        pool
    })
}

/// Returns the global decoy pool if it has been initialized.
pub fn global_decoy_pool() -> Option<&'static DecoyPool> {
    DECOY_POOL.get()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_allocates_count() {
        let pool = DecoyPool::new(8, 128, 512);
        pool.start();

        assert_eq!(pool.count(), 8);
        let total = pool.total_size();
        assert!(total >= 8 * 128 && total <= 8 * 512);

        pool.destroy();
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let pool = DecoyPool::new(4, 64, 64);
        pool.start();
        pool.start();
        assert_eq!(pool.count(), 4);
        pool.destroy();
    }

    #[tokio::test]
    async fn test_rotate_keeps_count() {
        let pool = DecoyPool::new(5, 64, 256);
        pool.start();

        for _ in 0..10 {
            pool.state.write().rotate_random();
        }
        assert_eq!(pool.count(), 5);

        pool.destroy();
    }

    #[tokio::test]
    async fn test_destroy_clears_pool() {
        let pool = DecoyPool::new(4, 64, 64);
        pool.start();
        pool.destroy();
        pool.destroy();

        assert_eq!(pool.count(), 0);
        assert_eq!(pool.total_size(), 0);
    }

    #[tokio::test]
    async fn test_zero_args_use_defaults() {
        let pool = DecoyPool::new(0, 0, 0);
        let state = pool.state.read();
        assert_eq!(state.count, DEFAULT_DECOY_COUNT);
        assert_eq!(state.min_size, DEFAULT_DECOY_MIN_SIZE);
        assert_eq!(state.max_size, DEFAULT_DECOY_MAX_SIZE);
    }

    #[tokio::test]
    async fn test_global_init_is_noop_on_second_call() {
        // The global pool is process-wide; another test (or the core
        // orchestrator) may have initialized or torn it down already, so
        // only assert the no-op property.
        let first = init_decoy_pool(3, 32, 64);
        let count_after_first = first.count();

        let second = init_decoy_pool(99, 1024, 2048);

        assert!(std::ptr::eq(first, second));
        assert_eq!(second.count(), count_after_first);
        assert!(global_decoy_pool().is_some());
    }
}
