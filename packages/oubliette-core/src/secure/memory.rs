//! # Memory Tracker
//!
//! Global byte accounting with a hard cap. Every store allocation that
//! consumes tracked bytes pairs with a matching `free` on every path —
//! success, error, expiry sweep or shred — so `allocated` always equals the
//! bytes genuinely outstanding.
//!
//! The tracked-buffer helpers bundle a [`SecureBuffer`]/[`SecureKey`] with
//! its accounting: the guard frees the reservation exactly once, on explicit
//! [`release`](TrackedBuffer::release) or on drop, whichever comes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::secure::buffer::SecureBuffer;
use crate::secure::key::SecureKey;

/// Default maximum secure memory (512 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

/// Minimum allowed memory limit (1 MiB).
pub const MIN_MEMORY_LIMIT: usize = 1024 * 1024;

struct TrackerState {
    allocated: usize,
    limit: usize,
}

/// Tracks secure memory allocations and enforces the cap.
///
/// ## Invariants
///
/// - `allocated` is never negative and never exceeds `limit`
/// - a refused allocation leaves the counters untouched
pub struct MemoryTracker {
    state: RwLock<TrackerState>,
}

/// Point-in-time memory statistics. Plain numbers only — nothing here ever
/// exposes internal pointers.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    /// Bytes currently reserved
    pub allocated: usize,
    /// Hard cap in bytes
    pub limit: usize,
    /// Bytes still available
    pub available: usize,
    /// Utilization as a percentage (0-100)
    pub usage_percent: f64,
}

impl MemoryTracker {
    /// Creates a tracker with the given limit. Pass 0 for the 512 MiB
    /// default; limits under 1 MiB are rejected.
    pub fn new(limit: usize) -> Result<Self> {
        let limit = if limit == 0 { DEFAULT_MEMORY_LIMIT } else { limit };
        if limit < MIN_MEMORY_LIMIT {
            return Err(Error::InvalidMemoryLimit);
        }
        Ok(Self::unchecked(limit))
    }

    fn unchecked(limit: usize) -> Self {
        Self {
            state: RwLock::new(TrackerState {
                allocated: 0,
                limit,
            }),
        }
    }

    /// Reserves `size` bytes, failing with [`Error::MemoryLimitExceeded`]
    /// when the reservation would pass the cap.
    pub fn allocate(&self, size: usize) -> Result<()> {
        if size == 0 {
            return Ok(());
        }

        let mut state = self.state.write();
        if state.allocated + size > state.limit {
            return Err(Error::MemoryLimitExceeded);
        }
        state.allocated += size;
        Ok(())
    }

    /// Releases `size` bytes, saturating at zero.
    pub fn free(&self, size: usize) {
        if size == 0 {
            return;
        }
        let mut state = self.state.write();
        state.allocated = state.allocated.saturating_sub(size);
    }

    /// Returns the bytes currently reserved.
    pub fn allocated(&self) -> usize {
        self.state.read().allocated
    }

    /// Returns the hard cap in bytes.
    pub fn limit(&self) -> usize {
        self.state.read().limit
    }

    /// Returns the bytes still available for reservation.
    pub fn available(&self) -> usize {
        let state = self.state.read();
        state.limit - state.allocated
    }

    /// Returns utilization as a percentage (0-100).
    pub fn usage_percent(&self) -> f64 {
        let state = self.state.read();
        if state.limit == 0 {
            return 0.0;
        }
        state.allocated as f64 / state.limit as f64 * 100.0
    }

    /// Clears all reservations. Use with caution.
    pub fn reset(&self) {
        self.state.write().allocated = 0;
    }

    /// Returns current statistics.
    pub fn stats(&self) -> MemoryStats {
        let state = self.state.read();
        MemoryStats {
            allocated: state.allocated,
            limit: state.limit,
            available: state.limit - state.allocated,
            usage_percent: if state.limit == 0 {
                0.0
            } else {
                state.allocated as f64 / state.limit as f64 * 100.0
            },
        }
    }

    /// Reserves `size` bytes and builds a [`SecureBuffer`] of that size.
    ///
    /// A buffer failure after a successful reservation frees it before the
    /// error surfaces.
    pub fn tracked_buffer(self: &Arc<Self>, size: usize) -> Result<TrackedBuffer> {
        self.allocate(size)?;

        let buf = match SecureBuffer::new(size) {
            Ok(buf) => buf,
            Err(err) => {
                self.free(size);
                return Err(err);
            }
        };

        Ok(TrackedBuffer {
            buf,
            tracker: Arc::clone(self),
            size,
            released: AtomicBool::new(false),
        })
    }

    /// Reserves bytes for a copy of `data` in a [`SecureBuffer`], shredding
    /// the source.
    pub fn tracked_buffer_from_bytes(self: &Arc<Self>, data: &mut [u8]) -> Result<TrackedBuffer> {
        let size = data.len();
        self.allocate(size)?;

        let buf = match SecureBuffer::from_bytes(data) {
            Ok(buf) => buf,
            Err(err) => {
                self.free(size);
                return Err(err);
            }
        };

        Ok(TrackedBuffer {
            buf,
            tracker: Arc::clone(self),
            size,
            released: AtomicBool::new(false),
        })
    }

    /// Reserves bytes for a sealed [`SecureKey`] built from `key_data`,
    /// shredding the source.
    pub fn tracked_key(self: &Arc<Self>, key_data: &mut [u8]) -> Result<TrackedKey> {
        let size = key_data.len();
        self.allocate(size)?;

        let key = match SecureKey::new(key_data) {
            Ok(key) => key,
            Err(err) => {
                self.free(size);
                return Err(err);
            }
        };

        Ok(TrackedKey {
            key,
            tracker: Arc::clone(self),
            size,
            released: AtomicBool::new(false),
        })
    }
}

// ============================================================================
// TRACKED GUARDS
// ============================================================================

/// A [`SecureBuffer`] whose reservation is released exactly once — on
/// [`release`](Self::release) or on drop.
pub struct TrackedBuffer {
    buf: SecureBuffer,
    tracker: Arc<MemoryTracker>,
    size: usize,
    released: AtomicBool,
}

impl TrackedBuffer {
    /// Destroys the buffer and frees the reservation. Idempotent.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            if !self.buf.is_destroyed() {
                self.buf.destroy();
            }
            self.tracker.free(self.size);
        }
    }
}

impl std::ops::Deref for TrackedBuffer {
    type Target = SecureBuffer;

    fn deref(&self) -> &SecureBuffer {
        &self.buf
    }
}

impl Drop for TrackedBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

/// A [`SecureKey`] whose reservation is released exactly once — on
/// [`release`](Self::release) or on drop.
pub struct TrackedKey {
    key: SecureKey,
    tracker: Arc<MemoryTracker>,
    size: usize,
    released: AtomicBool,
}

impl TrackedKey {
    /// Destroys the key and frees the reservation. Idempotent.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            if !self.key.is_destroyed() {
                self.key.destroy();
            }
            self.tracker.free(self.size);
        }
    }
}

impl std::ops::Deref for TrackedKey {
    type Target = SecureKey;

    fn deref(&self) -> &SecureKey {
        &self.key
    }
}

impl Drop for TrackedKey {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// GLOBAL INSTANCE
// ============================================================================

static DEFAULT_TRACKER: OnceCell<Arc<MemoryTracker>> = OnceCell::new();

/// Returns the process-wide default tracker (512 MiB limit).
pub fn default_tracker() -> &'static Arc<MemoryTracker> {
    DEFAULT_TRACKER.get_or_init(|| Arc::new(MemoryTracker::unchecked(DEFAULT_MEMORY_LIMIT)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let tracker = MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap();

        tracker.allocate(1000).unwrap();
        assert_eq!(tracker.allocated(), 1000);
        assert_eq!(tracker.available(), MIN_MEMORY_LIMIT - 1000);

        tracker.free(400);
        assert_eq!(tracker.allocated(), 600);

        tracker.free(10_000); // saturates at zero
        assert_eq!(tracker.allocated(), 0);
    }

    #[test]
    fn test_limit_refusal_leaves_counters_untouched() {
        let tracker = MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap();

        tracker.allocate(MIN_MEMORY_LIMIT).unwrap();
        assert!(matches!(
            tracker.allocate(1),
            Err(Error::MemoryLimitExceeded)
        ));
        assert_eq!(tracker.allocated(), MIN_MEMORY_LIMIT);
    }

    #[test]
    fn test_limit_validation() {
        assert!(matches!(
            MemoryTracker::new(MIN_MEMORY_LIMIT - 1),
            Err(Error::InvalidMemoryLimit)
        ));
        // 0 selects the default
        let tracker = MemoryTracker::new(0).unwrap();
        assert_eq!(tracker.limit(), DEFAULT_MEMORY_LIMIT);
    }

    #[test]
    fn test_usage_percent_and_stats() {
        let tracker = MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap();
        tracker.allocate(MIN_MEMORY_LIMIT / 2).unwrap();

        assert!((tracker.usage_percent() - 50.0).abs() < f64::EPSILON);

        let stats = tracker.stats();
        assert_eq!(stats.allocated, MIN_MEMORY_LIMIT / 2);
        assert_eq!(stats.available, MIN_MEMORY_LIMIT / 2);

        // Stats serialize to plain numbers
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["allocated"].is_number());
        assert!(json["usage_percent"].is_number());
    }

    #[test]
    fn test_tracked_buffer_frees_exactly_once() {
        let tracker = Arc::new(MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap());

        let buf = tracker.tracked_buffer(1024).unwrap();
        assert_eq!(tracker.allocated(), 1024);
        assert_eq!(buf.size(), 1024);

        buf.release();
        assert_eq!(tracker.allocated(), 0);

        // Release again, then drop: no double free
        buf.release();
        drop(buf);
        assert_eq!(tracker.allocated(), 0);
    }

    #[test]
    fn test_tracked_buffer_drop_frees() {
        let tracker = Arc::new(MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap());
        {
            let _buf = tracker.tracked_buffer(512).unwrap();
            assert_eq!(tracker.allocated(), 512);
        }
        assert_eq!(tracker.allocated(), 0);
    }

    #[test]
    fn test_tracked_buffer_build_failure_frees_reservation() {
        let tracker = Arc::new(MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap());

        // A zero-size buffer reserves nothing and fails construction; the
        // tracker must come out clean.
        assert!(tracker.tracked_buffer(0).is_err());
        assert_eq!(tracker.allocated(), 0);
    }

    #[test]
    fn test_tracked_buffer_from_bytes() {
        let tracker = Arc::new(MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap());

        let mut src = vec![0x42u8; 256];
        let buf = tracker.tracked_buffer_from_bytes(&mut src).unwrap();

        assert!(src.iter().all(|&b| b == 0));
        assert_eq!(tracker.allocated(), 256);
        buf.open(|d| assert!(d.iter().all(|&b| b == 0x42))).unwrap();

        drop(buf);
        assert_eq!(tracker.allocated(), 0);
    }

    #[test]
    fn test_tracked_key() {
        let tracker = Arc::new(MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap());

        let mut src = vec![0x11u8; 32];
        let key = tracker.tracked_key(&mut src).unwrap();
        assert_eq!(tracker.allocated(), 32);

        key.with_key(|k| assert_eq!(k.len(), 32)).unwrap();

        key.release();
        assert_eq!(tracker.allocated(), 0);
        assert!(key.is_destroyed());
    }

    #[test]
    fn test_default_tracker_is_singleton() {
        let a = default_tracker();
        let b = default_tracker();
        assert!(Arc::ptr_eq(a, b));
    }
}
