//! # Obfuscated Buffer
//!
//! Stores data XOR-masked with a pad of equal length and rotates the pad on a
//! timer. A memory-forensics pass has to capture `data` and `pad` inside the
//! same rotation window to recover anything.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PAD ROTATION CYCLE                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   at rest:      data = plaintext ⊕ pad                                 │
//! │                                                                         │
//! │   every tick:   new_pad ← CSPRNG                                       │
//! │                 data[i] = (data[i] ⊕ pad[i]) ⊕ new_pad[i]              │
//! │                 shred(pad);  pad = new_pad                             │
//! │                                                                         │
//! │   on RNG failure the current pad is kept; no state advances            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `read` and `rotate` serialise on the internal lock, so a reader always
//! sees a matching data/pad pair. Construction must happen inside a Tokio
//! runtime; the rotation task is aborted on destroy and on drop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::secure::buffer::MAX_BUFFER_SIZE;
use crate::secure::shred::shred;

/// Default interval for XOR pad rotation.
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_millis(100);

struct ObfuscatedState {
    /// plaintext ⊕ pad
    data: Vec<u8>,
    /// Current XOR pad
    pad: Vec<u8>,
    /// Original data size
    size: usize,
    destroyed: bool,
}

impl ObfuscatedState {
    /// Generates a new pad and re-masks the data in place.
    fn rotate(&mut self) {
        if self.destroyed {
            return;
        }

        let mut new_pad = vec![0u8; self.size];
        if OsRng.try_fill_bytes(&mut new_pad).is_err() {
            // Keep the current pad; nothing advances on RNG failure.
            return;
        }

        for i in 0..self.size {
            self.data[i] = self.data[i] ^ self.pad[i] ^ new_pad[i];
        }

        shred(&mut self.pad);
        self.pad = new_pad;
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        shred(&mut self.data);
        shred(&mut self.pad);
        self.data = Vec::new();
        self.pad = Vec::new();
        self.size = 0;
        self.destroyed = true;
    }
}

/// XOR-pad storage with periodic pad rotation.
pub struct ObfuscatedBuffer {
    state: Arc<RwLock<ObfuscatedState>>,
    rotation: JoinHandle<()>,
}

impl ObfuscatedBuffer {
    /// Creates an obfuscated buffer with the default rotation interval.
    /// The source slice is shredded after masking.
    pub fn new(data: &mut [u8]) -> Result<Self> {
        Self::with_interval(data, DEFAULT_ROTATION_INTERVAL)
    }

    /// Creates an obfuscated buffer with a custom rotation interval.
    /// The source slice is shredded after masking.
    pub fn with_interval(data: &mut [u8], interval: Duration) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::BufferEmpty);
        }
        if data.len() > MAX_BUFFER_SIZE {
            return Err(Error::BufferTooLarge);
        }
        let interval = if interval.is_zero() {
            DEFAULT_ROTATION_INTERVAL
        } else {
            interval
        };

        let size = data.len();

        let mut pad = vec![0u8; size];
        OsRng
            .try_fill_bytes(&mut pad)
            .map_err(|_| Error::RandomGeneration)?;

        let mut masked = vec![0u8; size];
        for i in 0..size {
            masked[i] = data[i] ^ pad[i];
        }
        shred(data);

        let state = Arc::new(RwLock::new(ObfuscatedState {
            data: masked,
            pad,
            size,
            destroyed: false,
        }));

        // The rotation task holds only a weak handle: dropping the buffer
        // lets the task wind down within one tick.
        let weak = Arc::downgrade(&state);
        let rotation = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                let Some(state) = weak.upgrade() else { return };
                let mut guard = state.write();
                if guard.destroyed {
                    return;
                }
                guard.rotate();
            }
        });

        Ok(Self { state, rotation })
    }

    /// Decrypts and returns an owned copy of the data.
    pub fn read(&self) -> Result<Zeroizing<Vec<u8>>> {
        let state = self.state.read();
        if state.destroyed {
            return Err(Error::ObfuscatedDestroyed);
        }

        let mut out = Zeroizing::new(vec![0u8; state.size]);
        for i in 0..state.size {
            out[i] = state.data[i] ^ state.pad[i];
        }
        Ok(out)
    }

    /// Scoped access to the decrypted contents; the plaintext copy is wiped
    /// when the closure returns.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let data = self.read()?;
        Ok(f(&data))
    }

    /// Returns the size of the buffer in bytes, or 0 once destroyed.
    pub fn size(&self) -> usize {
        self.state.read().size
    }

    /// Stops rotation and securely wipes data and pad. Safe to call
    /// repeatedly.
    pub fn destroy(&self) {
        self.rotation.abort();
        self.state.write().destroy();
    }

    /// Returns whether the buffer has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state.read().destroyed
    }
}

impl Drop for ObfuscatedBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_returns_original() {
        let original: Vec<u8> = (0..=255).collect();
        let mut src = original.clone();

        let buf = ObfuscatedBuffer::new(&mut src).unwrap();
        assert!(src.iter().all(|&b| b == 0), "source must be shredded");

        assert_eq!(&*buf.read().unwrap(), &original[..]);
        assert_eq!(buf.size(), 256);
    }

    #[tokio::test]
    async fn test_read_survives_rotation() {
        let original = vec![0xC3u8; 1024];
        let mut src = original.clone();
        let buf =
            ObfuscatedBuffer::with_interval(&mut src, Duration::from_millis(5)).unwrap();

        // Let several rotations happen
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(&*buf.read().unwrap(), &original[..]);
    }

    #[tokio::test]
    async fn test_manual_rotation_preserves_data() {
        let original = b"the pad rotates, the plaintext does not".to_vec();
        let mut src = original.clone();
        let buf = ObfuscatedBuffer::new(&mut src).unwrap();

        for _ in 0..10 {
            buf.state.write().rotate();
        }

        assert_eq!(&*buf.read().unwrap(), &original[..]);
    }

    #[tokio::test]
    async fn test_rotation_changes_pad() {
        let mut src = vec![0u8; 64];
        let buf = ObfuscatedBuffer::new(&mut src).unwrap();

        let pad_before = buf.state.read().pad.clone();
        buf.state.write().rotate();
        let pad_after = buf.state.read().pad.clone();

        assert_ne!(pad_before, pad_after);
    }

    #[tokio::test]
    async fn test_destroy_stops_access() {
        let mut src = vec![1u8; 32];
        let buf = ObfuscatedBuffer::new(&mut src).unwrap();

        buf.destroy();
        buf.destroy();

        assert!(buf.is_destroyed());
        assert_eq!(buf.size(), 0);
        assert!(matches!(buf.read(), Err(Error::ObfuscatedDestroyed)));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let mut empty: Vec<u8> = Vec::new();
        assert!(matches!(
            ObfuscatedBuffer::new(&mut empty),
            Err(Error::BufferEmpty)
        ));
    }

    #[tokio::test]
    async fn test_with_data_scoped_access() {
        let mut src = b"scoped".to_vec();
        let buf = ObfuscatedBuffer::new(&mut src).unwrap();

        let len = buf.with_data(|d| d.len()).unwrap();
        assert_eq!(len, 6);
    }
}
