//! # Secure Shredding
//!
//! DoD 5220.22-M style multi-pass overwrite for byte slices, plus a batch
//! [`Shredder`] that tracks protected objects for collective destruction.
//!
//! ## Pass Sequence
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SHRED PASSES (DoD 5220.22-M)                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Pass 1: 0x00 ........ clear any live plaintext                        │
//! │  Pass 2: 0xFF ........ flip every bit                                  │
//! │  Pass 3: CSPRNG ...... destroy residual bias                           │
//! │          (fallback: byte[i] = i ^ 0xAA when the RNG fails)             │
//! │  Pass 4: zeroize ..... final zero with an optimization barrier          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

use super::buffer::SecureBuffer;
use super::key::SecureKey;

/// Number of overwrite passes performed by [`shred`].
pub const SHRED_PASSES: usize = 4;

/// Securely wipes a byte slice in place using the four-pass sequence above.
///
/// After shredding, the slice contains zeros. The final pass goes through
/// `zeroize` so the compiler cannot elide it.
pub fn shred(data: &mut [u8]) {
    if data.is_empty() {
        return;
    }

    // Pass 1: zeros
    data.fill(0x00);

    // Pass 2: ones
    data.fill(0xFF);

    // Pass 3: cryptographically secure random data
    if OsRng.try_fill_bytes(data).is_err() {
        // RNG failure: deterministic pattern fallback
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i as u8) ^ 0xAA;
        }
    }

    // Pass 4: final zero through an optimization barrier
    data.zeroize();
}

/// Securely destroys a [`SecureBuffer`].
///
/// The buffer's own destroy path already wipes the locked region under its
/// internal lock, so this just consumes and destroys it.
pub fn shred_buffer(buf: SecureBuffer) {
    buf.destroy();
}

/// Securely destroys a [`SecureKey`].
pub fn shred_key(key: SecureKey) {
    key.destroy();
}

/// Callback invoked by [`Shredder::shred_all`] with the number of items wiped.
pub type ShredCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Batch secure deletion with tracking.
///
/// Owns every tracked item; `shred_all` wipes the whole batch at once. Used
/// by teardown paths that accumulate secrets with differing lifetimes and
/// need a single "destroy everything" switch.
pub struct Shredder {
    inner: Mutex<ShredderInner>,
}

struct ShredderInner {
    buffers: Vec<SecureBuffer>,
    keys: Vec<SecureKey>,
    raw: Vec<Zeroizing<Vec<u8>>>,
    on_shredded: Option<ShredCallback>,
}

impl Shredder {
    /// Creates a new shredder. The optional callback is invoked after each
    /// `shred_all` with the count of items shredded.
    pub fn new(on_shredded: Option<ShredCallback>) -> Self {
        Self {
            inner: Mutex::new(ShredderInner {
                buffers: Vec::new(),
                keys: Vec::new(),
                raw: Vec::new(),
                on_shredded,
            }),
        }
    }

    /// Takes ownership of a buffer to be shredded later.
    pub fn track_buffer(&self, buf: SecureBuffer) {
        self.inner.lock().buffers.push(buf);
    }

    /// Takes ownership of a key to be shredded later.
    pub fn track_key(&self, key: SecureKey) {
        self.inner.lock().keys.push(key);
    }

    /// Takes ownership of a raw byte vector to be shredded later.
    ///
    /// Use sparingly; prefer [`SecureBuffer`] for sensitive data.
    pub fn track_raw(&self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        self.inner.lock().raw.push(Zeroizing::new(data));
    }

    /// Securely wipes all tracked items and returns how many were shredded.
    pub fn shred_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut count = 0;

        for buf in inner.buffers.drain(..) {
            if !buf.is_destroyed() {
                buf.destroy();
                count += 1;
            }
        }

        for key in inner.keys.drain(..) {
            if !key.is_destroyed() {
                key.destroy();
                count += 1;
            }
        }

        for mut data in inner.raw.drain(..) {
            shred(data.as_mut_slice());
            count += 1;
        }

        if count > 0 {
            if let Some(cb) = &inner.on_shredded {
                cb(count);
            }
        }

        count
    }

    /// Returns the number of items currently tracked.
    pub fn count(&self) -> usize {
        let inner = self.inner.lock();
        inner.buffers.len() + inner.keys.len() + inner.raw.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
