//! # Scattered Buffer
//!
//! Splits data into separately allocated chunks held in shuffled order, so a
//! linear scan over the heap never sees the plaintext contiguously and cannot
//! reassemble it without the order map.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SCATTER / REASSEMBLY                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  plaintext:   [ A ][ B ][ C ][ D ]            chunk_size windows        │
//! │                                                                         │
//! │  storage:     chunks[0] = C      order[0] = 2                          │
//! │               chunks[1] = A      order[1] = 0                          │
//! │               chunks[2] = D      order[2] = 3                          │
//! │               chunks[3] = B      order[3] = 1                          │
//! │                                                                         │
//! │  reassembly:  out[order[i]·chunk_size ..] ← chunks[i]                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The permutation comes from a cryptographically seeded Fisher-Yates
//! shuffle; when an RNG read fails mid-shuffle, the pass swaps `i` with
//! `i/2` and continues, so a degraded RNG still yields a permutation.

use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::secure::buffer::MAX_BUFFER_SIZE;
use crate::secure::shred::shred;

/// Default size of each scattered chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Minimum number of chunks; small inputs get their chunk size reduced until
/// they scatter at least this widely.
pub(crate) const MIN_CHUNKS: usize = 4;

/// Fisher-Yates shuffle driven by the CSPRNG.
///
/// On an RNG read failure the pass falls back to swapping `i` with `i/2`,
/// which keeps the result a permutation.
pub(crate) fn shuffle_order(order: &mut [usize]) {
    let n = order.len();
    for i in (1..n).rev() {
        let mut raw = [0u8; 8];
        if OsRng.try_fill_bytes(&mut raw).is_err() {
            order.swap(i, i / 2);
            continue;
        }
        let j = (u64::from_le_bytes(raw) % (i as u64 + 1)) as usize;
        order.swap(i, j);
    }
}

/// Computes the effective chunk size and chunk count for a payload,
/// enforcing the minimum chunk count.
pub(crate) fn chunk_layout(total_size: usize, chunk_size: usize) -> (usize, usize) {
    let mut chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };

    let mut num_chunks = (total_size + chunk_size - 1) / chunk_size;
    if num_chunks < MIN_CHUNKS {
        chunk_size = std::cmp::max(1, (total_size + MIN_CHUNKS - 1) / MIN_CHUNKS);
        num_chunks = (total_size + chunk_size - 1) / chunk_size;
        // Tiny payloads still get the full chunk count as empty padding slots.
        num_chunks = std::cmp::max(num_chunks, MIN_CHUNKS);
    }

    (chunk_size, num_chunks)
}

struct ScatteredState {
    /// Chunks in shuffled order
    chunks: Vec<Zeroizing<Vec<u8>>>,
    /// `order[i]` = original position of the chunk stored at index `i`
    order: Vec<usize>,
    chunk_size: usize,
    total_size: usize,
    destroyed: bool,
}

/// Chunked storage in shuffled order.
pub struct ScatteredBuffer {
    state: RwLock<ScatteredState>,
}

impl ScatteredBuffer {
    /// Scatters `data` with the default chunk size and shreds the source.
    pub fn new(data: &mut [u8]) -> Result<Self> {
        Self::with_chunk_size(data, DEFAULT_CHUNK_SIZE)
    }

    /// Scatters `data` with a custom chunk size and shreds the source.
    pub fn with_chunk_size(data: &mut [u8], chunk_size: usize) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::BufferEmpty);
        }
        if data.len() > MAX_BUFFER_SIZE {
            return Err(Error::BufferTooLarge);
        }

        let total_size = data.len();
        let (chunk_size, num_chunks) = chunk_layout(total_size, chunk_size);

        let mut order: Vec<usize> = (0..num_chunks).collect();
        shuffle_order(&mut order);

        // Each chunk is its own allocation so the fragments land wherever
        // the allocator puts them.
        let mut chunks = Vec::with_capacity(num_chunks);
        for &orig_pos in &order {
            let start = orig_pos * chunk_size;
            if start >= total_size {
                chunks.push(Zeroizing::new(Vec::new()));
                continue;
            }
            let end = std::cmp::min(start + chunk_size, total_size);
            chunks.push(Zeroizing::new(data[start..end].to_vec()));
        }

        shred(data);

        Ok(Self {
            state: RwLock::new(ScatteredState {
                chunks,
                order,
                chunk_size,
                total_size,
                destroyed: false,
            }),
        })
    }

    /// Reassembles and returns an owned copy of the data.
    pub fn read(&self) -> Result<Zeroizing<Vec<u8>>> {
        let state = self.state.read();
        if state.destroyed {
            return Err(Error::ScatteredDestroyed);
        }

        let mut out = Zeroizing::new(vec![0u8; state.total_size]);

        for (i, &orig_pos) in state.order.iter().enumerate() {
            let chunk = &state.chunks[i];
            if chunk.is_empty() {
                continue;
            }

            let start = orig_pos * state.chunk_size;
            if start >= state.total_size {
                continue;
            }
            let end = std::cmp::min(start + chunk.len(), state.total_size);
            out[start..end].copy_from_slice(&chunk[..end - start]);
        }

        Ok(out)
    }

    /// Scoped access to the reassembled contents; the plaintext copy is
    /// wiped when the closure returns.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let data = self.read()?;
        Ok(f(&data))
    }

    /// Returns the total size of the original data, or 0 once destroyed.
    pub fn size(&self) -> usize {
        let state = self.state.read();
        if state.destroyed {
            0
        } else {
            state.total_size
        }
    }

    /// Returns the number of chunks, or 0 once destroyed.
    pub fn chunk_count(&self) -> usize {
        let state = self.state.read();
        if state.destroyed {
            0
        } else {
            state.chunks.len()
        }
    }

    /// Securely wipes all chunks. Safe to call repeatedly.
    pub fn destroy(&self) {
        let mut state = self.state.write();
        if state.destroyed {
            return;
        }
        for chunk in state.chunks.iter_mut() {
            shred(chunk.as_mut_slice());
        }
        state.chunks = Vec::new();
        state.order = Vec::new();
        state.total_size = 0;
        state.destroyed = true;
    }

    /// Returns whether the buffer has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state.read().destroyed
    }
}

impl Drop for ScatteredBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ============================================================================
// TESTS
// ============================================================================
