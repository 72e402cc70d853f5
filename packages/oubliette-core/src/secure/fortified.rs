//! # Fortified Buffer
//!
//! The composition the stores actually use: chunk scatter, per-chunk XOR
//! obfuscation, and tripwire-backed auto-destruction around a single logical
//! secret.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    FORTIFIED BUFFER COMPOSITION                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   input ──► scatter into shuffled chunks ──► obfuscate each chunk      │
//! │                                                                         │
//! │   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐               │
//! │   │ Obfuscated   │   │ Obfuscated   │   │ Obfuscated   │  ...          │
//! │   │ chunk (pad   │   │ chunk (pad   │   │ chunk (pad   │               │
//! │   │ rotating)    │   │ rotating)    │   │ rotating)    │               │
//! │   └──────────────┘   └──────────────┘   └──────────────┘               │
//! │          ▲                                                              │
//! │          └── order[i]·chunk_size locates each chunk on read             │
//! │                                                                         │
//! │   tripwire ──(intrusion)──► destroy callback wipes every chunk          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Four modes, selected by [`FortifiedOptions`]:
//!
//! | scatter | obfuscate | storage |
//! |---------|-----------|---------|
//! | yes | yes | one [`ObfuscatedBuffer`] per shuffled chunk |
//! | no  | yes | a single [`ObfuscatedBuffer`] |
//! | yes | no  | a [`ScatteredBuffer`] |
//! | no  | no  | a single [`ObfuscatedBuffer`] with a slow pad |
//!
//! The tripwire holds only a weak handle; a buffer that was dropped or
//! destroyed before the tripwire fires turns its callback into a no-op.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::secure::buffer::MAX_BUFFER_SIZE;
use crate::secure::obfuscated::{ObfuscatedBuffer, DEFAULT_ROTATION_INTERVAL};
use crate::secure::scattered::{chunk_layout, shuffle_order, ScatteredBuffer, DEFAULT_CHUNK_SIZE};
use crate::secure::shred::shred;
use crate::secure::tripwire::{global_tripwire, Tripwire};

/// Pad rotation used when both scatter and obfuscation are switched off:
/// the data still never sits in memory as plaintext, it just re-masks
/// rarely.
const RAW_ROTATION_INTERVAL: Duration = Duration::from_secs(60);

/// Configures the protection layers of a [`FortifiedBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct FortifiedOptions {
    /// Apply rotating XOR pad obfuscation. Default: true
    pub use_obfuscation: bool,
    /// Apply chunk scatter. Default: true
    pub use_scatter: bool,
    /// Register a destroy callback on the global tripwire. Default: true
    pub register_tripwire: bool,
    /// XOR pad rotation interval. Default: 100 ms
    pub rotation_interval: Duration,
    /// Scattered chunk size. Default: 256 bytes
    pub chunk_size: usize,
}

impl Default for FortifiedOptions {
    fn default() -> Self {
        Self {
            use_obfuscation: true,
            use_scatter: true,
            register_tripwire: true,
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

struct FortifiedState {
    /// Obfuscated chunks in shuffled order (scatter + obfuscate mode)
    obfuscated_chunks: Vec<ObfuscatedBuffer>,
    /// Single obfuscated buffer (obfuscate-only and raw modes)
    obfuscated: Option<ObfuscatedBuffer>,
    /// Scatter-only storage
    scattered: Option<ScatteredBuffer>,

    /// `chunk_order[i]` = original position of the chunk at index `i`
    chunk_order: Vec<usize>,
    chunk_size: usize,
    total_size: usize,
    destroyed: bool,
}

impl FortifiedState {
    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }

        for chunk in self.obfuscated_chunks.drain(..) {
            chunk.destroy();
        }
        if let Some(ob) = self.obfuscated.take() {
            ob.destroy();
        }
        if let Some(sb) = self.scattered.take() {
            sb.destroy();
        }

        self.chunk_order = Vec::new();
        self.chunk_size = 0;
        self.total_size = 0;
        self.destroyed = true;
    }
}

/// Scatter + obfuscation + tripwire auto-destroy around one logical secret.
pub struct FortifiedBuffer {
    state: Arc<RwLock<FortifiedState>>,
}

impl FortifiedBuffer {
    /// Protects `data` with every layer enabled and shreds the source.
    ///
    /// Must be called within a Tokio runtime (pad rotation tasks).
    pub fn new(data: &mut [u8]) -> Result<Self> {
        Self::with_options(data, FortifiedOptions::default())
    }

    /// Protects `data` according to `opts` and shreds the source.
    pub fn with_options(data: &mut [u8], opts: FortifiedOptions) -> Result<Self> {
        let tripwire = opts.register_tripwire.then(global_tripwire);
        Self::with_options_on(data, opts, tripwire)
    }

    fn with_options_on(
        data: &mut [u8],
        opts: FortifiedOptions,
        tripwire: Option<&Tripwire>,
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::BufferEmpty);
        }
        if data.len() > MAX_BUFFER_SIZE {
            return Err(Error::BufferTooLarge);
        }

        let total_size = data.len();

        let mut state = FortifiedState {
            obfuscated_chunks: Vec::new(),
            obfuscated: None,
            scattered: None,
            chunk_order: Vec::new(),
            chunk_size: 0,
            total_size,
            destroyed: false,
        };

        match (opts.use_scatter, opts.use_obfuscation) {
            (true, true) => {
                let (chunks, order, chunk_size) = build_scatter_obfuscate(data, &opts)?;
                state.obfuscated_chunks = chunks;
                state.chunk_order = order;
                state.chunk_size = chunk_size;
            }
            (false, true) => {
                state.obfuscated =
                    Some(ObfuscatedBuffer::with_interval(data, opts.rotation_interval)?);
            }
            (true, false) => {
                state.scattered = Some(ScatteredBuffer::with_chunk_size(data, opts.chunk_size)?);
            }
            (false, false) => {
                // Raw mode still masks; the pad just rotates slowly.
                state.obfuscated =
                    Some(ObfuscatedBuffer::with_interval(data, RAW_ROTATION_INTERVAL)?);
            }
        }

        let state = Arc::new(RwLock::new(state));

        if let Some(tripwire) = tripwire {
            // Weak handle: once the buffer is gone this callback is a no-op,
            // so the tripwire never keeps secrets alive.
            let weak = Arc::downgrade(&state);
            tripwire.register(move || {
                if let Some(state) = weak.upgrade() {
                    state.write().destroy();
                }
            });
        }

        Ok(Self { state })
    }

    /// Decrypts, reassembles and returns an owned copy of the data.
    pub fn read(&self) -> Result<Zeroizing<Vec<u8>>> {
        let state = self.state.read();
        if state.destroyed {
            return Err(Error::FortifiedDestroyed);
        }

        if !state.obfuscated_chunks.is_empty() {
            read_scatter_obfuscate(&state)
        } else if let Some(ob) = &state.obfuscated {
            ob.read()
        } else if let Some(sb) = &state.scattered {
            sb.read()
        } else {
            Err(Error::FortifiedDestroyed)
        }
    }

    /// Scoped access to the plaintext; the reassembled copy is wiped when
    /// the closure returns.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let data = self.read()?;
        Ok(f(&data))
    }

    /// Returns the original data length, or 0 once destroyed.
    pub fn size(&self) -> usize {
        let state = self.state.read();
        if state.destroyed {
            0
        } else {
            state.total_size
        }
    }

    /// Wipes every layer and stops all rotation tasks. Safe to call
    /// repeatedly.
    pub fn destroy(&self) {
        self.state.write().destroy();
    }

    /// Returns whether the buffer has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state.read().destroyed
    }
}

impl Drop for FortifiedBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Splits `data` into shuffled chunks and wraps each in its own
/// [`ObfuscatedBuffer`]. A failure partway through destroys everything built
/// so far and shreds the source before surfacing the error.
fn build_scatter_obfuscate(
    data: &mut [u8],
    opts: &FortifiedOptions,
) -> Result<(Vec<ObfuscatedBuffer>, Vec<usize>, usize)> {
    let total_size = data.len();
    let (chunk_size, num_chunks) = chunk_layout(total_size, opts.chunk_size);

    let mut order: Vec<usize> = (0..num_chunks).collect();
    shuffle_order(&mut order);

    let mut chunks: Vec<ObfuscatedBuffer> = Vec::with_capacity(num_chunks);
    for &orig_pos in &order {
        let start = orig_pos * chunk_size;
        // Out-of-range positions get a single placeholder byte so the inner
        // buffer's non-empty invariant holds; reads filter them by original
        // size.
        let mut chunk_data = if start >= total_size {
            vec![0u8]
        } else {
            let end = std::cmp::min(start + chunk_size, total_size);
            data[start..end].to_vec()
        };

        match ObfuscatedBuffer::with_interval(&mut chunk_data, opts.rotation_interval) {
            Ok(ob) => chunks.push(ob),
            Err(err) => {
                for built in chunks.drain(..) {
                    built.destroy();
                }
                shred(data);
                return Err(err);
            }
        }
    }

    shred(data);
    Ok((chunks, order, chunk_size))
}

fn read_scatter_obfuscate(state: &FortifiedState) -> Result<Zeroizing<Vec<u8>>> {
    let mut out = Zeroizing::new(vec![0u8; state.total_size]);

    for (i, &orig_pos) in state.chunk_order.iter().enumerate() {
        let start = orig_pos * state.chunk_size;
        if start >= state.total_size {
            // Placeholder chunk for an out-of-range position
            continue;
        }

        let chunk_data = state.obfuscated_chunks[i].read()?;
        let end = std::cmp::min(start + chunk_data.len(), state.total_size);
        out[start..end].copy_from_slice(&chunk_data[..end - start]);
    }

    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(scatter: bool, obfuscate: bool) -> FortifiedOptions {
        FortifiedOptions {
            use_scatter: scatter,
            use_obfuscation: obfuscate,
            register_tripwire: false,
            ..FortifiedOptions::default()
        }
    }

    #[tokio::test]
    async fn test_roundtrip_all_modes() {
        let original: Vec<u8> = (0..5000u32).map(|i| (i % 253) as u8).collect();

        for (scatter, obfuscate) in [(true, true), (true, false), (false, true), (false, false)] {
            let mut src = original.clone();
            let buf = FortifiedBuffer::with_options(&mut src, opts(scatter, obfuscate)).unwrap();

            assert!(src.iter().all(|&b| b == 0), "source must be shredded");
            assert_eq!(buf.size(), original.len());
            assert_eq!(
                &*buf.read().unwrap(),
                &original[..],
                "mode scatter={} obfuscate={}",
                scatter,
                obfuscate
            );
        }
    }

    #[tokio::test]
    async fn test_roundtrip_various_sizes() {
        for size in [1usize, 5, 255, 256, 257, 1024, 40_000] {
            let original: Vec<u8> = (0..size).map(|i| (i % 241) as u8).collect();
            let mut src = original.clone();

            let buf = FortifiedBuffer::with_options(&mut src, opts(true, true)).unwrap();
            assert_eq!(&*buf.read().unwrap(), &original[..], "size {}", size);
        }
    }

    #[tokio::test]
    async fn test_roundtrip_survives_rotation() {
        let original = vec![0xE7u8; 2048];
        let mut src = original.clone();
        let buf = FortifiedBuffer::with_options(
            &mut src,
            FortifiedOptions {
                register_tripwire: false,
                rotation_interval: Duration::from_millis(5),
                ..FortifiedOptions::default()
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(&*buf.read().unwrap(), &original[..]);
    }

    #[tokio::test]
    async fn test_double_destroy_is_safe() {
        let mut src = vec![3u8; 512];
        let buf = FortifiedBuffer::with_options(&mut src, opts(true, true)).unwrap();

        buf.destroy();
        buf.destroy();

        assert!(buf.is_destroyed());
        assert_eq!(buf.size(), 0);
        assert!(matches!(buf.read(), Err(Error::FortifiedDestroyed)));
    }

    #[tokio::test]
    async fn test_tripwire_auto_destroys() {
        let tripwire = Tripwire::new();

        let mut src = vec![9u8; 300];
        let buf = FortifiedBuffer::with_options_on(
            &mut src,
            FortifiedOptions {
                register_tripwire: false,
                ..FortifiedOptions::default()
            },
            Some(&tripwire),
        )
        .unwrap();

        assert!(!buf.is_destroyed());
        tripwire.manual_trigger();
        assert!(buf.is_destroyed());
        assert!(matches!(buf.read(), Err(Error::FortifiedDestroyed)));
    }

    #[tokio::test]
    async fn test_tripwire_callback_after_drop_is_noop() {
        let tripwire = Tripwire::new();

        {
            let mut src = vec![1u8; 64];
            let _buf = FortifiedBuffer::with_options_on(
                &mut src,
                FortifiedOptions {
                    register_tripwire: false,
                    ..FortifiedOptions::default()
                },
                Some(&tripwire),
            )
            .unwrap();
        }

        // The weak handle is dead; firing must not panic.
        tripwire.manual_trigger();
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let mut empty: Vec<u8> = Vec::new();
        assert!(matches!(
            FortifiedBuffer::new(&mut empty),
            Err(Error::BufferEmpty)
        ));
    }

    #[tokio::test]
    async fn test_with_data_scoped_access() {
        let mut src = b"fortify me".to_vec();
        let buf = FortifiedBuffer::with_options(&mut src, opts(true, true)).unwrap();

        let first = buf.with_data(|d| d[0]).unwrap();
        assert_eq!(first, b'f');
    }
}
