//! # Locked Buffer
//!
//! [`SecureBuffer`] is the root primitive for secrets at rest in RAM. The
//! backing pages are anonymous mappings that are:
//!
//! - **mlock'd** — never swapped to disk
//! - **guard-paged** — a `PROT_NONE` page on each side traps overruns
//! - **dump-excluded** — `MADV_DONTDUMP` keeps them out of core dumps (Linux)
//! - **wiped on release** — volatile zeroes before the mapping is returned
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         BUFFER MEMORY LAYOUT                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   ┌────────────┬──────────────────────────────────┬────────────┐       │
//! │   │ guard page │    data pages (mlock'd, R/W)     │ guard page │       │
//! │   │ PROT_NONE  │    zeroed at alloc, wiped at     │ PROT_NONE  │       │
//! │   │            │    destroy                       │            │       │
//! │   └────────────┴──────────────────────────────────┴────────────┘       │
//! │                 ▲                                                       │
//! │                 └── the logical buffer is a prefix of the data pages    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Access is scoped: callers pass a closure to [`SecureBuffer::open`] /
//! [`SecureBuffer::open_mut`] and never hold a long-lived reference to the
//! protected bytes. Destruction is idempotent and every entry point on a
//! destroyed buffer fails with [`Error::BufferDestroyed`].

use parking_lot::RwLock;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};
use crate::secure::key::SecureKey;
use crate::secure::shred::shred;

/// Hard cap for a single protected buffer (100 MiB).
pub const MAX_BUFFER_SIZE: usize = 100 * 1024 * 1024;

// ============================================================================
// LOCKED REGION (platform layer)
// ============================================================================

#[cfg(unix)]
mod region {
    use crate::error::{Error, Result};

    fn page_size() -> usize {
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz > 0 {
            sz as usize
        } else {
            4096
        }
    }

    /// A page-aligned, mlock'd anonymous mapping with guard pages on both
    /// sides. The pointers stay valid until `Drop`.
    pub(super) struct LockedRegion {
        base: *mut u8,
        data: *mut u8,
        mapping_len: usize,
        data_len: usize,
    }

    // The region is plain memory; all aliasing is policed by the RwLock in
    // the owning SecureBuffer.
    unsafe impl Send for LockedRegion {}
    unsafe impl Sync for LockedRegion {}

    impl LockedRegion {
        pub(super) fn alloc(size: usize) -> Result<Self> {
            let page = page_size();
            let data_len = ((size + page - 1) / page) * page;
            let mapping_len = data_len + 2 * page;

            unsafe {
                let base = libc::mmap(
                    std::ptr::null_mut(),
                    mapping_len,
                    libc::PROT_NONE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                );
                if base == libc::MAP_FAILED {
                    return Err(Error::Alloc(format!(
                        "mmap failed: {}",
                        std::io::Error::last_os_error()
                    )));
                }

                let data = (base as *mut u8).add(page);

                if libc::mprotect(
                    data as *mut libc::c_void,
                    data_len,
                    libc::PROT_READ | libc::PROT_WRITE,
                ) != 0
                {
                    let err = std::io::Error::last_os_error();
                    libc::munmap(base, mapping_len);
                    return Err(Error::Alloc(format!("mprotect failed: {}", err)));
                }

                if libc::mlock(data as *const libc::c_void, data_len) != 0 {
                    let err = std::io::Error::last_os_error();
                    libc::munmap(base, mapping_len);
                    return Err(Error::Alloc(format!("mlock failed: {}", err)));
                }

                // Keep the pages out of core dumps where the host supports it.
                #[cfg(target_os = "linux")]
                libc::madvise(data as *mut libc::c_void, data_len, libc::MADV_DONTDUMP);

                Ok(Self {
                    base: base as *mut u8,
                    data,
                    mapping_len,
                    data_len,
                })
            }
        }

        pub(super) fn as_slice(&self, len: usize) -> &[u8] {
            debug_assert!(len <= self.data_len);
            unsafe { std::slice::from_raw_parts(self.data, len) }
        }

        pub(super) fn as_mut_slice(&mut self, len: usize) -> &mut [u8] {
            debug_assert!(len <= self.data_len);
            unsafe { std::slice::from_raw_parts_mut(self.data, len) }
        }
    }

    impl Drop for LockedRegion {
        fn drop(&mut self) {
            unsafe {
                // Volatile wipe so the zeroing survives optimization, then a
                // fence before the pages go back to the kernel.
                for i in 0..self.data_len {
                    std::ptr::write_volatile(self.data.add(i), 0);
                }
                std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);

                libc::munlock(self.data as *const libc::c_void, self.data_len);
                libc::munmap(self.base as *mut libc::c_void, self.mapping_len);
            }
        }
    }
}

#[cfg(not(unix))]
mod region {
    use crate::error::Result;
    use zeroize::Zeroizing;

    /// Fallback for hosts without mmap/mlock: zero-on-drop heap storage
    /// behind the same interface. No page locking or guard pages.
    pub(super) struct LockedRegion {
        data: Zeroizing<Vec<u8>>,
    }

    impl LockedRegion {
        pub(super) fn alloc(size: usize) -> Result<Self> {
            Ok(Self {
                data: Zeroizing::new(vec![0u8; size]),
            })
        }

        pub(super) fn as_slice(&self, len: usize) -> &[u8] {
            &self.data[..len]
        }

        pub(super) fn as_mut_slice(&mut self, len: usize) -> &mut [u8] {
            &mut self.data[..len]
        }
    }
}

use region::LockedRegion;

// ============================================================================
// SECURE BUFFER
// ============================================================================

struct BufferInner {
    region: Option<LockedRegion>,
    len: usize,
    destroyed: bool,
}

/// A fixed-size protected memory region for secrets.
///
/// ## Contracts
///
/// - Once destroyed, every access fails with [`Error::BufferDestroyed`]
/// - Destruction is idempotent
/// - Dropping the buffer zeroizes the region
pub struct SecureBuffer {
    inner: RwLock<BufferInner>,
}

impl SecureBuffer {
    /// Allocates a locked, zeroed buffer of the given size.
    ///
    /// Fails with [`Error::Alloc`] when the host rejects page locking, with
    /// [`Error::BufferEmpty`] for a zero size, and with
    /// [`Error::BufferTooLarge`] above 100 MiB.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::BufferEmpty);
        }
        if size > MAX_BUFFER_SIZE {
            return Err(Error::BufferTooLarge);
        }

        let region = LockedRegion::alloc(size)?;
        Ok(Self {
            inner: RwLock::new(BufferInner {
                region: Some(region),
                len: size,
                destroyed: false,
            }),
        })
    }

    /// Creates a locked buffer holding a copy of `data`, then shreds `data`.
    ///
    /// The source is wiped whether or not the caller remembers to; never rely
    /// on the original slice after this call.
    pub fn from_bytes(data: &mut [u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::BufferEmpty);
        }
        if data.len() > MAX_BUFFER_SIZE {
            return Err(Error::BufferTooLarge);
        }

        let mut region = LockedRegion::alloc(data.len())?;
        region.as_mut_slice(data.len()).copy_from_slice(data);
        shred(data);

        Ok(Self {
            inner: RwLock::new(BufferInner {
                region: Some(region),
                len: data.len(),
                destroyed: false,
            }),
        })
    }

    /// Provides scoped read access to the buffer contents.
    ///
    /// This is the only way to read the protected bytes; the reference is
    /// valid for the closure frame only.
    pub fn open<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let inner = self.inner.read();
        if inner.destroyed {
            return Err(Error::BufferDestroyed);
        }
        let region = inner.region.as_ref().ok_or(Error::BufferDestroyed)?;
        Ok(f(region.as_slice(inner.len)))
    }

    /// Provides scoped mutable access to the buffer contents.
    pub fn open_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut inner = self.inner.write();
        if inner.destroyed {
            return Err(Error::BufferDestroyed);
        }
        let len = inner.len;
        let region = inner.region.as_mut().ok_or(Error::BufferDestroyed)?;
        Ok(f(region.as_mut_slice(len)))
    }

    /// Returns the size of the buffer in bytes, or 0 once destroyed.
    pub fn size(&self) -> usize {
        let inner = self.inner.read();
        if inner.destroyed {
            0
        } else {
            inner.len
        }
    }

    /// Zeroes the buffer contents without destroying it.
    pub fn wipe(&self) -> Result<()> {
        self.open_mut(|data| data.zeroize())
    }

    /// Securely wipes and deallocates the buffer. Safe to call repeatedly.
    pub fn destroy(&self) {
        let mut inner = self.inner.write();
        if inner.destroyed {
            return;
        }
        // LockedRegion::drop performs the volatile wipe before unmapping.
        inner.region = None;
        inner.len = 0;
        inner.destroyed = true;
    }

    /// Returns whether the buffer has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.read().destroyed
    }

    /// Creates an independent locked copy of this buffer's contents.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = self.inner.read();
        if inner.destroyed {
            return Err(Error::BufferDestroyed);
        }
        let region = inner.region.as_ref().ok_or(Error::BufferDestroyed)?;

        let mut copy = LockedRegion::alloc(inner.len)?;
        copy.as_mut_slice(inner.len)
            .copy_from_slice(region.as_slice(inner.len));

        Ok(Self {
            inner: RwLock::new(BufferInner {
                region: Some(copy),
                len: inner.len,
                destroyed: false,
            }),
        })
    }

    /// Converts this buffer into a sealed [`SecureKey`], destroying the
    /// buffer in the process.
    ///
    /// The buffer is consumed either way; on error the contents have already
    /// been wiped by the buffer's drop path.
    pub fn seal(self) -> Result<SecureKey> {
        let mut plain = self.open(|data| Zeroizing::new(data.to_vec()))?;
        self.destroy();
        SecureKey::new(plain.as_mut_slice())
    }
}

impl std::fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print contents.
        f.debug_struct("SecureBuffer")
            .field("size", &self.size())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let buf = SecureBuffer::new(64).unwrap();
        buf.open(|data| {
            assert_eq!(data.len(), 64);
            assert!(data.iter().all(|&b| b == 0));
        })
        .unwrap();
    }

    #[test]
    fn test_size_validation() {
        assert!(matches!(SecureBuffer::new(0), Err(Error::BufferEmpty)));
        assert!(matches!(
            SecureBuffer::new(MAX_BUFFER_SIZE + 1),
            Err(Error::BufferTooLarge)
        ));
    }

    #[test]
    fn test_from_bytes_copies_and_wipes_source() {
        let mut src = vec![0xABu8; 100];
        let buf = SecureBuffer::from_bytes(&mut src).unwrap();

        // Source must be wiped
        assert!(src.iter().all(|&b| b == 0));

        buf.open(|data| assert!(data.iter().all(|&b| b == 0xAB)))
            .unwrap();
    }

    #[test]
    fn test_open_mut_and_wipe() {
        let buf = SecureBuffer::new(16).unwrap();
        buf.open_mut(|data| data.fill(0x55)).unwrap();
        buf.open(|data| assert!(data.iter().all(|&b| b == 0x55)))
            .unwrap();

        buf.wipe().unwrap();
        buf.open(|data| assert!(data.iter().all(|&b| b == 0)))
            .unwrap();
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let buf = SecureBuffer::new(32).unwrap();
        buf.destroy();
        buf.destroy();

        assert!(buf.is_destroyed());
        assert_eq!(buf.size(), 0);
        assert!(matches!(buf.open(|_| ()), Err(Error::BufferDestroyed)));
        assert!(matches!(buf.open_mut(|_| ()), Err(Error::BufferDestroyed)));
        assert!(matches!(buf.wipe(), Err(Error::BufferDestroyed)));
    }

    #[test]
    fn test_try_clone_is_independent() {
        let mut src = vec![0x11u8; 32];
        let buf = SecureBuffer::from_bytes(&mut src).unwrap();
        let copy = buf.try_clone().unwrap();

        buf.destroy();

        copy.open(|data| assert!(data.iter().all(|&b| b == 0x11)))
            .unwrap();
    }

    #[test]
    fn test_seal_produces_working_key() {
        let mut src = vec![0x42u8; 32];
        let buf = SecureBuffer::from_bytes(&mut src).unwrap();
        let key = buf.seal().unwrap();

        key.with_key(|k| assert!(k.iter().all(|&b| b == 0x42)))
            .unwrap();
        key.destroy();
    }

    #[test]
    fn test_guard_pages_leave_contents_intact() {
        // Writes near both ends of the logical buffer must work; the guard
        // pages sit outside it.
        let buf = SecureBuffer::new(4096 * 2 + 7).unwrap();
        buf.open_mut(|data| {
            data[0] = 1;
            let last = data.len() - 1;
            data[last] = 2;
        })
        .unwrap();
        buf.open(|data| {
            assert_eq!(data[0], 1);
            assert_eq!(data[data.len() - 1], 2);
        })
        .unwrap();
    }
}
