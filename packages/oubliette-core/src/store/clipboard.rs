//! # Clipboard Store
//!
//! Two independent slots — one text, one image — with the same
//! plaintext/ciphertext duality as the file store but no ids: the slot key
//! is intrinsic.
//!
//! ## Swap Discipline
//!
//! `set_text` / `set_image` build the replacement entry *before* taking the
//! slot lock, swap under the lock, and hand the displaced entry to a
//! background task for its multi-pass shred. Readers therefore only ever
//! wait for a pointer swap, never for a wipe. Deletes and sweeps shred
//! synchronously under the slot lock — those paths are not latency
//! sensitive.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::config::DEFAULT_CLIPBOARD_EXPIRY;
use crate::error::{Error, Result};
use crate::secure::fortified::FortifiedBuffer;
use crate::secure::memory::MemoryTracker;
use crate::secure::shred::shred;
use crate::time::to_chrono;

/// How often the expiry sweeper wakes.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The kind of content a clipboard entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardKind {
    /// UTF-8 text
    Text,
    /// Image bytes with an accompanying MIME type
    Image,
}

struct ClipboardEntry {
    /// Plaintext content while unlocked
    data: Option<FortifiedBuffer>,
    /// Opaque ciphertext while locked
    encrypted: Option<Zeroizing<Vec<u8>>>,

    kind: ClipboardKind,
    /// Image MIME type ("image/png", "image/jpeg", ...)
    mime_type: Option<String>,
    size: usize,
    /// Bytes reserved with the memory tracker (0 for ciphertext entries)
    tracked_bytes: usize,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl ClipboardEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

fn shred_entry(mut entry: ClipboardEntry, memory: &MemoryTracker) {
    memory.free(entry.tracked_bytes);

    if let Some(buf) = entry.data.take() {
        buf.destroy();
    }
    if let Some(mut enc) = entry.encrypted.take() {
        shred(enc.as_mut_slice());
    }
}

/// Clipboard slot metadata. Content never travels in here.
#[derive(Debug, Clone, Serialize)]
pub struct ClipboardInfo {
    /// Whether the slot holds unexpired content
    pub has_content: bool,
    /// Content size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// MIME type of the content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// When the content was stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the content expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ClipboardInfo {
    fn empty() -> Self {
        Self {
            has_content: false,
            size: None,
            mime_type: None,
            created_at: None,
            expires_at: None,
        }
    }
}

/// Secure clipboard storage with one text and one image slot.
pub struct ClipboardStore {
    text: RwLock<Option<ClipboardEntry>>,
    image: RwLock<Option<ClipboardEntry>>,
    expiry: ChronoDuration,
    memory: Arc<MemoryTracker>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ClipboardStore {
    /// Creates a clipboard store and starts its expiry sweeper. A zero
    /// expiry falls back to the 1 h default. Must be called within a Tokio
    /// runtime.
    pub fn new(memory: Arc<MemoryTracker>, expiry: Duration) -> Arc<Self> {
        let expiry = if expiry.is_zero() {
            DEFAULT_CLIPBOARD_EXPIRY
        } else {
            expiry
        };

        let store = Arc::new(Self {
            text: RwLock::new(None),
            image: RwLock::new(None),
            expiry: to_chrono(expiry),
            memory,
            sweeper: Mutex::new(None),
        });

        let weak = Arc::downgrade(&store);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else { return };
                store.cleanup_expired();
            }
        });
        *store.sweeper.lock() = Some(handle);

        store
    }

    fn slot(&self, kind: ClipboardKind) -> &RwLock<Option<ClipboardEntry>> {
        match kind {
            ClipboardKind::Text => &self.text,
            ClipboardKind::Image => &self.image,
        }
    }

    fn expires_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.expiry)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn set_slot(
        &self,
        content: &mut [u8],
        kind: ClipboardKind,
        mime_type: Option<String>,
    ) -> Result<()> {
        let len = content.len();

        // Build the replacement before touching the lock.
        let buf = FortifiedBuffer::new(content)?;
        let now = Utc::now();
        let entry = ClipboardEntry {
            data: Some(buf),
            encrypted: None,
            kind,
            mime_type,
            size: len,
            tracked_bytes: len,
            created_at: now,
            expires_at: self.expires_from(now),
        };

        let displaced;
        {
            let mut guard = self.slot(kind).write();

            if let Err(err) = self.memory.allocate(len) {
                drop(guard);
                // The freshly built entry never entered the store; its drop
                // wipes the fortified buffer.
                return Err(err);
            }

            displaced = guard.replace(entry);
        }

        // Multi-pass shredding happens off the lock path.
        if let Some(old) = displaced {
            self.shred_entry_async(old);
        }

        Ok(())
    }

    fn shred_entry_async(&self, entry: ClipboardEntry) {
        let memory = Arc::clone(&self.memory);
        tokio::spawn(async move {
            shred_entry(entry, &memory);
        });
    }

    // ========================================================================
    // TEXT SLOT
    // ========================================================================

    /// Stores text content. Unlocked path only.
    ///
    /// The content slice is always shredded after this call.
    pub fn set_text(&self, content: &mut [u8]) -> Result<()> {
        let result = self.set_slot(content, ClipboardKind::Text, None);
        shred(content);
        result
    }

    /// Returns a fresh copy of the text content. Unlocked path only.
    pub fn get_text(&self) -> Result<Zeroizing<Vec<u8>>> {
        let guard = self.text.read();
        let entry = guard.as_ref().ok_or(Error::ClipboardEmpty)?;
        debug_assert_eq!(entry.kind, ClipboardKind::Text);

        if entry.is_expired(Utc::now()) {
            return Err(Error::ClipboardExpired);
        }

        let data = entry.data.as_ref().ok_or(Error::ClipboardEmpty)?;
        data.read()
    }

    /// Shreds and removes the text slot.
    pub fn delete_text(&self) {
        let mut guard = self.text.write();
        if let Some(entry) = guard.take() {
            shred_entry(entry, &self.memory);
        }
    }

    /// Whether unexpired text content exists.
    pub fn has_text(&self) -> bool {
        self.text
            .read()
            .as_ref()
            .map(|e| !e.is_expired(Utc::now()))
            .unwrap_or(false)
    }

    /// Text slot metadata without the content.
    pub fn text_info(&self) -> ClipboardInfo {
        let guard = self.text.read();
        match guard.as_ref() {
            Some(entry) if !entry.is_expired(Utc::now()) => ClipboardInfo {
                has_content: true,
                size: Some(entry.size),
                mime_type: Some("text/plain".to_string()),
                created_at: Some(entry.created_at),
                expires_at: Some(entry.expires_at),
            },
            _ => ClipboardInfo::empty(),
        }
    }

    // ========================================================================
    // IMAGE SLOT
    // ========================================================================

    /// Stores image content with its MIME type. Unlocked path only.
    ///
    /// The content slice is always shredded after this call.
    pub fn set_image(&self, content: &mut [u8], mime_type: &str) -> Result<()> {
        let result = self.set_slot(
            content,
            ClipboardKind::Image,
            Some(mime_type.to_string()),
        );
        shred(content);
        result
    }

    /// Returns a fresh copy of the image content and its MIME type.
    /// Unlocked path only.
    pub fn get_image(&self) -> Result<(Zeroizing<Vec<u8>>, String)> {
        let guard = self.image.read();
        let entry = guard.as_ref().ok_or(Error::ClipboardEmpty)?;
        debug_assert_eq!(entry.kind, ClipboardKind::Image);

        if entry.is_expired(Utc::now()) {
            return Err(Error::ClipboardExpired);
        }

        let data = entry.data.as_ref().ok_or(Error::ClipboardEmpty)?;
        let mime = entry
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok((data.read()?, mime))
    }

    /// Shreds and removes the image slot.
    pub fn delete_image(&self) {
        let mut guard = self.image.write();
        if let Some(entry) = guard.take() {
            shred_entry(entry, &self.memory);
        }
    }

    /// Whether unexpired image content exists.
    pub fn has_image(&self) -> bool {
        self.image
            .read()
            .as_ref()
            .map(|e| !e.is_expired(Utc::now()))
            .unwrap_or(false)
    }

    /// Image slot metadata without the content.
    pub fn image_info(&self) -> ClipboardInfo {
        let guard = self.image.read();
        match guard.as_ref() {
            Some(entry) if !entry.is_expired(Utc::now()) => ClipboardInfo {
                has_content: true,
                size: Some(entry.size),
                mime_type: entry.mime_type.clone(),
                created_at: Some(entry.created_at),
                expires_at: Some(entry.expires_at),
            },
            _ => ClipboardInfo::empty(),
        }
    }

    // ========================================================================
    // SEALED-MODE OPERATIONS
    // ========================================================================

    fn set_encrypted_slot(&self, encrypted: Vec<u8>, kind: ClipboardKind, mime: Option<String>) {
        if encrypted.is_empty() {
            return;
        }

        let now = Utc::now();
        let size = encrypted.len();
        let entry = ClipboardEntry {
            data: None,
            encrypted: Some(Zeroizing::new(encrypted)),
            kind,
            mime_type: mime,
            size,
            tracked_bytes: 0,
            created_at: now,
            expires_at: self.expires_from(now),
        };

        let mut guard = self.slot(kind).write();
        if let Some(old) = guard.take() {
            shred_entry(old, &self.memory);
        }
        *guard = Some(entry);
    }

    /// Stores an already-encrypted text blob from the client. The server
    /// cannot decrypt it.
    pub fn set_encrypted_text(&self, encrypted: Vec<u8>) {
        self.set_encrypted_slot(encrypted, ClipboardKind::Text, None);
    }

    /// Returns the encrypted text blob for client-side decryption.
    pub fn get_encrypted_text(&self) -> Option<Vec<u8>> {
        let guard = self.text.read();
        guard
            .as_ref()
            .and_then(|e| e.encrypted.as_ref())
            .map(|enc| enc.to_vec())
    }

    /// Stores an already-encrypted image blob from the client.
    pub fn set_encrypted_image(&self, encrypted: Vec<u8>, mime_type: &str) {
        self.set_encrypted_slot(
            encrypted,
            ClipboardKind::Image,
            Some(mime_type.to_string()),
        );
    }

    /// Returns the encrypted image blob and MIME type for client-side
    /// decryption.
    pub fn get_encrypted_image(&self) -> Option<(Vec<u8>, String)> {
        let guard = self.image.read();
        let entry = guard.as_ref()?;
        let enc = entry.encrypted.as_ref()?;
        let mime = entry.mime_type.clone().unwrap_or_default();
        Some((enc.to_vec(), mime))
    }

    /// Shreds the ciphertext in both slots; a slot left with no plaintext
    /// either is emptied. Idempotent.
    pub fn clear_encrypted_data(&self) {
        for kind in [ClipboardKind::Text, ClipboardKind::Image] {
            let mut guard = self.slot(kind).write();
            if let Some(entry) = guard.as_mut() {
                if let Some(mut enc) = entry.encrypted.take() {
                    shred(enc.as_mut_slice());
                }
                if entry.data.is_none() {
                    *guard = None;
                }
            }
        }
    }

    // ========================================================================
    // DESTRUCTION
    // ========================================================================

    /// Shreds both slots synchronously.
    pub fn shred_all(&self) {
        self.delete_text();
        self.delete_image();
    }

    /// Removes and shreds expired entries. The sweeper calls this once a
    /// minute; it is also safe to call directly.
    pub fn cleanup_expired(&self) {
        let now = Utc::now();

        for kind in [ClipboardKind::Text, ClipboardKind::Image] {
            let mut guard = self.slot(kind).write();
            if guard.as_ref().map(|e| e.is_expired(now)).unwrap_or(false) {
                if let Some(entry) = guard.take() {
                    shred_entry(entry, &self.memory);
                }
            }
        }
    }

    /// Stops the sweeper and shreds both slots. For shutdown.
    pub fn close(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.shred_all();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure::memory::MIN_MEMORY_LIMIT;

    fn clipboard() -> (Arc<ClipboardStore>, Arc<MemoryTracker>) {
        let memory = Arc::new(MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap());
        let store = ClipboardStore::new(Arc::clone(&memory), Duration::ZERO);
        (store, memory)
    }

    async fn wait_for_allocated(memory: &MemoryTracker, expected: usize) {
        for _ in 0..100 {
            if memory.allocated() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(memory.allocated(), expected, "async shred never settled");
    }

    #[tokio::test]
    async fn test_text_roundtrip() {
        let (store, memory) = clipboard();

        let mut content = b"copy me".to_vec();
        store.set_text(&mut content).unwrap();

        assert!(content.iter().all(|&b| b == 0), "input must be shredded");
        assert_eq!(memory.allocated(), 7);
        assert!(store.has_text());

        assert_eq!(&*store.get_text().unwrap(), b"copy me");
    }

    #[tokio::test]
    async fn test_empty_slot_reads() {
        let (store, _) = clipboard();

        assert!(matches!(store.get_text(), Err(Error::ClipboardEmpty)));
        assert!(matches!(store.get_image(), Err(Error::ClipboardEmpty)));
        assert!(!store.has_text());
        assert!(!store.has_image());
        assert!(!store.text_info().has_content);
    }

    #[tokio::test]
    async fn test_overwrite_frees_old_entry() {
        let (store, memory) = clipboard();

        let mut first = vec![b'a'; 100];
        store.set_text(&mut first).unwrap();

        let mut second = vec![b'b'; 40];
        store.set_text(&mut second).unwrap();

        assert_eq!(&*store.get_text().unwrap(), &vec![b'b'; 40][..]);
        // The displaced entry shreds on a background task
        wait_for_allocated(&memory, 40).await;
    }

    #[tokio::test]
    async fn test_image_roundtrip() {
        let (store, _) = clipboard();

        let mut content = vec![0x89u8, 0x50, 0x4E, 0x47];
        store.set_image(&mut content, "image/png").unwrap();

        let (data, mime) = store.get_image().unwrap();
        assert_eq!(&*data, &[0x89u8, 0x50, 0x4E, 0x47][..]);
        assert_eq!(mime, "image/png");

        let info = store.image_info();
        assert!(info.has_content);
        assert_eq!(info.mime_type.as_deref(), Some("image/png"));
        assert_eq!(info.size, Some(4));
    }

    #[tokio::test]
    async fn test_delete_frees_memory() {
        let (store, memory) = clipboard();

        let mut content = vec![1u8; 64];
        store.set_text(&mut content).unwrap();
        assert_eq!(memory.allocated(), 64);

        store.delete_text();
        assert_eq!(memory.allocated(), 0);
        assert!(matches!(store.get_text(), Err(Error::ClipboardEmpty)));

        // Deleting an empty slot is fine
        store.delete_text();
    }

    #[tokio::test]
    async fn test_expiry() {
        let memory = Arc::new(MemoryTracker::new(MIN_MEMORY_LIMIT).unwrap());
        let store = ClipboardStore::new(Arc::clone(&memory), Duration::from_millis(10));

        let mut content = b"fleeting".to_vec();
        store.set_text(&mut content).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(matches!(store.get_text(), Err(Error::ClipboardExpired)));
        assert!(!store.has_text());
        assert!(!store.text_info().has_content);

        store.cleanup_expired();
        assert!(matches!(store.get_text(), Err(Error::ClipboardEmpty)));
        assert_eq!(memory.allocated(), 0);
    }

    #[tokio::test]
    async fn test_encrypted_text_flow() {
        let (store, memory) = clipboard();

        // Plaintext exists before sealing
        let mut content = b"secret".to_vec();
        store.set_text(&mut content).unwrap();

        let ciphertext = vec![0xE0u8; 120];
        store.set_encrypted_text(ciphertext.clone());

        // The displaced plaintext entry was shredded synchronously
        assert_eq!(memory.allocated(), 0);

        // Plaintext path is forbidden; ciphertext path serves the blob
        assert!(matches!(store.get_text(), Err(Error::ClipboardEmpty)));
        assert_eq!(store.get_encrypted_text().unwrap(), ciphertext);

        store.clear_encrypted_data();
        assert!(store.get_encrypted_text().is_none());
        assert!(matches!(store.get_text(), Err(Error::ClipboardEmpty)));

        // Clearing again observes the same state
        store.clear_encrypted_data();
        assert!(store.get_encrypted_text().is_none());
    }

    #[tokio::test]
    async fn test_encrypted_image_flow() {
        let (store, _) = clipboard();

        store.set_encrypted_image(vec![0xD1u8; 80], "image/jpeg");

        let (blob, mime) = store.get_encrypted_image().unwrap();
        assert_eq!(blob, vec![0xD1u8; 80]);
        assert_eq!(mime, "image/jpeg");

        assert!(matches!(store.get_image(), Err(Error::ClipboardEmpty)));

        store.clear_encrypted_data();
        assert!(store.get_encrypted_image().is_none());
    }

    #[tokio::test]
    async fn test_empty_encrypted_blob_ignored() {
        let (store, _) = clipboard();
        store.set_encrypted_text(Vec::new());
        assert!(store.get_encrypted_text().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overwrite_settles_to_one_entry() {
        let (store, memory) = clipboard();

        let a = vec![b'A'; 64];
        let b = vec![b'B'; 64];

        let store_a = Arc::clone(&store);
        let payload_a = a.clone();
        let writer_a = tokio::spawn(async move {
            for _ in 0..200 {
                let mut content = payload_a.clone();
                store_a.set_text(&mut content).unwrap();
            }
        });

        let store_b = Arc::clone(&store);
        let payload_b = b.clone();
        let writer_b = tokio::spawn(async move {
            for _ in 0..200 {
                let mut content = payload_b.clone();
                store_b.set_text(&mut content).unwrap();
            }
        });

        writer_a.await.unwrap();
        writer_b.await.unwrap();

        let data = store.get_text().unwrap();
        assert!(&*data == &a[..] || &*data == &b[..]);

        // Exactly one entry's bytes remain accounted once shredding settles
        wait_for_allocated(&memory, 64).await;
    }

    #[tokio::test]
    async fn test_shred_all_and_close() {
        let (store, memory) = clipboard();

        let mut text = vec![1u8; 32];
        let mut image = vec![2u8; 48];
        store.set_text(&mut text).unwrap();
        store.set_image(&mut image, "image/png").unwrap();
        assert_eq!(memory.allocated(), 80);

        store.shred_all();
        assert_eq!(memory.allocated(), 0);
        assert!(!store.has_text());
        assert!(!store.has_image());

        store.close();
    }
}
