//! # File Store
//!
//! Identified file entries in secure memory, with expiry, byte accounting
//! and the plaintext/ciphertext duality of sealed mode.
//!
//! ## Entry Duality
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       STORED FILE CONTENT MODES                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Unlocked:  data = FortifiedBuffer (scatter + obfuscation + tripwire)  │
//! │             encrypted = None                                           │
//! │             store/get/list serve plaintext copies                      │
//! │                                                                         │
//! │  Locked:    data = None                                                │
//! │             encrypted = opaque client-encrypted bytes                  │
//! │             only the encrypted accessors work; get() answers           │
//! │             FileNotFound because the plaintext path is gone            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Store Policy
//!
//! 1. reject oversized content
//! 2. reserve bytes with the memory tracker
//! 3. generate the 64-bit id
//! 4. build the fortified buffer
//! 5. insert and stamp expiry
//!
//! Every failure path after step 2 releases the reservation; the input slice
//! is shredded after the call no matter what happened. A sweeper task wakes
//! once a minute and shreds expired entries; expiry itself is an absolute
//! timestamp, so a late sweep never extends a lifetime.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::config::{DEFAULT_FILE_EXPIRY, DEFAULT_MAX_FILE_SIZE};
use crate::crypto::generate_file_id;
use crate::error::{Error, Result};
use crate::secure::fortified::FortifiedBuffer;
use crate::secure::memory::MemoryTracker;
use crate::secure::shred::shred;
use crate::time::to_chrono;
use crate::validate;

/// How often the expiry sweeper wakes.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct StoredFile {
    id: String,
    /// Plaintext content while unlocked
    data: Option<FortifiedBuffer>,
    /// Opaque ciphertext while locked
    encrypted: Option<Zeroizing<Vec<u8>>>,

    filename: String,
    mime_type: String,
    size: usize,
    /// Bytes this entry reserved with the memory tracker (0 for
    /// ciphertext-only entries, which the tracker never saw)
    tracked_bytes: usize,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl StoredFile {
    fn info(&self) -> FileInfo {
        FileInfo {
            id: self.id.clone(),
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// File metadata for adapters. Content never travels in here.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    /// 16-hex-char identifier
    pub id: String,
    /// Sanitised filename
    pub filename: String,
    /// Normalised MIME type
    pub mime_type: String,
    /// Content size in bytes
    pub size: usize,
    /// When the entry was stored
    pub created_at: DateTime<Utc>,
    /// When the entry expires
    pub expires_at: DateTime<Utc>,
}

/// Storage statistics.
#[derive(Debug, Clone, Serialize)]
pub struct FileStoreStats {
    /// Number of stored entries
    pub file_count: usize,
    /// Sum of entry sizes in bytes
    pub total_size: usize,
    /// Per-file size limit in bytes
    pub max_file_size: usize,
}

/// The sealed-mode transport record: metadata plus client-encrypted bytes.
///
/// On the wire the encrypted payload travels base64-encoded; in process it
/// is raw bytes. Serde applies the encoding, so serializing this struct
/// yields exactly the adapter's JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedFileRecord {
    /// 16-hex-char identifier (client-assigned while locked)
    pub id: String,
    /// Filename
    pub name: String,
    /// MIME type
    pub mime_type: String,
    /// Plaintext size in bytes as declared by the client
    pub size: usize,
    /// `IV(12) ‖ ciphertext ‖ tag(16)`, base64 on the wire
    #[serde(with = "b64")]
    pub encrypted: Vec<u8>,
}

mod b64 {
    use super::{Engine, BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Secure in-memory file storage.
pub struct FileStore {
    files: DashMap<String, StoredFile>,
    max_file_size: usize,
    expiry: ChronoDuration,
    memory: Arc<MemoryTracker>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FileStore {
    /// Creates a file store and starts its expiry sweeper. Zero arguments
    /// fall back to the defaults (100 MiB per file, 24 h expiry). Must be
    /// called within a Tokio runtime.
    pub fn new(memory: Arc<MemoryTracker>, max_file_size: usize, expiry: Duration) -> Arc<Self> {
        let max_file_size = if max_file_size == 0 {
            DEFAULT_MAX_FILE_SIZE
        } else {
            max_file_size
        };
        let expiry = if expiry.is_zero() {
            DEFAULT_FILE_EXPIRY
        } else {
            expiry
        };

        let store = Arc::new(Self {
            files: DashMap::new(),
            max_file_size,
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

    fn expires_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.expiry)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Stores a file and returns its id. Unlocked path only.
    ///
    /// The content slice is always shredded after this call, success or
    /// failure; never reuse it.
    pub fn store(&self, filename: &str, mime_type: &str, content: &mut [u8]) -> Result<String> {
        let result = self.store_inner(filename, mime_type, content);
        // The fortified buffer already wiped the content on the success
        // path; this covers every early return.
        shred(content);
        result
    }

    fn store_inner(&self, filename: &str, mime_type: &str, content: &mut [u8]) -> Result<String> {
        let filename = validate::filename(filename)?;
        let mime_type = validate::mime_type_or_default(mime_type, "application/octet-stream");

        let len = content.len();
        if len > self.max_file_size {
            return Err(Error::FileTooLarge);
        }

        self.memory.allocate(len)?;

        let id = match generate_file_id() {
            Ok(id) => id,
            Err(err) => {
                self.memory.free(len);
                return Err(err);
            }
        };

        let buf = match FortifiedBuffer::new(content) {
            Ok(buf) => buf,
            Err(err) => {
                self.memory.free(len);
                return Err(err);
            }
        };

        let now = Utc::now();
        let file = StoredFile {
            id: id.clone(),
            data: Some(buf),
            encrypted: None,
            filename,
            mime_type,
            size: len,
            tracked_bytes: len,
            created_at: now,
            expires_at: self.expires_from(now),
        };

        self.files.insert(id.clone(), file);
        tracing::debug!(id = id.as_str(), size = len, "file stored");

        Ok(id)
    }

    /// Retrieves a file's metadata and a fresh plaintext copy. Unlocked
    /// path only: a ciphertext-only entry answers [`Error::FileNotFound`].
    pub fn get(&self, id: &str) -> Result<(FileInfo, Zeroizing<Vec<u8>>)> {
        let id = validate::file_id(id).map_err(|_| Error::FileNotFound)?;

        let file = self.files.get(&id).ok_or(Error::FileNotFound)?;

        if file.is_expired(Utc::now()) {
            return Err(Error::FileExpired);
        }

        let data = file.data.as_ref().ok_or(Error::FileNotFound)?;
        let content = data.read()?;

        Ok((file.info(), content))
    }

    /// Retrieves metadata without touching the content.
    pub fn get_metadata(&self, id: &str) -> Result<FileInfo> {
        let id = validate::file_id(id).map_err(|_| Error::FileNotFound)?;

        let file = self.files.get(&id).ok_or(Error::FileNotFound)?;
        if file.is_expired(Utc::now()) {
            return Err(Error::FileExpired);
        }

        Ok(file.info())
    }

    /// Removes and shreds a file.
    pub fn delete(&self, id: &str) -> Result<()> {
        let id = validate::file_id(id).map_err(|_| Error::FileNotFound)?;

        // Take ownership out of the map, then shred outside the shard lock.
        let (_, file) = self.files.remove(&id).ok_or(Error::FileNotFound)?;
        self.shred_file(file);

        tracing::debug!(id = id.as_str(), "file deleted");
        Ok(())
    }

    /// Lists metadata for all non-expired entries, newest first.
    pub fn list(&self) -> Vec<FileInfo> {
        let now = Utc::now();
        let mut files: Vec<FileInfo> = self
            .files
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.info())
            .collect();

        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        files
    }

    /// Returns the number of stored entries.
    pub fn count(&self) -> usize {
        self.files.len()
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> FileStoreStats {
        FileStoreStats {
            file_count: self.files.len(),
            total_size: self.files.iter().map(|entry| entry.size).sum(),
            max_file_size: self.max_file_size,
        }
    }

    // ========================================================================
    // SEALED-MODE OPERATIONS
    // ========================================================================

    /// Replaces every entry with opaque ciphertext-only entries. Called
    /// during the lock transition; existing plaintext is shredded first.
    pub fn set_encrypted_files(&self, records: Vec<EncryptedFileRecord>) {
        let replaced = self.shred_all();
        if replaced > 0 {
            tracing::debug!(count = replaced, "replaced plaintext entries for sealed mode");
        }

        for record in records {
            self.add_encrypted_file(record);
        }
    }

    /// Inserts a single ciphertext-only entry. Used for uploads while the
    /// session is locked — the client encrypts locally.
    pub fn add_encrypted_file(&self, record: EncryptedFileRecord) {
        let now = Utc::now();
        let file = StoredFile {
            id: record.id.clone(),
            data: None,
            encrypted: Some(Zeroizing::new(record.encrypted)),
            filename: record.name,
            mime_type: record.mime_type,
            size: record.size,
            tracked_bytes: 0,
            created_at: now,
            expires_at: self.expires_from(now),
        };

        self.files.insert(record.id, file);
    }

    /// Returns every ciphertext entry for client-side decryption.
    pub fn get_encrypted_files(&self) -> Vec<EncryptedFileRecord> {
        self.files
            .iter()
            .filter_map(|entry| {
                entry.encrypted.as_ref().map(|enc| EncryptedFileRecord {
                    id: entry.id.clone(),
                    name: entry.filename.clone(),
                    mime_type: entry.mime_type.clone(),
                    size: entry.size,
                    encrypted: enc.to_vec(),
                })
            })
            .collect()
    }

    /// Shreds every entry's ciphertext; entries left with no plaintext
    /// either are removed. Called after the client has decrypted and
    /// re-uploaded plaintext.
    pub fn clear_encrypted_data(&self) {
        self.files.retain(|_, file| {
            if let Some(mut enc) = file.encrypted.take() {
                shred(enc.as_mut_slice());
            }
            file.data.is_some()
        });
    }

    // ========================================================================
    // DESTRUCTION
    // ========================================================================

    fn shred_file(&self, mut file: StoredFile) {
        self.memory.free(file.tracked_bytes);

        if let Some(buf) = file.data.take() {
            buf.destroy();
        }
        if let Some(mut enc) = file.encrypted.take() {
            shred(enc.as_mut_slice());
        }
    }

    /// Destroys every entry. Returns the number shredded.
    ///
    /// The map is drained first; shredding happens on owned entries outside
    /// the map locks so readers are never blocked behind a multi-pass wipe.
    pub fn shred_all(&self) -> usize {
        let ids: Vec<String> = self.files.iter().map(|entry| entry.key().clone()).collect();

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, file)) = self.files.remove(&id) {
                removed.push(file);
            }
        }

        let count = removed.len();
        for file in removed {
            self.shred_file(file);
        }

        if count > 0 {
            tracing::info!(count, "shredded all files");
        }
        count
    }

    /// Removes and shreds expired entries. The sweeper calls this once a
    /// minute; it is also safe to call directly.
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .files
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut count = 0;
        for id in expired {
            if let Some((_, file)) = self.files.remove(&id) {
                self.shred_file(file);
                count += 1;
            }
        }

        if count > 0 {
            tracing::debug!(count, "expired files shredded");
        }
    }

    /// Stops the sweeper and shreds everything. For shutdown.
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
