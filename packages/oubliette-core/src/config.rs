//! # Configuration
//!
//! Plain configuration struct for the core. The transport adapter owns
//! environment / CLI parsing and hands the core an already-resolved
//! [`CoreConfig`]; the only environment flag the core reads itself is the
//! tripwire disable switch (see [`crate::secure::tripwire`]).

use std::time::Duration;

/// Default maximum file size (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 100 * 1024 * 1024;

/// Default maximum secure memory across all stores (512 MiB).
pub const DEFAULT_MAX_MEMORY: usize = 512 * 1024 * 1024;

/// Default file expiry (24 hours).
pub const DEFAULT_FILE_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Default clipboard expiry (1 hour).
pub const DEFAULT_CLIPBOARD_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Configuration for initializing the Oubliette core
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Maximum size of a single stored file in bytes
    pub max_file_size: usize,
    /// Maximum secure memory across all stores in bytes
    pub max_memory: usize,
    /// Time until stored files auto-expire
    pub file_expiry: Duration,
    /// Time until clipboard content auto-expires
    pub clipboard_expiry: Duration,
    /// Number of decoy buffers to keep alive
    pub decoy_count: usize,
    /// Minimum decoy buffer size in bytes
    pub decoy_min_size: usize,
    /// Maximum decoy buffer size in bytes
    pub decoy_max_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_memory: DEFAULT_MAX_MEMORY,
            file_expiry: DEFAULT_FILE_EXPIRY,
            clipboard_expiry: DEFAULT_CLIPBOARD_EXPIRY,
            decoy_count: 100,
            decoy_min_size: 1024,
            decoy_max_size: 512 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.max_file_size, 100 * 1024 * 1024);
        assert_eq!(cfg.max_memory, 512 * 1024 * 1024);
        assert_eq!(cfg.file_expiry, Duration::from_secs(86400));
        assert_eq!(cfg.clipboard_expiry, Duration::from_secs(3600));
        assert_eq!(cfg.decoy_count, 100);
    }
}
