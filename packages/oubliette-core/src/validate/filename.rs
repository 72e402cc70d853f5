//! Filename validation and sanitisation.
//!
//! Two contracts are offered:
//!
//! - [`filename`] sanitises: strips directory components, replaces dangerous
//!   bytes, prefixes Windows-reserved names. Traversal (`..`) is always a
//!   hard rejection.
//! - [`filename_strict`] rejects anything that would need sanitising, for
//!   adapters that prefer telling the user over silently rewriting.

use crate::error::{Error, Result};

/// Maximum allowed filename length.
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Windows reserved device names (case-insensitive, extension ignored).
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_dangerous(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') || (c as u32) < 0x20
}

fn is_reserved(name: &str) -> bool {
    let base = name.split('.').next().unwrap_or(name);
    RESERVED_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(base))
}

/// Validates and sanitises a filename.
///
/// Prevents path traversal and strips characters that are dangerous on any
/// supported platform. Returns the sanitised name.
pub fn filename(name: &str) -> Result<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(Error::FilenameEmpty);
    }
    if name.len() > MAX_FILENAME_LENGTH {
        return Err(Error::FilenameTooLong);
    }
    if name.contains("..") {
        return Err(Error::FilenamePathTraversal);
    }

    // Keep only the final path component
    let name = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    if name.is_empty() || name == "." {
        return Err(Error::FilenamePathTraversal);
    }

    // Replace dangerous characters, then drop leading/trailing dots and
    // spaces (a Windows quirk).
    let mut sanitised: String = name
        .chars()
        .map(|c| if is_dangerous(c) { '_' } else { c })
        .collect();
    sanitised = sanitised
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string();

    if sanitised.is_empty() {
        return Err(Error::FilenameInvalid);
    }

    if is_reserved(&sanitised) {
        sanitised.insert(0, '_');
    }

    if sanitised.len() > MAX_FILENAME_LENGTH {
        sanitised.truncate(MAX_FILENAME_LENGTH);
    }

    Ok(sanitised)
}

/// Like [`filename`], but rejects any name that would need sanitising.
pub fn filename_strict(name: &str) -> Result<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(Error::FilenameEmpty);
    }
    if name.len() > MAX_FILENAME_LENGTH {
        return Err(Error::FilenameTooLong);
    }
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(Error::FilenamePathTraversal);
    }
    if name.chars().any(is_dangerous) {
        return Err(Error::FilenameInvalid);
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(Error::FilenameInvalid);
    }
    if is_reserved(name) {
        return Err(Error::FilenameInvalid);
    }

    Ok(name.to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(filename("notes.txt").unwrap(), "notes.txt");
        assert_eq!(filename("  report-2.pdf ").unwrap(), "report-2.pdf");
    }

    #[test]
    fn test_traversal_always_rejected() {
        assert!(matches!(
            filename("../../etc/passwd"),
            Err(Error::FilenamePathTraversal)
        ));
        assert!(matches!(
            filename("a..b.txt"),
            Err(Error::FilenamePathTraversal)
        ));
        assert!(matches!(
            filename_strict("..\\boot.ini"),
            Err(Error::FilenamePathTraversal)
        ));
    }

    #[test]
    fn test_directory_components_stripped() {
        assert_eq!(filename("/var/tmp/file.txt").unwrap(), "file.txt");
        assert_eq!(filename("dir\\file.txt").unwrap(), "file.txt");
    }

    #[test]
    fn test_dangerous_characters_replaced() {
        assert_eq!(filename("a<b>c.txt").unwrap(), "a_b_c.txt");
        assert_eq!(filename("pipe|name?.log").unwrap(), "pipe_name_.log");
    }

    #[test]
    fn test_reserved_names_prefixed() {
        assert_eq!(filename("CON").unwrap(), "_CON");
        assert_eq!(filename("nul.txt").unwrap(), "_nul.txt");
        assert_eq!(filename("console.txt").unwrap(), "console.txt");
    }

    #[test]
    fn test_empty_and_too_long() {
        assert!(matches!(filename("   "), Err(Error::FilenameEmpty)));
        let long = "x".repeat(MAX_FILENAME_LENGTH + 1);
        assert!(matches!(filename(&long), Err(Error::FilenameTooLong)));
    }

    #[test]
    fn test_strict_rejects_sanitisable_names() {
        assert!(matches!(
            filename_strict("a<b.txt"),
            Err(Error::FilenameInvalid)
        ));
        assert!(matches!(
            filename_strict(".hidden"),
            Err(Error::FilenameInvalid)
        ));
        assert!(matches!(
            filename_strict("LPT1"),
            Err(Error::FilenameInvalid)
        ));
        assert_eq!(filename_strict("fine.txt").unwrap(), "fine.txt");
    }

    #[test]
    fn test_control_bytes_handled() {
        assert_eq!(filename("a\u{1}b.txt").unwrap(), "a_b.txt");
        assert!(matches!(
            filename_strict("a\u{1}b.txt"),
            Err(Error::FilenameInvalid)
        ));
    }
}
