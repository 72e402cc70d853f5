//! MIME type validation.
//!
//! An allowlist of safe content types plus an explicit blocklist of
//! executable formats. Unknown types fall back to
//! `application/octet-stream` on the store path rather than rejecting the
//! upload outright.

/// Allowlist of permitted MIME types.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    // Documents
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/rtf",
    "application/epub+zip",
    // Images
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/bmp",
    "image/tiff",
    "image/x-icon",
    "image/heic",
    "image/avif",
    // Audio
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/ogg",
    "audio/flac",
    "audio/aac",
    "audio/webm",
    "audio/mp4",
    // Video
    "video/mp4",
    "video/webm",
    "video/ogg",
    "video/x-msvideo",
    "video/quicktime",
    "video/x-matroska",
    // Archives (non-executable)
    "application/zip",
    "application/x-rar-compressed",
    "application/x-7z-compressed",
    "application/gzip",
    "application/x-tar",
    "application/x-bzip2",
    // Data formats
    "application/json",
    "application/xml",
    "application/x-yaml",
    "application/toml",
    // Fonts
    "font/ttf",
    "font/otf",
    "font/woff",
    "font/woff2",
    // Generic binary (fallback)
    "application/octet-stream",
];

/// Types blocked outright, even when a category rule would admit them.
pub const BLOCKED_MIME_TYPES: &[&str] = &[
    // Executables
    "application/x-executable",
    "application/x-msdos-program",
    "application/x-msdownload",
    "application/x-sh",
    "application/x-shellscript",
    "application/x-bat",
    "application/x-msi",
    "application/vnd.microsoft.portable-executable",
    "application/x-dosexec",
    // Scripts that could be executed
    "application/x-perl",
    "application/x-ruby",
    "application/x-php",
    // Java
    "application/java-archive",
    "application/x-java-class",
    // macOS
    "application/x-apple-diskimage",
];

fn normalize(mime: &str) -> String {
    let mime = mime.trim().to_ascii_lowercase();
    match mime.find(';') {
        Some(idx) => mime[..idx].trim().to_string(),
        None => mime,
    }
}

/// Validates a MIME type against the allowlist.
///
/// Any `text/*` type is admitted; the blocklist wins over everything.
/// Returns the normalized type, or `None` when disallowed.
pub fn mime_type(mime: &str) -> Option<String> {
    let mime = normalize(mime);
    if mime.is_empty() {
        return None;
    }

    if BLOCKED_MIME_TYPES.contains(&mime.as_str()) {
        return None;
    }

    if ALLOWED_MIME_TYPES.contains(&mime.as_str()) || mime.starts_with("text/") {
        return Some(mime);
    }

    None
}

/// Validates a MIME type, falling back to `default` when disallowed.
pub fn mime_type_or_default(mime: &str, default: &str) -> String {
    mime_type(mime).unwrap_or_else(|| default.to_string())
}

/// Whether the MIME type passes validation.
pub fn is_mime_type_allowed(mime: &str) -> bool {
    mime_type(mime).is_some()
}

/// Whether the MIME type is an image type.
pub fn is_image_mime_type(mime: &str) -> bool {
    normalize(mime).starts_with("image/")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_and_normalization() {
        assert_eq!(mime_type("image/png").unwrap(), "image/png");
        assert_eq!(mime_type("  IMAGE/PNG  ").unwrap(), "image/png");
        assert_eq!(
            mime_type("text/plain; charset=utf-8").unwrap(),
            "text/plain"
        );
    }

    #[test]
    fn test_any_text_type_admitted() {
        assert_eq!(mime_type("text/x-rust").unwrap(), "text/x-rust");
    }

    #[test]
    fn test_blocklist_wins() {
        assert!(mime_type("application/x-msdownload").is_none());
        assert!(mime_type("application/x-sh").is_none());
    }

    #[test]
    fn test_unknown_falls_back() {
        assert_eq!(
            mime_type_or_default("application/x-unheard-of", "application/octet-stream"),
            "application/octet-stream"
        );
        assert_eq!(
            mime_type_or_default("", "application/octet-stream"),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_image_detection() {
        assert!(is_image_mime_type("image/jpeg"));
        assert!(is_image_mime_type("IMAGE/PNG; foo=bar"));
        assert!(!is_image_mime_type("video/mp4"));
    }

    #[test]
    fn test_is_allowed() {
        assert!(is_mime_type_allowed("application/pdf"));
        assert!(!is_mime_type_allowed("application/x-msi"));
    }
}
