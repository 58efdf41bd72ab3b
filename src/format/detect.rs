//! Content-based image type detection.
//!
//! Uploads are classified from their leading bytes only. The filename and
//! extension supplied by the client are never consulted, so `cat.png`
//! containing a GIF is stored and served as a GIF, and `notes.jpg` containing
//! text is rejected.
//!
//! Supported formats:
//!
//! - **JPEG**: `FF D8 FF`
//! - **PNG**: `89 50 4E 47 0D 0A 1A 0A`
//! - **GIF**: `GIF87a` or `GIF89a`
//!
//! Magic numbers are matched with [`image::guess_format`]; anything it
//! recognizes outside the set above is treated as unrecognized.

use image::ImageFormat;

// =============================================================================
// ImageKind
// =============================================================================

/// Image formats accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    /// MIME type served in `Content-Type`.
    pub const fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
        }
    }

    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "JPEG",
            ImageKind::Png => "PNG",
            ImageKind::Gif => "GIF",
        }
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Sniffing
// =============================================================================

/// Number of leading bytes the sniffer looks at.
///
/// Callers holding a stream only need to buffer this much before calling
/// [`sniff`]; longer slices are truncated.
pub const SNIFF_PREFIX_LEN: usize = 32;

/// Classify content by its magic bytes.
///
/// Returns `None` for empty input, truncated signatures, and every format
/// outside [`ImageKind`].
pub fn sniff(content: &[u8]) -> Option<ImageKind> {
    let prefix = &content[..content.len().min(SNIFF_PREFIX_LEN)];

    match image::guess_format(prefix).ok()? {
        ImageFormat::Jpeg => Some(ImageKind::Jpeg),
        ImageFormat::Png => Some(ImageKind::Png),
        ImageFormat::Gif => Some(ImageKind::Gif),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
