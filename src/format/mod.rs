//! Image type sniffing.
//!
//! Use [`detect::sniff`] to classify uploaded bytes. Only JPEG, PNG and GIF
//! are accepted by the store.

pub mod detect;

pub use detect::{sniff, ImageKind, SNIFF_PREFIX_LEN};
