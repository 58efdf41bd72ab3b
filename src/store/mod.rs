//! Token-scoped content store.
//!
//! # Components
//!
//! - [`ContentStore`]: put, get, list, update and delete under a token
//! - [`Catalog`]: image id to filename mapping persisted per namespace
//! - [`blob`]: gzip-compressed blob files and streamed decompression
//! - [`audit()`]: offline consistency scan with safe repairs
//!
//! # On-disk layout
//!
//! ```text
//! <root>/
//!   tokens.json
//!   <token>/
//!     imagemap.json
//!     <filename>.gz
//! ```

pub mod audit;
pub mod blob;
mod catalog;
mod content;
mod namespace;

pub use audit::{audit, repair, AuditReport, DanglingEntry, RepairSummary};
pub use blob::{ImageReader, BLOB_SUFFIX, MAX_FILENAME_LEN};
pub use catalog::{Catalog, CATALOG_FILE};
pub use content::{ContentStore, StoredImage};
pub use namespace::Namespace;
