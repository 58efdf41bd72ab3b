//! Offline consistency check for a storage root.
//!
//! [`audit`] walks the registry, every namespace directory, and every catalog,
//! and reports each place where they disagree. [`repair`] fixes only what can
//! be fixed without losing data a client may still expect:
//!
//! | Finding                  | Repair                         |
//! |--------------------------|--------------------------------|
//! | Missing namespace        | Recreate the empty directory   |
//! | Orphan blob              | Remove the file                |
//! | Stale temporary file     | Remove the file                |
//! | Unregistered directory   | Left alone, reported           |
//! | Dangling catalog entry   | Left alone, reported           |
//!
//! Both functions bypass the in-process namespace locks and must only be run
//! against a storage root no server is currently writing to.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ServiceError, StoreError};
use crate::io::is_temp_name;
use crate::token::{load_tokens, ImageId, Token};

use super::blob::{blob_filename, blob_path};
use super::catalog::Catalog;

/// Catalog entry whose blob is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingEntry {
    pub token: Token,
    pub image_id: ImageId,
    pub filename: String,
}

/// Everything [`audit`] found.
#[derive(Debug, Default)]
pub struct AuditReport {
    /// Number of namespaces inspected
    pub namespaces_checked: usize,

    /// Number of catalog entries inspected
    pub images_checked: usize,

    /// Registered tokens without a namespace directory
    pub missing_namespaces: Vec<Token>,

    /// Directories under the root that no registered token owns
    pub unregistered_dirs: Vec<PathBuf>,

    /// Catalog entries pointing at missing blobs
    pub dangling_entries: Vec<DanglingEntry>,

    /// Blobs no catalog entry points at
    pub orphan_blobs: Vec<PathBuf>,

    /// Leftovers of interrupted atomic writes
    pub stale_temp_files: Vec<PathBuf>,
}

impl AuditReport {
    /// Whether nothing at all was found.
    pub fn is_clean(&self) -> bool {
        self.problem_count() == 0
    }

    pub fn problem_count(&self) -> usize {
        self.missing_namespaces.len()
            + self.unregistered_dirs.len()
            + self.dangling_entries.len()
            + self.orphan_blobs.len()
            + self.stale_temp_files.len()
    }

    /// Problems [`repair`] will not touch.
    pub fn unrepairable_count(&self) -> usize {
        self.unregistered_dirs.len() + self.dangling_entries.len()
    }
}

/// What [`repair`] changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub namespaces_created: usize,
    pub orphan_blobs_removed: usize,
    pub temp_files_removed: usize,
}

/// Scan `root` and report inconsistencies without modifying anything.
pub async fn audit(root: &Path) -> Result<AuditReport, ServiceError> {
    let tokens = load_tokens(root).await?;
    let registered: HashSet<&str> = tokens.values().map(Token::as_str).collect();

    let mut report = AuditReport::default();
    let mut present = HashSet::new();

    let mut entries = tokio::fs::read_dir(root).await.map_err(StoreError::from)?;
    while let Some(entry) = entries.next_entry().await.map_err(StoreError::from)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(StoreError::from)?;

        if file_type.is_dir() {
            if registered.contains(name.as_str()) {
                present.insert(name);
            } else {
                report.unregistered_dirs.push(path);
            }
        } else if is_temp_name(&name) {
            report.stale_temp_files.push(path);
        }
    }

    for token in tokens.values() {
        if !present.contains(token.as_str()) {
            report.missing_namespaces.push(token.clone());
            continue;
        }
        audit_namespace(root, token, &mut report).await?;
        report.namespaces_checked += 1;
    }

    report.unregistered_dirs.sort();
    debug!(
        namespaces = report.namespaces_checked,
        images = report.images_checked,
        problems = report.problem_count(),
        "Audit complete"
    );

    Ok(report)
}

async fn audit_namespace(
    root: &Path,
    token: &Token,
    report: &mut AuditReport,
) -> Result<(), ServiceError> {
    let dir = root.join(token.as_str());
    let catalog = Catalog::load(&dir).await?;
    report.images_checked += catalog.len();

    let mut blobs = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(&dir).await.map_err(StoreError::from)?;
    while let Some(entry) = entries.next_entry().await.map_err(StoreError::from)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_temp_name(&name) {
            report.stale_temp_files.push(entry.path());
        } else if let Some(filename) = blob_filename(&name) {
            blobs.insert(filename.to_string());
        }
    }

    for (image_id, filename) in catalog.iter() {
        if !blobs.contains(filename) {
            report.dangling_entries.push(DanglingEntry {
                token: token.clone(),
                image_id: image_id.clone(),
                filename: filename.to_string(),
            });
        }
    }

    for filename in &blobs {
        if !catalog.contains_filename(filename) {
            report.orphan_blobs.push(blob_path(&dir, filename));
        }
    }

    Ok(())
}

/// Apply the safe repairs for `report` under `root`.
pub async fn repair(root: &Path, report: &AuditReport) -> Result<RepairSummary, ServiceError> {
    let mut summary = RepairSummary::default();

    for token in &report.missing_namespaces {
        tokio::fs::create_dir_all(root.join(token.as_str()))
            .await
            .map_err(StoreError::from)?;
        summary.namespaces_created += 1;
    }

    for path in &report.orphan_blobs {
        if remove_if_present(path).await? {
            summary.orphan_blobs_removed += 1;
        }
    }

    for path in &report.stale_temp_files {
        if remove_if_present(path).await? {
            summary.temp_files_removed += 1;
        }
    }

    for entry in &report.dangling_entries {
        warn!(
            image_id = %entry.image_id,
            filename = %entry.filename,
            "Dangling catalog entry left for manual review"
        );
    }

    info!(
        namespaces_created = summary.namespaces_created,
        orphan_blobs_removed = summary.orphan_blobs_removed,
        temp_files_removed = summary.temp_files_removed,
        "Repair complete"
    );

    Ok(summary)
}

async fn remove_if_present(path: &Path) -> Result<bool, ServiceError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::from(e).into()),
    }
}
