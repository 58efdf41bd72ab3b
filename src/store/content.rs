//! Token-scoped content store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ContentStore                          │
//! │   namespaces: Mutex<HashMap<Token, Arc<Namespace>>>          │
//! │                                                              │
//! │   put / update / delete        get / list                    │
//! │   ── write lock ──             ── read lock ──               │
//! │        │                            │                        │
//! │        ▼                            ▼                        │
//! │  ┌──────────────┐   ┌────────────────────────────────────┐   │
//! │  │  Catalog     │   │  blob: gzip write / streamed read  │   │
//! │  │ imagemap.json│   │  <filename>.gz                     │   │
//! │  └──────────────┘   └────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Write ordering
//!
//! Blobs are always written before the catalog references them, and old
//! blobs are removed only after the catalog stopped referencing them. An
//! interruption therefore leaves at worst an orphan blob, which
//! [`audit`](super::audit) can find and remove, never an entry pointing at a
//! missing file. `delete` is the one exception: it removes the blob first, and
//! a failure to persist the catalog afterwards is reported as
//! [`StoreError::Inconsistent`].

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::format::{sniff, ImageKind};
use crate::token::{ImageId, Token, MAX_ID_ATTEMPTS};

use super::blob::{self, ImageReader};
use super::namespace::Namespace;

// =============================================================================
// Stored Image
// =============================================================================

/// Result of a successful `get`.
#[derive(Debug)]
pub struct StoredImage {
    /// Id the image was looked up by
    pub image_id: ImageId,

    /// Filename the image was uploaded under
    pub filename: String,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Sniffed image format
    pub kind: ImageKind,

    /// Streaming decompressor over the stored bytes
    pub reader: ImageReader,
}

// =============================================================================
// Content Store
// =============================================================================

/// Filesystem-backed store of images, partitioned by token.
///
/// Every operation takes a token. A token is valid exactly when its namespace
/// directory exists under the storage root; otherwise the operation fails
/// with [`StoreError::InvalidToken`].
pub struct ContentStore {
    /// Storage root containing one directory per namespace
    root: PathBuf,

    /// Namespace handles, created on first use and kept for the store's lifetime
    namespaces: Mutex<HashMap<Token, Arc<Namespace>>>,
}

impl ContentStore {
    /// Create a store over the namespaces found under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            namespaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the namespace owned by `token`.
    pub fn namespace_dir(&self, token: &Token) -> PathBuf {
        self.root.join(token.as_str())
    }

    /// Whether `token` owns a namespace.
    pub async fn namespace_exists(&self, token: &Token) -> Result<bool, StoreError> {
        match tokio::fs::metadata(self.namespace_dir(token)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Get the namespace handle for `token`, loading its catalog on first use.
    ///
    /// The catalog is read without holding the map lock, so first access to
    /// one namespace never waits on another. If two callers race, the first
    /// handle inserted wins and the other copy is dropped.
    async fn namespace(&self, token: &Token) -> Result<Arc<Namespace>, StoreError> {
        if let Some(ns) = self.namespaces.lock().await.get(token) {
            return Ok(ns.clone());
        }

        if !self.namespace_exists(token).await? {
            return Err(StoreError::InvalidToken);
        }

        let loaded = Arc::new(Namespace::load(token.clone(), self.namespace_dir(token)).await?);
        let images = loaded.read().await.len();

        match self.namespaces.lock().await.entry(token.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                debug!(images, "Opened namespace");
                Ok(entry.insert(loaded).clone())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Store a new image and return its id.
    ///
    /// # Errors
    ///
    /// - `InvalidFilename` if the name could escape the namespace
    /// - `UnrecognizedFileType` if the content is not JPEG, PNG or GIF
    /// - `FileExists` if the namespace already holds a file with this name
    /// - `Inconsistent` if no free image id could be drawn
    pub async fn put(
        &self,
        token: &Token,
        filename: &str,
        content: Bytes,
    ) -> Result<ImageId, StoreError> {
        let ns = self.namespace(token).await?;
        let kind = check_upload(filename, &content)?;
        run_to_completion(put_locked(ns, filename.to_string(), content, kind)).await
    }

    /// Replace the content and filename of an existing image, keeping its id.
    ///
    /// The conflict check on the new filename runs before anything is written
    /// or deleted, so a rejected update leaves the old image intact.
    pub async fn update(
        &self,
        token: &Token,
        image_id: &ImageId,
        filename: &str,
        content: Bytes,
    ) -> Result<(), StoreError> {
        let ns = self.namespace(token).await?;
        let kind = check_upload(filename, &content)?;
        run_to_completion(update_locked(
            ns,
            image_id.clone(),
            filename.to_string(),
            content,
            kind,
        ))
        .await
    }

    /// Delete an image and its blob.
    pub async fn delete(&self, token: &Token, image_id: &ImageId) -> Result<(), StoreError> {
        let ns = self.namespace(token).await?;
        run_to_completion(delete_locked(ns, image_id.clone())).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Open an image for streaming.
    pub async fn get(&self, token: &Token, image_id: &ImageId) -> Result<StoredImage, StoreError> {
        let ns = self.namespace(token).await?;

        // Hold the read lock until the file is open; the handle stays valid
        // if a later writer replaces or removes the blob.
        let catalog = ns.read().await;

        let filename = catalog
            .get(image_id)
            .map(str::to_string)
            .ok_or_else(|| not_found(image_id))?;

        let path = blob::blob_path(ns.dir(), &filename);
        let opened = match blocking(move || blob::open_blob(&path)).await {
            Ok(opened) => opened,
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(missing_blob(image_id, &filename));
            }
            Err(e) => return Err(e),
        };
        drop(catalog);

        let kind = opened.kind.ok_or_else(|| {
            StoreError::Inconsistent(format!(
                "stored blob for image {} is not a recognized image",
                image_id
            ))
        })?;

        debug!(image_id = %image_id, filename = %filename, size = opened.size, "Opened image");

        Ok(StoredImage {
            image_id: image_id.clone(),
            filename,
            size: opened.size,
            kind,
            reader: opened.reader,
        })
    }

    /// Filename to image id mapping for every image under `token`.
    ///
    /// An empty namespace is reported as [`StoreError::EmptyCatalog`].
    pub async fn list(&self, token: &Token) -> Result<BTreeMap<String, ImageId>, StoreError> {
        let ns = self.namespace(token).await?;
        let catalog = ns.read().await;

        if catalog.is_empty() {
            return Err(StoreError::EmptyCatalog);
        }

        Ok(catalog.by_filename())
    }
}

// =============================================================================
// Mutations
// =============================================================================
//
// Each writer runs on its own task holding the namespace write lock from the
// catalog lookup until the in-memory catalog matches the persisted one. A
// caller that goes away mid-request cannot stop a sequence halfway.

/// Spawn `mutation` and wait for it. Dropping the returned future detaches
/// the task instead of cancelling it.
async fn run_to_completion<T, F>(mutation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(mutation)
        .await
        .map_err(io::Error::other)?
}

async fn put_locked(
    ns: Arc<Namespace>,
    filename: String,
    content: Bytes,
    kind: ImageKind,
) -> Result<ImageId, StoreError> {
    let mut catalog = ns.write().await;

    let path = blob::blob_path(ns.dir(), &filename);
    if catalog.contains_filename(&filename) || path_exists(&path).await? {
        return Err(StoreError::FileExists { filename });
    }

    let image_id = ImageId::generate(|candidate| catalog.contains_id(candidate)).ok_or_else(|| {
        StoreError::Inconsistent(format!(
            "no free image id after {} attempts",
            MAX_ID_ATTEMPTS
        ))
    })?;

    let size = content.len();
    write_blob(path.clone(), content).await?;

    let mut next = catalog.clone();
    next.insert(image_id.clone(), &filename);

    if let Err(e) = next.persist(ns.dir()).await {
        // Nothing references the new blob yet; drop it again.
        remove_unreferenced(&path, &filename).await;
        return Err(e);
    }

    *catalog = next;
    info!(
        image_id = %image_id,
        filename = %filename,
        format = %kind,
        size,
        "Stored image"
    );

    Ok(image_id)
}

async fn update_locked(
    ns: Arc<Namespace>,
    image_id: ImageId,
    filename: String,
    content: Bytes,
    kind: ImageKind,
) -> Result<(), StoreError> {
    let mut catalog = ns.write().await;

    let old_filename = catalog
        .get(&image_id)
        .map(str::to_string)
        .ok_or_else(|| not_found(&image_id))?;

    let old_path = blob::blob_path(ns.dir(), &old_filename);
    if !path_exists(&old_path).await? {
        return Err(missing_blob(&image_id, &old_filename));
    }

    let renamed = old_filename != filename;
    let new_path = blob::blob_path(ns.dir(), &filename);

    if renamed && (catalog.contains_filename(&filename) || path_exists(&new_path).await?) {
        return Err(StoreError::FileExists { filename });
    }

    let size = content.len();
    write_blob(new_path.clone(), content).await?;

    if renamed {
        let mut next = catalog.clone();
        next.insert(image_id.clone(), &filename);

        if let Err(e) = next.persist(ns.dir()).await {
            remove_unreferenced(&new_path, &filename).await;
            return Err(e);
        }
        *catalog = next;

        if let Err(e) = tokio::fs::remove_file(&old_path).await {
            // The catalog no longer references it, so this is only an orphan.
            warn!(
                image_id = %image_id,
                filename = %old_filename,
                error = %e,
                "Failed to remove replaced blob"
            );
        }
    }

    info!(
        image_id = %image_id,
        old_filename = %old_filename,
        filename = %filename,
        format = %kind,
        size,
        "Updated image"
    );

    Ok(())
}

async fn delete_locked(ns: Arc<Namespace>, image_id: ImageId) -> Result<(), StoreError> {
    let mut catalog = ns.write().await;

    let filename = catalog
        .get(&image_id)
        .map(str::to_string)
        .ok_or_else(|| not_found(&image_id))?;

    let path = blob::blob_path(ns.dir(), &filename);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(missing_blob(&image_id, &filename));
        }
        Err(e) => return Err(e.into()),
    }

    let mut next = catalog.clone();
    next.remove(&image_id);

    if let Err(e) = next.persist(ns.dir()).await {
        error!(
            image_id = %image_id,
            filename = %filename,
            error = %e,
            "Blob removed but catalog could not be persisted"
        );
        return Err(StoreError::Inconsistent(format!(
            "blob for image {} was removed but the catalog still references it: {}",
            image_id, e
        )));
    }

    *catalog = next;
    info!(image_id = %image_id, filename = %filename, "Deleted image");

    Ok(())
}

async fn remove_unreferenced(path: &Path, filename: &str) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(
            filename = filename,
            error = %e,
            "Failed to remove blob after catalog write failure"
        );
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Validate an upload before any filesystem access.
fn check_upload(filename: &str, content: &[u8]) -> Result<ImageKind, StoreError> {
    if !blob::is_valid_filename(filename) {
        return Err(StoreError::InvalidFilename {
            filename: filename.to_string(),
        });
    }
    sniff(content).ok_or(StoreError::UnrecognizedFileType)
}

fn not_found(image_id: &ImageId) -> StoreError {
    StoreError::ImageNotFound {
        image_id: image_id.to_string(),
    }
}

fn missing_blob(image_id: &ImageId, filename: &str) -> StoreError {
    error!(image_id = %image_id, filename = filename, "Catalog entry has no blob");
    StoreError::Inconsistent(format!(
        "image {} references missing file {}",
        image_id, filename
    ))
}

async fn path_exists(path: &Path) -> Result<bool, StoreError> {
    Ok(tokio::fs::try_exists(path).await?)
}

async fn write_blob(path: PathBuf, content: Bytes) -> Result<(), StoreError> {
    blocking(move || blob::write_blob(&path, &content)).await
}

/// Run blocking filesystem work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
        .map_err(StoreError::from)
}

// =============================================================================
// Tests
// =============================================================================
