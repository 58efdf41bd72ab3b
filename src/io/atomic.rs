//! Crash-safe file replacement.
//!
//! Every persistent file (registry, catalogs, blobs) is written to a temporary
//! sibling first, flushed to disk, and then renamed over its target. A reader
//! or a crash therefore observes either the old file or the new one, never a
//! partial write.
//!
//! Temporary files are hidden (`.` prefix) and end in `.tmp`, which keeps them
//! out of the filename space clients are allowed to use.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::token::random_ident;

/// Suffix of every temporary file.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Build a unique temporary path next to `target`.
pub fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}{}", name, random_ident(8), TEMP_SUFFIX))
}

/// Whether a directory entry name was produced by [`temp_path`].
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

/// Atomically replace `path` with `contents`.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp = temp_path(path);

    let result = async {
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        tokio::fs::rename(&temp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp).await;
    }
    result
}

/// Blocking variant of [`write_atomic`] that lets `write` stream into the file.
///
/// Meant to run inside `spawn_blocking` when the payload is produced by a
/// synchronous encoder.
pub fn write_atomic_with<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let temp = temp_path(path);

    let result = (|| {
        let mut file = File::create(&temp)?;
        write(&mut file)?;
        file.sync_all()?;
        std::fs::rename(&temp, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}

/// Read a file, mapping "does not exist" to `None`.
pub async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
