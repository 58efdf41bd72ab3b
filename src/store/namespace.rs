//! Per-token namespace handle.

use std::path::{Path, PathBuf};

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::token::Token;

use super::catalog::Catalog;

/// One namespace: its directory and the lock-guarded in-memory catalog.
///
/// The in-memory catalog always equals the catalog file. Writers hold the
/// write guard across the whole read, mutate, persist sequence and only
/// replace the in-memory copy after the file was renamed into place, so
/// concurrent puts cannot lose each other's entries and readers never see a
/// half-applied change.
pub struct Namespace {
    token: Token,
    dir: PathBuf,
    catalog: RwLock<Catalog>,
}

impl Namespace {
    /// Load the namespace rooted at `dir`.
    pub async fn load(token: Token, dir: PathBuf) -> Result<Self, StoreError> {
        let catalog = Catalog::load(&dir).await?;
        Ok(Self {
            token,
            dir,
            catalog: RwLock::new(catalog),
        })
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shared access for lookups.
    pub async fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().await
    }

    /// Exclusive access for mutations.
    pub async fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().await
    }
}
