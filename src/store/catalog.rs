//! Per-namespace image catalog.
//!
//! The catalog maps image ids to the filename they were uploaded under and is
//! persisted as a flat JSON object (`imagemap.json`) inside the namespace
//! directory. Filenames are unique within a catalog, which makes the inverse
//! (filename to id) mapping returned by listings well defined.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::io::{read_optional, write_atomic};
use crate::token::ImageId;

/// Catalog file name inside a namespace directory.
pub const CATALOG_FILE: &str = "imagemap.json";

/// Image id to filename mapping for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: BTreeMap<ImageId, String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the catalog of the namespace at `dir`.
    ///
    /// A namespace that never received an upload has no catalog file; that
    /// loads as an empty catalog.
    pub async fn load(dir: &Path) -> Result<Self, StoreError> {
        match read_optional(&dir.join(CATALOG_FILE)).await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(Self::new()),
        }
    }

    /// Atomically replace the catalog file of the namespace at `dir`.
    pub async fn persist(&self, dir: &Path) -> Result<(), StoreError> {
        let data = serde_json::to_vec(self)?;
        write_atomic(&dir.join(CATALOG_FILE), &data).await?;
        Ok(())
    }

    pub fn get(&self, image_id: &ImageId) -> Option<&str> {
        self.entries.get(image_id).map(String::as_str)
    }

    pub fn contains_id(&self, image_id: &str) -> bool {
        self.entries.keys().any(|id| id.as_str() == image_id)
    }

    pub fn contains_filename(&self, filename: &str) -> bool {
        self.entries.values().any(|f| f == filename)
    }

    /// Insert or replace an entry, returning the previous filename.
    pub fn insert(&mut self, image_id: ImageId, filename: impl Into<String>) -> Option<String> {
        self.entries.insert(image_id, filename.into())
    }

    pub fn remove(&mut self, image_id: &ImageId) -> Option<String> {
        self.entries.remove(image_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ImageId, &str)> {
        self.entries.iter().map(|(id, f)| (id, f.as_str()))
    }

    /// Filename to image id view used by listings.
    pub fn by_filename(&self) -> BTreeMap<String, ImageId> {
        self.entries
            .iter()
            .map(|(id, filename)| (filename.clone(), id.clone()))
            .collect()
    }
}
