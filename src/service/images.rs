//! Image service: the operations surface used by the request layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ImageService                          │
//! │                                                              │
//! │  generate_token / retrieve_token    put / get / list /       │
//! │             │                       update / delete          │
//! │             │                              │                 │
//! │             │                   1. parse token & image id    │
//! │             │                   2. namespace must exist      │
//! │             ▼                              ▼                 │
//! │     ┌───────────────┐             ┌────────────────┐         │
//! │     │ TokenRegistry │             │  ContentStore  │         │
//! │     └───────────────┘             └────────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tokens and image ids arrive as untrusted strings. A string that is not
//! shaped like a token is rejected as `InvalidToken` and a string not shaped
//! like an image id as `NotFound`, before any path is built from them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::error::{ServiceError, StoreError};
use crate::store::{ContentStore, StoredImage};
use crate::token::{ImageId, Token, TokenRegistry};

/// Entry point for every token and image operation.
///
/// Cheap to clone; clones share the registry and the store.
#[derive(Clone)]
pub struct ImageService {
    registry: Arc<TokenRegistry>,
    store: Arc<ContentStore>,
}

impl ImageService {
    /// Build a service from an already opened registry and store.
    pub fn new(registry: TokenRegistry, store: ContentStore) -> Self {
        Self {
            registry: Arc::new(registry),
            store: Arc::new(store),
        }
    }

    /// Open the registry and store that share `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let root = root.into();
        let registry = TokenRegistry::open(root.clone()).await?;
        let store = ContentStore::new(root);
        Ok(Self::new(registry, store))
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    // -------------------------------------------------------------------------
    // Tokens
    // -------------------------------------------------------------------------

    /// Register `username` and return its new token.
    pub async fn generate_token(&self, username: &str) -> Result<Token, ServiceError> {
        Ok(self.registry.generate(username).await?)
    }

    /// Return the token already issued to `username`.
    pub async fn retrieve_token(&self, username: &str) -> Result<Token, ServiceError> {
        Ok(self.registry.retrieve(username).await?)
    }

    // -------------------------------------------------------------------------
    // Images
    // -------------------------------------------------------------------------

    pub async fn put_image(
        &self,
        token: &str,
        filename: &str,
        content: Bytes,
    ) -> Result<ImageId, ServiceError> {
        let token = self.authorize(token).await?;
        Ok(self.store.put(&token, filename, content).await?)
    }

    pub async fn get_image(&self, token: &str, image_id: &str) -> Result<StoredImage, ServiceError> {
        let token = self.authorize(token).await?;
        let image_id = parse_image_id(image_id)?;
        Ok(self.store.get(&token, &image_id).await?)
    }

    pub async fn list_images(
        &self,
        token: &str,
    ) -> Result<BTreeMap<String, ImageId>, ServiceError> {
        let token = self.authorize(token).await?;
        Ok(self.store.list(&token).await?)
    }

    pub async fn update_image(
        &self,
        token: &str,
        image_id: &str,
        filename: &str,
        content: Bytes,
    ) -> Result<(), ServiceError> {
        let token = self.authorize(token).await?;
        let image_id = parse_image_id(image_id)?;
        Ok(self.store.update(&token, &image_id, filename, content).await?)
    }

    pub async fn delete_image(&self, token: &str, image_id: &str) -> Result<(), ServiceError> {
        let token = self.authorize(token).await?;
        let image_id = parse_image_id(image_id)?;
        Ok(self.store.delete(&token, &image_id).await?)
    }

    /// Check that `token` is well formed and owns a namespace.
    pub async fn authorize(&self, token: &str) -> Result<Token, ServiceError> {
        let parsed = Token::parse(token).ok_or(StoreError::InvalidToken)?;

        if !self.store.namespace_exists(&parsed).await? {
            debug!("Rejected unknown token");
            return Err(StoreError::InvalidToken.into());
        }

        Ok(parsed)
    }
}

fn parse_image_id(image_id: &str) -> Result<ImageId, StoreError> {
    ImageId::parse(image_id).ok_or_else(|| StoreError::ImageNotFound {
        image_id: image_id.to_string(),
    })
}
