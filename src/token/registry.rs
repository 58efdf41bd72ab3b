//! Username to token registry.
//!
//! The registry is a single JSON document (`tokens.json`) at the storage root,
//! held in memory behind an async mutex and rewritten atomically on every
//! change. Creating a token and creating its namespace directory happen under
//! the same lock as one logical step:
//!
//! 1. Draw a token unused by any user and by any existing directory
//! 2. Create the namespace directory
//! 3. Persist the registry, removing the directory again if that fails
//!
//! so a namespace exists if and only if a token was successfully handed out.
//!
//! # Example
//!
//! ```ignore
//! use image_vault::token::TokenRegistry;
//!
//! let registry = TokenRegistry::open("./lamedb").await?;
//! let token = registry.generate("alice").await?;
//! assert_eq!(registry.retrieve("alice").await?, token);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::RegistryError;
use crate::io::{read_optional, write_atomic};

use super::ident::{is_valid_username, Token, MAX_ID_ATTEMPTS};

/// Registry file name inside the storage root.
pub const REGISTRY_FILE: &str = "tokens.json";

/// Maps usernames to tokens and owns namespace creation.
pub struct TokenRegistry {
    /// Directory holding the registry file and every namespace
    root: PathBuf,

    /// In-memory copy of the registry file
    tokens: Arc<Mutex<BTreeMap<String, Token>>>,
}

impl TokenRegistry {
    /// Open (or initialize) the registry under `root`.
    ///
    /// Creates the storage root if it does not exist yet.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let tokens = load_tokens(&root).await?;
        debug!(root = %root.display(), users = tokens.len(), "Loaded token registry");

        Ok(Self {
            root,
            tokens: Arc::new(Mutex::new(tokens)),
        })
    }

    /// Storage root this registry manages.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Issue a token for a new username and create its namespace.
    ///
    /// Fails with `UserExists` without touching anything if the username is
    /// already registered.
    pub async fn generate(&self, username: &str) -> Result<Token, RegistryError> {
        if !is_valid_username(username) {
            return Err(RegistryError::InvalidUsername {
                username: username.to_string(),
            });
        }

        let root = self.root.clone();
        let tokens = self.tokens.clone();
        let username = username.to_string();

        // Runs detached so a dropped request cannot split the directory
        // creation from the registry update.
        tokio::spawn(async move { issue_token(&root, &tokens, username).await })
            .await
            .map_err(std::io::Error::other)?
    }

    /// Look up the token of a registered username.
    pub async fn retrieve(&self, username: &str) -> Result<Token, RegistryError> {
        let tokens = self.tokens.lock().await;
        tokens
            .get(username)
            .cloned()
            .ok_or_else(|| RegistryError::UserNotFound {
                username: username.to_string(),
            })
    }

    /// Snapshot of every registered username and token.
    pub async fn entries(&self) -> BTreeMap<String, Token> {
        self.tokens.lock().await.clone()
    }

    /// Number of registered users.
    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.lock().await.is_empty()
    }
}

async fn issue_token(
    root: &Path,
    tokens: &Mutex<BTreeMap<String, Token>>,
    username: String,
) -> Result<Token, RegistryError> {
    let mut tokens = tokens.lock().await;

    if tokens.contains_key(&username) {
        return Err(RegistryError::UserExists { username });
    }

    let token = draw_token(root, &tokens).await?;

    let namespace_dir = root.join(token.as_str());
    tokio::fs::create_dir(&namespace_dir).await?;

    let mut next = tokens.clone();
    next.insert(username.clone(), token.clone());

    if let Err(e) = persist_tokens(root, &next).await {
        error!(
            username = %username,
            error = %e,
            "Failed to persist token registry, rolling back namespace"
        );
        if let Err(cleanup) = tokio::fs::remove_dir(&namespace_dir).await {
            error!(
                path = %namespace_dir.display(),
                error = %cleanup,
                "Failed to remove namespace after registry rollback"
            );
        }
        return Err(e);
    }

    *tokens = next;
    info!(username = %username, "Generated token");

    Ok(token)
}

/// Draw a token no user holds and no directory under `root` is named after.
async fn draw_token(
    root: &Path,
    tokens: &BTreeMap<String, Token>,
) -> Result<Token, RegistryError> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate = Token::random();
        if tokens.values().any(|t| t == &candidate) {
            continue;
        }
        if !tokio::fs::try_exists(root.join(candidate.as_str())).await? {
            return Ok(candidate);
        }
    }
    Err(RegistryError::Exhausted {
        attempts: MAX_ID_ATTEMPTS,
    })
}

/// Read the registry file, treating a missing file as empty.
pub async fn load_tokens(root: &Path) -> Result<BTreeMap<String, Token>, RegistryError> {
    match read_optional(&root.join(REGISTRY_FILE)).await? {
        Some(data) => Ok(serde_json::from_slice(&data)?),
        None => Ok(BTreeMap::new()),
    }
}

async fn persist_tokens(root: &Path, tokens: &BTreeMap<String, Token>) -> Result<(), RegistryError> {
    let data = serde_json::to_vec_pretty(tokens)?;
    write_atomic(&root.join(REGISTRY_FILE), &data).await?;
    Ok(())
}
