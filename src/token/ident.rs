//! Random identifiers for tokens and images.
//!
//! Both identifiers are drawn uniformly from the URL-safe base64 alphabet using
//! the operating system's CSPRNG. Uniqueness is not left to probability:
//! callers pass a predicate describing which values are taken, and
//! [`generate_unique`] resamples until it finds a free one or gives up after
//! [`MAX_ID_ATTEMPTS`] draws.

use std::fmt;

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Symbols identifiers are drawn from.
pub const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Length of an access token.
pub const TOKEN_LEN: usize = 10;

/// Length of an image id.
pub const IMAGE_ID_LEN: usize = 4;

/// Upper bound on resampling before an id space is considered exhausted.
pub const MAX_ID_ATTEMPTS: usize = 1000;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 64;

// =============================================================================
// Generation
// =============================================================================

/// Draw a random identifier of `len` symbols.
pub fn random_ident(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Draw identifiers until `is_taken` rejects none of them.
///
/// Returns `None` if every one of [`MAX_ID_ATTEMPTS`] draws was taken.
pub fn generate_unique<F>(len: usize, mut is_taken: F) -> Option<String>
where
    F: FnMut(&str) -> bool,
{
    (0..MAX_ID_ATTEMPTS)
        .map(|_| random_ident(len))
        .find(|candidate| !is_taken(candidate))
}

fn is_ident(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| ID_ALPHABET.contains(&b))
}

/// Check a username against `[A-Za-z0-9_]+`.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

// =============================================================================
// Token
// =============================================================================

/// Opaque access token. Also the name of the owner's namespace directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Accept `value` only if it has the exact shape of a token.
    pub fn parse(value: &str) -> Option<Self> {
        is_ident(value, TOKEN_LEN).then(|| Self(value.to_string()))
    }

    /// Draw a single token without any uniqueness check.
    pub fn random() -> Self {
        Self(random_ident(TOKEN_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ImageId
// =============================================================================

/// Image identifier, unique within one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    /// Draw an id not yet present according to `is_taken`.
    pub fn generate<F>(is_taken: F) -> Option<Self>
    where
        F: FnMut(&str) -> bool,
    {
        generate_unique(IMAGE_ID_LEN, is_taken).map(Self)
    }

    /// Accept `value` only if it has the exact shape of an image id.
    pub fn parse(value: &str) -> Option<Self> {
        is_ident(value, IMAGE_ID_LEN).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
