//! Access tokens, image identifiers, and the username registry.
//!
//! - [`Token`] / [`ImageId`]: validated identifier newtypes
//! - [`TokenRegistry`]: issues tokens and creates the matching namespaces

mod ident;
mod registry;

pub use ident::{
    generate_unique, is_valid_username, random_ident, ImageId, Token, ID_ALPHABET, IMAGE_ID_LEN,
    MAX_ID_ATTEMPTS, MAX_USERNAME_LEN, TOKEN_LEN,
};
pub use registry::{load_tokens, TokenRegistry, REGISTRY_FILE};
