//! # Image Vault
//!
//! Token-scoped image storage over HTTP.
//!
//! A client registers a username and receives an opaque token. Every image
//! operation is addressed by that token and stays inside the token's own
//! namespace on disk. Images are stored gzip-compressed and served back
//! decompressed as a stream.
//!
//! ## Features
//!
//! - **Token namespaces**: one directory per token, no cross-token access
//! - **Format gate**: only JPEG, PNG and GIF are accepted, sniffed from content
//! - **Compressed at rest**: blobs are gzip-compressed, streamed out on read
//! - **Crash-safe writes**: every file is replaced through an atomic rename
//! - **Offline audit**: `image-vault check [--repair]` reconciles disk state
//!
//! ## Architecture
//!
//! - [`token`] - Token and image id types, username registry
//! - [`store`] - Per-namespace catalogs and compressed blobs
//! - [`service`] - Access facade that validates tokens and ids
//! - [`server`] - Axum-based HTTP server and routes
//! - [`mod@format`] - Image type sniffing
//! - [`io`] - Atomic file replacement
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use image_vault::{create_router, ImageService, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ImageService::open("./lamedb").await?;
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod server;
pub mod service;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, ServeConfig};
pub use error::{ErrorKind, RegistryError, ServiceError, StoreError};
pub use format::{sniff, ImageKind};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use service::ImageService;
pub use store::{audit, repair, AuditReport, ContentStore, ImageReader, StoredImage};
pub use token::{ImageId, Token, TokenRegistry};
