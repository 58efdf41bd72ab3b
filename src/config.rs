//! Configuration management for Image Vault.
//!
//! Settings come from command-line arguments via clap, with environment
//! variables under the `VAULT_` prefix as fallback and defaults for
//! everything optional.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use image_vault::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Check(config) => println!("Checking {}", config.storage_root.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `VAULT_HOST` - Server bind address (default: 0.0.0.0)
//! - `VAULT_PORT` - Server port (default: 8000)
//! - `VAULT_STORAGE_ROOT` - Directory holding tokens and images (default: ./lamedb)
//! - `VAULT_MAX_UPLOAD_BYTES` - Request body cap (default: 20 MiB)
//! - `VAULT_CORS_ORIGINS` - Allowed CORS origins, comma separated

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::server::DEFAULT_MAX_UPLOAD_BYTES;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default storage root.
pub const DEFAULT_STORAGE_ROOT: &str = "./lamedb";

/// Smallest accepted upload cap.
pub const MIN_UPLOAD_BYTES: usize = 1024;

/// Largest accepted upload cap. Keeps sizes within the gzip length trailer.
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Image Vault - token-scoped image storage over HTTP.
///
/// Register a username to receive a token, then upload, list, download,
/// replace and delete JPEG, PNG and GIF images under that token.
#[derive(Parser, Debug, Clone)]
#[command(name = "image-vault")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Server options used when no subcommand is given.
    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// Resolve the command to run. A bare invocation serves.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(ServeConfig),

    /// Scan a storage root for inconsistencies, optionally repairing them.
    Check(CheckConfig),
}

/// Options for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Interface to listen on.
    #[arg(long, default_value = DEFAULT_HOST, env = "VAULT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "VAULT_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Directory holding the token registry and every namespace.
    ///
    /// Created on startup if missing.
    #[arg(long, default_value = DEFAULT_STORAGE_ROOT, env = "VAULT_STORAGE_ROOT")]
    pub storage_root: PathBuf,

    /// Largest accepted request body in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "VAULT_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Comma-separated origins allowed to call the API from a browser.
    ///
    /// Omitted means any origin.
    #[arg(long, env = "VAULT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Log at debug level.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Skip the per-request `TraceLayer`.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Check value ranges, describing the first bad one.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty. Set --host or VAULT_HOST".to_string());
        }

        if self.storage_root.as_os_str().is_empty() {
            return Err(
                "storage root must not be empty. Set --storage-root or VAULT_STORAGE_ROOT"
                    .to_string(),
            );
        }

        if !(MIN_UPLOAD_BYTES..=MAX_UPLOAD_BYTES).contains(&self.max_upload_bytes) {
            return Err(format!(
                "max_upload_bytes must be between {} (1KB) and {} (1GB)",
                MIN_UPLOAD_BYTES, MAX_UPLOAD_BYTES
            ));
        }

        Ok(())
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Directory holding the token registry and every namespace.
    #[arg(long, default_value = DEFAULT_STORAGE_ROOT, env = "VAULT_STORAGE_ROOT")]
    pub storage_root: PathBuf,

    /// Apply safe repairs: recreate missing namespaces, remove orphan blobs
    /// and stale temporary files.
    #[arg(long, default_value_t = false)]
    pub repair: bool,

    /// Log at debug level.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
