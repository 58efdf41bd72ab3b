use thiserror::Error;

/// Stable classification shared by every error the service can return.
///
/// The HTTP layer maps each kind to one status code, so API consumers can
/// branch on it without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The token does not own a namespace
    InvalidToken,
    /// Unknown username, unknown image id, or an empty catalog
    NotFound,
    /// Duplicate username or duplicate filename
    Conflict,
    /// The uploaded bytes are not a supported image
    UnrecognizedFileType,
    /// Malformed username, filename, or request
    InvalidRequest,
    /// Catalog and blobs disagree; surfaced, never auto-corrected
    Inconsistent,
    /// Disk, serialization, or task failure
    Internal,
}

impl ErrorKind {
    /// Machine-readable identifier used in error bodies.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidToken => "invalid_token",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::UnrecognizedFileType => "unrecognized_file_type",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Inconsistent => "inconsistent",
            ErrorKind::Internal => "internal_error",
        }
    }
}

/// Errors raised by the token registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Username already has a token
    #[error("User exists: {username}")]
    UserExists { username: String },

    /// Username was never registered
    #[error("User not found: {username}")]
    UserNotFound { username: String },

    /// Username contains characters outside [A-Za-z0-9_] or is too long
    #[error("Invalid username: {username:?}")]
    InvalidUsername { username: String },

    /// Could not draw an unused token within the retry bound
    #[error("No unused token found after {attempts} attempts")]
    Exhausted { attempts: usize },

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry file could not be read or written as JSON
    #[error("Registry file error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::UserExists { .. } => ErrorKind::Conflict,
            RegistryError::UserNotFound { .. } => ErrorKind::NotFound,
            RegistryError::InvalidUsername { .. } => ErrorKind::InvalidRequest,
            RegistryError::Exhausted { .. } => ErrorKind::Inconsistent,
            RegistryError::Io(_) | RegistryError::Serde(_) => ErrorKind::Internal,
        }
    }
}

/// Errors raised by the content store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No namespace exists for the token
    #[error("Token not recognized")]
    InvalidToken,

    /// Image id is not in the catalog
    #[error("Image not found: {image_id}")]
    ImageNotFound { image_id: String },

    /// Namespace has no images yet
    #[error("No images stored for this token")]
    EmptyCatalog,

    /// A blob for this filename already exists in the namespace
    #[error("File exists: {filename}")]
    FileExists { filename: String },

    /// Sniffer did not recognize the content as JPEG, PNG or GIF
    #[error("Unrecognized file type")]
    UnrecognizedFileType,

    /// Filename would escape the namespace or collide with reserved names
    #[error("Invalid filename: {filename:?}")]
    InvalidFilename { filename: String },

    /// Catalog and blobs disagree
    #[error("Inconsistent namespace state: {0}")]
    Inconsistent(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog file could not be read or written as JSON
    #[error("Catalog file error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidToken => ErrorKind::InvalidToken,
            StoreError::ImageNotFound { .. } | StoreError::EmptyCatalog => ErrorKind::NotFound,
            StoreError::FileExists { .. } => ErrorKind::Conflict,
            StoreError::UnrecognizedFileType => ErrorKind::UnrecognizedFileType,
            StoreError::InvalidFilename { .. } => ErrorKind::InvalidRequest,
            StoreError::Inconsistent(_) => ErrorKind::Inconsistent,
            StoreError::Io(_) | StoreError::Serde(_) => ErrorKind::Internal,
        }
    }
}

/// Errors returned by the access facade
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Registry(e) => e.kind(),
            ServiceError::Store(e) => e.kind(),
        }
    }
}
