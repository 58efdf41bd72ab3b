//! HTTP server layer for the image API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        /imageapi/...-token/{username}/                          │
//! │        /imageapi/token/{token}/...-image/[{image_id}/]          │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (multipart, streaming,   │  │ (router, CORS, body limit,  │  │
//! │  │  error mapping)          │  │  tracing)                   │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    content_disposition, delete_image_handler, generate_token_handler, get_image_handler,
    health_handler, list_images_handler, retrieve_token_handler, status_for, update_image_handler,
    upload_image_handler, AppState, ErrorResponse, HandlerError, HealthResponse, ImagePath,
    ImageStatusResponse, ListResponse, TokenPath, TokenResponse, UploadResponse, UploadedFile,
    UsernamePath,
};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
