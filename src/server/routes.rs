//! Router configuration for the image API.
//!
//! # Route Structure
//!
//! ```text
//! /health                                              - Health check
//! /imageapi/generate-token/{username}/                 - GET
//! /imageapi/retrieve-token/{username}/                 - GET
//! /imageapi/token/{token}/upload-image/                - POST (multipart)
//! /imageapi/token/{token}/get-image/{image_id}/        - GET
//! /imageapi/token/{token}/list-images/                 - GET
//! /imageapi/token/{token}/update-image/{image_id}/     - PUT (multipart)
//! /imageapi/token/{token}/delete-image/{image_id}/     - DELETE
//! ```
//!
//! The token in the path is the only credential, so there is no separate
//! authentication layer.
//!
//! # Example
//!
//! ```ignore
//! use image_vault::server::{create_router, RouterConfig};
//! use image_vault::service::ImageService;
//!
//! let service = ImageService::open("./lamedb").await?;
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://photos.example.org".to_string()]);
//!
//! let router = create_router(service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    delete_image_handler, generate_token_handler, get_image_handler, health_handler,
    list_images_handler, retrieve_token_handler, update_image_handler, upload_image_handler,
    AppState,
};
use crate::service::ImageService;

/// Default cap on request bodies: 20 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Settings applied when assembling the image API router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Origins browsers may call from; `None` accepts every origin
    pub cors_origins: Option<Vec<String>>,

    /// Wrap the router in a `TraceLayer`
    pub enable_tracing: bool,

    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Open CORS, request tracing on, bodies capped at
    /// [`DEFAULT_MAX_UPLOAD_BYTES`].
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Restrict cross-origin callers to `origins`. An empty list blocks them all.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Accept cross-origin requests from anywhere.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Toggle per-request spans.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Set the request body cap.
    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Assemble the image API over `service`.
///
/// Every image route sits under `/imageapi/token/{token}/`. The body limit
/// applies to all routes; multipart handlers see a 413 once it is exceeded.
pub fn create_router(service: ImageService, config: RouterConfig) -> Router {
    let app_state = AppState::new(service);
    let cors = cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/imageapi/generate-token/{username}/",
            get(generate_token_handler),
        )
        .route(
            "/imageapi/retrieve-token/{username}/",
            get(retrieve_token_handler),
        )
        .route(
            "/imageapi/token/{token}/upload-image/",
            post(upload_image_handler),
        )
        .route(
            "/imageapi/token/{token}/get-image/{image_id}/",
            get(get_image_handler),
        )
        .route(
            "/imageapi/token/{token}/list-images/",
            get(list_images_handler),
        )
        .route(
            "/imageapi/token/{token}/update-image/{image_id}/",
            put(update_image_handler),
        )
        .route(
            "/imageapi/token/{token}/delete-image/{image_id}/",
            delete(delete_image_handler),
        )
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Browser access policy for the image API.
fn cors_layer(config: &RouterConfig) -> CorsLayer {
    let policy = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => policy.allow_origin(Any),
        Some(origins) if origins.is_empty() => policy,
        Some(origins) => policy.allow_origin(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>(),
        ),
    }
}

// =============================================================================
// Tests
// =============================================================================
