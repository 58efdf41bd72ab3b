//! HTTP request handlers for the image API.
//!
//! # Endpoints
//!
//! - `GET /imageapi/generate-token/{username}/` - Register a username
//! - `GET /imageapi/retrieve-token/{username}/` - Look up a username's token
//! - `POST /imageapi/token/{token}/upload-image/` - Upload an image
//! - `GET /imageapi/token/{token}/get-image/{image_id}/` - Download an image
//! - `GET /imageapi/token/{token}/list-images/` - List filenames and ids
//! - `PUT /imageapi/token/{token}/update-image/{image_id}/` - Replace an image
//! - `DELETE /imageapi/token/{token}/delete-image/{image_id}/` - Delete an image
//! - `GET /health` - Health check endpoint

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{ErrorKind, ServiceError};
use crate::service::ImageService;
use crate::token::ImageId;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the image service.
///
/// Handlers receive it through `State`.
pub struct AppState {
    pub service: Arc<ImageService>,
}

impl AppState {
    pub fn new(service: ImageService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for token routes: `/imageapi/{action}-token/{username}/`
#[derive(Debug, Deserialize)]
pub struct UsernamePath {
    pub username: String,
}

/// Path parameters for routes scoped to a token only.
#[derive(Debug, Deserialize)]
pub struct TokenPath {
    pub token: String,
}

/// Path parameters for routes addressing one image.
#[derive(Debug, Deserialize)]
pub struct ImagePath {
    pub token: String,
    pub image_id: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON body shared by every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_token")
    pub error: String,

    /// Explanation for humans
    pub message: String,

    /// Numeric HTTP status, repeated in the body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of both token endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Body of a successful upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "File ID")]
    pub file_id: String,
}

/// Body of a successful update or delete.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageStatusResponse {
    /// "updated" or "deleted"
    pub status: String,

    #[serde(rename = "File ID")]
    pub file_id: String,
}

/// Body of the listing endpoint: filename to image id.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub images: BTreeMap<String, String>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Status code for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidToken => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::UnrecognizedFileType => StatusCode::NOT_ACCEPTABLE,
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Inconsistent | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Log an error response by severity and build its JSON body.
///
/// - 5xx at ERROR
/// - 404 and 401 at DEBUG (common and expected)
/// - other 4xx at WARN
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::UNAUTHORIZED {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Request rejected: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        error_response(status_for(kind), kind.code(), self.to_string())
    }
}

/// Errors a handler can return.
#[derive(Debug)]
pub enum HandlerError {
    /// The service rejected or failed the operation
    Service(ServiceError),

    /// The multipart body could not be read
    Multipart(MultipartError),

    /// The request carried no image where one is required
    MissingFile,

    /// A response header could not be built
    Header(String),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Service(err) => err.into_response(),
            HandlerError::Multipart(err) => {
                // Body-limit rejections carry 413, everything else is 400.
                let status = err.status();
                let error_type = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "payload_too_large"
                } else {
                    ErrorKind::InvalidRequest.code()
                };
                error_response(status, error_type, err.body_text())
            }
            HandlerError::MissingFile => error_response(
                StatusCode::BAD_REQUEST,
                ErrorKind::InvalidRequest.code(),
                "Request contains no file".to_string(),
            ),
            HandlerError::Header(message) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Internal.code(),
                message,
            ),
        }
    }
}

impl From<ServiceError> for HandlerError {
    fn from(err: ServiceError) -> Self {
        HandlerError::Service(err)
    }
}

impl From<MultipartError> for HandlerError {
    fn from(err: MultipartError) -> Self {
        HandlerError::Multipart(err)
    }
}

// =============================================================================
// Multipart
// =============================================================================

/// File taken from a multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Bytes,
}

/// Read the first field of `multipart` that carries a filename.
///
/// Fields without a filename are plain form values and are skipped. Any
/// directory part a client put in the filename is dropped.
async fn first_file(multipart: &mut Multipart) -> Result<Option<UploadedFile>, HandlerError> {
    while let Some(field) = multipart.next_field().await? {
        let Some(filename) = field.file_name().map(base_name) else {
            continue;
        };
        let content = field.bytes().await?;
        return Ok(Some(UploadedFile { filename, content }));
    }
    Ok(None)
}

fn base_name(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .to_string()
}

/// `Content-Disposition` value for serving `filename` inline.
///
/// The quoted `filename` parameter is an ASCII fallback. Names with other
/// characters also get an RFC 5987 `filename*` parameter.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if filename.is_ascii() && !filename.contains(['"', '\\']) {
        format!("inline; filename=\"{}\"", fallback)
    } else {
        format!(
            "inline; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle token generation.
///
/// # Endpoint
///
/// `GET /imageapi/generate-token/{username}/`
///
/// # Response
///
/// - `201 Created`: `{"token": "<10 chars>"}`
/// - `400 Bad Request`: Username is malformed
/// - `409 Conflict`: Username already has a token
#[axum::debug_handler]
pub async fn generate_token_handler(
    State(state): State<AppState>,
    Path(params): Path<UsernamePath>,
) -> Result<(StatusCode, Json<TokenResponse>), HandlerError> {
    let token = state.service.generate_token(&params.username).await?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token: token.to_string(),
        }),
    ))
}

/// Handle token retrieval.
///
/// # Endpoint
///
/// `GET /imageapi/retrieve-token/{username}/`
///
/// # Response
///
/// - `200 OK`: `{"token": "<10 chars>"}`
/// - `404 Not Found`: Username was never registered
#[axum::debug_handler]
pub async fn retrieve_token_handler(
    State(state): State<AppState>,
    Path(params): Path<UsernamePath>,
) -> Result<Json<TokenResponse>, HandlerError> {
    let token = state.service.retrieve_token(&params.username).await?;
    Ok(Json(TokenResponse {
        token: token.to_string(),
    }))
}

/// Handle image uploads.
///
/// # Endpoint
///
/// `POST /imageapi/token/{token}/upload-image/` with a `multipart/form-data`
/// body. Only the first file field is stored.
///
/// # Response
///
/// - `201 Created`: `{"File ID": "<4 chars>"}`
/// - `204 No Content`: The form carried no file
/// - `401 Unauthorized`: Token not recognized
/// - `406 Not Acceptable`: Not a JPEG, PNG or GIF
/// - `409 Conflict`: Filename already used under this token
#[axum::debug_handler]
pub async fn upload_image_handler(
    State(state): State<AppState>,
    Path(params): Path<TokenPath>,
    mut multipart: Multipart,
) -> Result<Response, HandlerError> {
    state.service.authorize(&params.token).await?;

    let Some(upload) = first_file(&mut multipart).await? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let image_id = state
        .service
        .put_image(&params.token, &upload.filename, upload.content)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file_id: image_id.to_string(),
        }),
    )
        .into_response())
}

/// Handle image downloads.
///
/// # Endpoint
///
/// `GET /imageapi/token/{token}/get-image/{image_id}/`
///
/// # Response
///
/// `200 OK` with the original bytes, decompressed while streaming.
///
/// # Headers
///
/// - `Content-Type: image/jpeg|image/png|image/gif`
/// - `Content-Length: <uncompressed size>`
/// - `Content-Disposition: inline; filename="<filename>"`
#[axum::debug_handler]
pub async fn get_image_handler(
    State(state): State<AppState>,
    Path(params): Path<ImagePath>,
) -> Result<Response, HandlerError> {
    let image = state
        .service
        .get_image(&params.token, &params.image_id)
        .await?;

    let disposition = HeaderValue::from_str(&content_disposition(&image.filename))
        .map_err(|e| HandlerError::Header(e.to_string()))?;

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static(image.kind.mime_type()),
        ),
        (header::CONTENT_LENGTH, HeaderValue::from(image.size)),
        (header::CONTENT_DISPOSITION, disposition),
    ];

    let body = Body::from_stream(image.reader.into_stream());
    Ok((StatusCode::OK, headers, body).into_response())
}

/// Handle image listings.
///
/// # Endpoint
///
/// `GET /imageapi/token/{token}/list-images/`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "images": { "cat.png": "Ab3_", "dog.jpg": "x-9Q" }
/// }
/// ```
///
/// `404 Not Found` if the token has no images.
#[axum::debug_handler]
pub async fn list_images_handler(
    State(state): State<AppState>,
    Path(params): Path<TokenPath>,
) -> Result<Json<ListResponse>, HandlerError> {
    let listing = state.service.list_images(&params.token).await?;
    Ok(Json(listing.into()))
}

/// Handle image replacement.
///
/// # Endpoint
///
/// `PUT /imageapi/token/{token}/update-image/{image_id}/` with a
/// `multipart/form-data` body. The image keeps its id.
///
/// # Response
///
/// - `200 OK`: `{"status": "updated", "File ID": "<id>"}`
/// - `400 Bad Request`: The form carried no file
/// - `401 Unauthorized`: Token not recognized, checked before the form is read
/// - `404 Not Found`: Unknown image id
/// - `409 Conflict`: New filename already belongs to another image
#[axum::debug_handler]
pub async fn update_image_handler(
    State(state): State<AppState>,
    Path(params): Path<ImagePath>,
    mut multipart: Multipart,
) -> Result<Json<ImageStatusResponse>, HandlerError> {
    state.service.authorize(&params.token).await?;

    let upload = first_file(&mut multipart)
        .await?
        .ok_or(HandlerError::MissingFile)?;

    state
        .service
        .update_image(
            &params.token,
            &params.image_id,
            &upload.filename,
            upload.content,
        )
        .await?;

    Ok(Json(ImageStatusResponse {
        status: "updated".to_string(),
        file_id: params.image_id,
    }))
}

/// Handle image deletion.
///
/// # Endpoint
///
/// `DELETE /imageapi/token/{token}/delete-image/{image_id}/`
///
/// # Response
///
/// - `200 OK`: `{"status": "deleted", "File ID": "<id>"}`
/// - `404 Not Found`: Unknown image id
#[axum::debug_handler]
pub async fn delete_image_handler(
    State(state): State<AppState>,
    Path(params): Path<ImagePath>,
) -> Result<Json<ImageStatusResponse>, HandlerError> {
    state
        .service
        .delete_image(&params.token, &params.image_id)
        .await?;

    Ok(Json(ImageStatusResponse {
        status: "deleted".to_string(),
        file_id: params.image_id,
    }))
}

/// Liveness probe.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Convert a listing to its wire form.
impl From<BTreeMap<String, ImageId>> for ListResponse {
    fn from(listing: BTreeMap<String, ImageId>) -> Self {
        Self {
            images: listing
                .into_iter()
                .map(|(filename, id)| (filename, id.to_string()))
                .collect(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
