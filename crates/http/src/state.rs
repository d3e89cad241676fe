//! Shared application state (A2): one controller serving every repository the
//! HTTP surface is asked about, plus the registered-folders list and the two
//! embedder capabilities used to turn a search query into vectors.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::Json;
use filex_core::embedder::{ImageEmbedder, TextEmbedder};
use filex_core::IndexingController;

use crate::folders::RegisteredFolders;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<IndexingController>,
    pub text_embedder: Arc<dyn TextEmbedder>,
    pub image_embedder: Arc<dyn ImageEmbedder>,
    pub folders: Arc<RwLock<RegisteredFolders>>,
    pub folders_path: Arc<PathBuf>,
}

pub type ApiError = (StatusCode, Json<serde_json::Value>);

/// Map a [`FilexError`] to the `{detail}`-shaped JSON body this lineage's
/// handlers return, per A1.
pub fn to_api_error(err: filex_core::FilexError) -> ApiError {
    use filex_core::FilexError::*;
    let status = match &err {
        NotFound(_) => StatusCode::NOT_FOUND,
        InvalidArgument(_) | UnsupportedType(_) | DocxParseError(_) => StatusCode::BAD_REQUEST,
        Conflict(_) => StatusCode::CONFLICT,
        DecodeError(_) | PersistenceError(_) | TransientLoadError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({ "detail": err.to_string() })))
}

pub fn bad_request(detail: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "detail": detail.into() })))
}

pub fn not_found(detail: impl Into<String>) -> ApiError {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "detail": detail.into() })))
}
