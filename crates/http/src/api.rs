//! HTTP handlers implementing the surface of §6. Each handler is a thin
//! adapter from JSON in/out onto `filex-core`'s `RepositoryManager` /
//! `IndexingController`; none of the indexing or search logic lives here.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Json, Path as AxumPath, State};
use axum::response::IntoResponse;
use base64::Engine;
use serde::{Deserialize, Serialize};

use filex_core::embedder::{ImageEmbedder, TextEmbedder};
use filex_core::{FilexError, RepositoryManager};

use crate::state::{bad_request, not_found, to_api_error, AppState};

/// Extensions the HTTP indexer assumes when the caller's request omits one.
const DEFAULT_HTTP_EXTENSIONS: &[&str] = &["txt", "docx", "png", "jpg", "jpeg"];

fn resolve_manager(
    state: &AppState,
    repo_path: &str,
) -> Result<Arc<RepositoryManager>, axum::response::Response> {
    state
        .controller
        .manager_for(Path::new(repo_path))
        .map_err(|e| to_api_error(e).into_response())
}

// ---------------------------------------------------------------------------
// GET / — API info
// ---------------------------------------------------------------------------

pub async fn api_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "filex",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "local content-addressed semantic search",
        "endpoints": [
            "/api/repositories",
            "/api/registered-folders",
            "/api/index",
            "/api/search",
            "/api/stats",
            "/api/progress/{repo_id}",
        ],
    }))
}

// ---------------------------------------------------------------------------
// GET /api/repositories — stubbed per design note 5
// ---------------------------------------------------------------------------

pub async fn api_repositories() -> impl IntoResponse {
    Json(serde_json::json!({ "repositories": [], "count": 0 }))
}

// ---------------------------------------------------------------------------
// Registered folders
// ---------------------------------------------------------------------------

pub async fn get_registered_folders(State(state): State<AppState>) -> impl IntoResponse {
    let folders = state.folders.read().expect("registered folders lock poisoned");
    Json(serde_json::json!({ "folders": folders.folders, "count": folders.folders.len() }))
}

#[derive(Deserialize)]
pub struct RegisterFolderRequest {
    path: String,
}

pub async fn register_folder(
    State(state): State<AppState>,
    Json(req): Json<RegisterFolderRequest>,
) -> impl IntoResponse {
    let path = PathBuf::from(&req.path);
    let canonical = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => return not_found(format!("path does not exist: {}", req.path)).into_response(),
    };
    if !canonical.is_dir() {
        return bad_request(format!("not a directory: {}", req.path)).into_response();
    }

    let mut folders = state.folders.write().expect("registered folders lock poisoned");
    folders.register(canonical.to_string_lossy().to_string());
    if let Err(e) = folders.save(&state.folders_path) {
        tracing::warn!(error = %e, "failed to persist registered folders");
    }
    Json(serde_json::json!({ "folders": folders.folders, "count": folders.folders.len() }))
        .into_response()
}

pub async fn unregister_folder(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> impl IntoResponse {
    let mut folders = state.folders.write().expect("registered folders lock poisoned");
    folders.unregister(&path);
    if let Err(e) = folders.save(&state.folders_path) {
        tracing::warn!(error = %e, "failed to persist registered folders");
    }
    Json(serde_json::json!({ "folders": folders.folders, "count": folders.folders.len() }))
}

// ---------------------------------------------------------------------------
// POST /api/index
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct IndexRequest {
    repo_path: String,
    path: Option<String>,
    #[serde(default)]
    force: bool,
    #[serde(default = "default_true")]
    recursive: bool,
    extensions: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

pub async fn start_index(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> impl IntoResponse {
    let repo_root = PathBuf::from(&req.repo_path);
    let target = req.path.clone().map(PathBuf::from);

    let extensions: HashSet<String> = req
        .extensions
        .unwrap_or_else(|| DEFAULT_HTTP_EXTENSIONS.iter().map(|s| s.to_string()).collect())
        .into_iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let is_single_file = target.as_ref().is_some_and(|p| p.is_file());

    let submission = if is_single_file {
        state.controller.submit_index_file(&repo_root, target.unwrap(), req.force)
    } else {
        state.controller.submit_index_directory(
            &repo_root,
            target,
            req.recursive,
            Some(extensions),
            req.force,
        )
    };

    match submission {
        Ok(repo_key) => Json(serde_json::json!({
            "repo_id": repo_key.to_string_lossy(),
            "status": "starting",
        }))
        .into_response(),
        Err(e) => to_api_error(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /api/search
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SearchRequest {
    repo_path: String,
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    include_images: bool,
    #[serde(default = "default_max_image_size_mb")]
    max_image_size_mb: f64,
}

fn default_top_k() -> usize {
    10
}

fn default_max_image_size_mb() -> f64 {
    5.0
}

#[derive(Serialize)]
struct SearchResultOut {
    file_path: String,
    file_name: String,
    chunk_index: usize,
    chunk_text: String,
    similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_data_url: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    let manager = match resolve_manager(&state, &req.repo_path) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let text_query = match state.text_embedder.embed(&req.query) {
        Ok(v) => v,
        Err(e) => return to_api_error(e).into_response(),
    };

    let image_query = if req.include_images {
        match state.image_embedder.embed_text_as_image(&req.query) {
            Ok(v) => Some(v),
            Err(e) => return to_api_error(e).into_response(),
        }
    } else {
        None
    };

    let results = match manager.vector_index.search(req.top_k, Some(&text_query), image_query.as_deref())
    {
        Ok(r) => r,
        Err(e) => return to_api_error(e).into_response(),
    };

    let cap_bytes = (req.max_image_size_mb * 1024.0 * 1024.0) as u64;
    let out: Vec<SearchResultOut> = results
        .into_iter()
        .map(|r| {
            // Per design note 6: an image "chunk" stores its own file path as
            // chunk_text, not a caption — that equality is how we recognize it.
            let image_data_url = if req.include_images && r.chunk_text == r.file_path {
                inline_image_if_small(&r.file_path, cap_bytes)
            } else {
                None
            };
            SearchResultOut {
                file_path: r.file_path,
                file_name: r.file_name,
                chunk_index: r.chunk_index,
                chunk_text: r.chunk_text,
                similarity: r.similarity,
                image_data_url,
            }
        })
        .collect();

    Json(serde_json::json!({ "results": out, "count": out.len() })).into_response()
}

fn inline_image_if_small(file_path: &str, cap_bytes: u64) -> Option<String> {
    let path = Path::new(file_path);
    let meta = std::fs::metadata(path).ok()?;
    if meta.len() > cap_bytes {
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    let mime = match path.extension().map(|e| e.to_string_lossy().to_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Some(format!("data:{mime};base64,{encoded}"))
}

// ---------------------------------------------------------------------------
// POST /api/stats
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct StatsRequest {
    repo_path: String,
}

pub async fn stats(State(state): State<AppState>, Json(req): Json<StatsRequest>) -> impl IntoResponse {
    let manager = match resolve_manager(&state, &req.repo_path) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let entries = match manager.catalog.get_all_entries() {
        Ok(e) => e,
        Err(e) => return to_api_error(e).into_response(),
    };

    let (text_rows, image_rows) = manager.vector_index.row_counts();
    let storage_bytes = manager.blob_store.storage_size();
    let eligible = eligible_file_survey(manager.repository.work_tree_root());

    Json(serde_json::json!({
        "index": {
            "indexed_files": entries.len(),
        },
        "search": {
            "text_vectors": text_rows,
            "image_vectors": image_rows,
        },
        "storage": {
            "storage_size_bytes": storage_bytes,
        },
        "eligible_files": eligible,
    }))
    .into_response()
}

/// Count files under `dir` (recursively, skipping `.filex`) by whether their
/// extension falls in the default indexable set.
fn eligible_file_survey(dir: &Path) -> serde_json::Value {
    let mut total = 0usize;
    let mut by_extension: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.components().any(|c| c.as_os_str() == filex_core::repository::REPO_DIR_NAME) {
                continue;
            }
            let Ok(file_type) = entry.file_type() else { continue };
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let ext = path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
                if DEFAULT_HTTP_EXTENSIONS.contains(&ext.as_str()) {
                    total += 1;
                    *by_extension.entry(ext).or_insert(0) += 1;
                }
            }
        }
    }

    serde_json::json!({ "total": total, "by_extension": by_extension })
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

pub async fn get_progress(
    State(state): State<AppState>,
    AxumPath(repo_id): AxumPath<String>,
) -> impl IntoResponse {
    match state.controller.progress(Path::new(&repo_id)) {
        Some(record) => Json(serde_json::to_value(record).expect("TaskRecord always serializes"))
            .into_response(),
        None => not_found(format!("no task for {repo_id}")).into_response(),
    }
}

pub async fn delete_progress(
    State(state): State<AppState>,
    AxumPath(repo_id): AxumPath<String>,
) -> impl IntoResponse {
    match state.controller.clear_progress(Path::new(&repo_id)) {
        Ok(()) => Json(serde_json::json!({ "cleared": true })).into_response(),
        Err(e @ FilexError::Conflict(_)) => to_api_error(e).into_response(),
        Err(e) => to_api_error(e).into_response(),
    }
}
