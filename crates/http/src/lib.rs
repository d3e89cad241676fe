//! filex-http: the axum HTTP surface over `filex-core`, implementing the
//! endpoint table of the on-disk/HTTP design (§6): registered folders,
//! background indexing, cosine search with optional cross-modal image
//! results, and per-repository progress tracking.

pub mod api;
pub mod folders;
pub mod state;

use axum::routing::{delete, get, post};
use axum::Router;

pub use folders::{default_folders_path, RegisteredFolders};
pub use state::AppState;

/// Build the axum router implementing the full HTTP surface, ready to have
/// middleware layered on and be served.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::api_info))
        .route("/api/repositories", get(api::api_repositories))
        .route(
            "/api/registered-folders",
            get(api::get_registered_folders).post(api::register_folder),
        )
        .route("/api/registered-folders/{path}", delete(api::unregister_folder))
        .route("/api/index", post(api::start_index))
        .route("/api/search", post(api::search))
        .route("/api/stats", post(api::stats))
        .route(
            "/api/progress/{repo_id}",
            get(api::get_progress).delete(api::delete_progress),
        )
        .with_state(state)
}
