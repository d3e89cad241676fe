//! Repository manager (C10): orchestrates indexing of a single file and of
//! directory trees.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use crate::catalog::{compute_file_hash, Catalog};
use crate::error::{FilexError, Result};
use crate::handler::HandlerRouter;
use crate::metadata::FileMetadata;
use crate::repository::{Repository, REPO_DIR_NAME};
use crate::storage::BlobStore;
use crate::vector_index::{VectorIndex, VectorKind};

#[derive(Clone, Debug, Serialize)]
pub struct IndexFileResult {
    pub indexed: bool,
    pub processed: bool,
    pub reason: Option<String>,
    pub num_chunks: Option<usize>,
    pub embedding_dimension: Option<usize>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct IndexDirectoryResult {
    pub total: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub error_messages: Vec<String>,
}

pub struct RepositoryManager {
    pub repository: Repository,
    pub catalog: Catalog,
    pub blob_store: BlobStore,
    pub vector_index: VectorIndex,
    pub router: HandlerRouter,
}

impl RepositoryManager {
    pub fn new(repository: Repository, router: HandlerRouter) -> Result<RepositoryManager> {
        let catalog = Catalog::open(&repository)?;
        let blob_store = BlobStore::new(&repository);
        let vector_index = VectorIndex::load(&repository);
        Ok(RepositoryManager { repository, catalog, blob_store, vector_index, router })
    }

    pub fn index_file(&self, path: &Path, force: bool) -> Result<IndexFileResult> {
        let meta = FileMetadata::from_path(path)?;

        if !self.repository.is_in_repo(&meta.canonical_path) {
            tracing::warn!(path = %meta.canonical_path.display(), "path is outside the repository's work tree");
        }

        if !force && !self.catalog.has_changed(&meta)? {
            return Ok(IndexFileResult {
                indexed: false,
                processed: false,
                reason: Some("unchanged".to_string()),
                num_chunks: None,
                embedding_dimension: None,
            });
        }

        let result = self.router.route(&meta)?;
        let hash = compute_file_hash(&meta.canonical_path)?;

        let num_chunks = if result.processed { Some(result.chunks.len() as u32) } else { None };
        let embedding_dim =
            if result.processed { result.embeddings.first().map(|r| r.len() as u32) } else { None };

        self.catalog.upsert(&meta, &hash, num_chunks, embedding_dim)?;

        if result.processed && !result.embeddings.is_empty() {
            self.blob_store.save_embeddings(&meta.canonical_path, &result.embeddings)?;
            let metadata_json = serde_json::json!({
                "file_path": meta.canonical_path.to_string_lossy(),
                "chunks": result.chunks,
                "num_chunks": result.chunks.len(),
                "embedding_dim": result.embeddings.first().map(|r| r.len()),
            });
            self.blob_store.save_metadata(&meta.canonical_path, &metadata_json)?;

            let kind = if meta.is_image_type { VectorKind::Image } else { VectorKind::Text };
            self.vector_index.add_file_embeddings(
                kind,
                &meta.canonical_path,
                &result.chunks,
                &result.embeddings,
            )?;
        }

        info!(path = %meta.canonical_path.display(), processed = result.processed, "indexed file");

        Ok(IndexFileResult {
            indexed: true,
            processed: result.processed,
            reason: result.reason,
            num_chunks: num_chunks.map(|n| n as usize),
            embedding_dimension: embedding_dim.map(|d| d as usize),
        })
    }

    pub fn index_directory(
        &self,
        dir: &Path,
        recursive: bool,
        extensions: Option<&HashSet<String>>,
        force: bool,
    ) -> Result<IndexDirectoryResult> {
        let dir = dir.canonicalize().map_err(|_| FilexError::NotFound(dir.to_path_buf()))?;
        let mut files = enumerate_files(&dir, recursive)?;
        files.sort();
        files.dedup();

        let mut outcome = IndexDirectoryResult::default();

        for file in files {
            if let Some(exts) = extensions {
                let ext = file
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if !exts.contains(&ext) {
                    continue;
                }
            }

            outcome.total += 1;
            match self.index_file(&file, force) {
                Ok(result) if result.indexed => outcome.indexed += 1,
                Ok(_) => outcome.skipped += 1,
                Err(e) => {
                    outcome.errors += 1;
                    error!(path = %file.display(), error = %e, "failed to index file");
                    outcome.error_messages.push(format!("{}: {e}", file.display()));
                }
            }
        }

        Ok(outcome)
    }
}

/// Enumerate files under `dir`, skipping any path whose components contain
/// `.filex`.
fn enumerate_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current)?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();

            if path.components().any(|c| c.as_os_str() == REPO_DIR_NAME) {
                continue;
            }

            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if recursive {
                    stack.push(path);
                }
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }

    Ok(files)
}
