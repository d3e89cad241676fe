//! In-memory dual vector index (C9): dense matrices + parallel metadata,
//! one pair per modality, with incremental add/remove and cosine search.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FilexError, Result};
use crate::handler::Matrix;
use crate::npy;
use crate::repository::Repository;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorKind {
    Text,
    Image,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorMeta {
    pub file_path: String,
    pub file_name: String,
    pub chunk_index: usize,
    pub chunk_text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchResult {
    pub file_path: String,
    pub file_name: String,
    pub chunk_index: usize,
    pub chunk_text: String,
    pub similarity: f32,
}

struct Store {
    matrix: Matrix,
    meta: Vec<VectorMeta>,
    index_path: PathBuf,
    metadata_path: PathBuf,
}

impl Store {
    fn load(index_dir: &Path, stem: &str) -> Store {
        let index_path = index_dir.join(format!("{stem}_index.npy"));
        let metadata_path = index_dir.join(format!("{stem}_metadata.json"));

        let loaded = (|| -> Result<(Matrix, Vec<VectorMeta>)> {
            if !index_path.is_file() || !metadata_path.is_file() {
                return Ok((Vec::new(), Vec::new()));
            }
            let matrix = npy::read_npy(&std::fs::read(&index_path)?)?;
            let meta_text = std::fs::read_to_string(&metadata_path)?;
            let meta: Vec<VectorMeta> = serde_json::from_str(&meta_text)?;
            Ok((matrix, meta))
        })();

        let (matrix, meta) = match loaded {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, stem, "failed to load vector index, starting fresh");
                (Vec::new(), Vec::new())
            }
        };

        Store { matrix, meta, index_path, metadata_path }
    }

    /// Write tempfile, then rename, so a crash never leaves a half-written
    /// sidecar visible to the next load.
    fn flush(&self) -> Result<()> {
        if self.matrix.is_empty() {
            if self.index_path.is_file() {
                std::fs::remove_file(&self.index_path)?;
            }
            if self.metadata_path.is_file() {
                std::fs::remove_file(&self.metadata_path)?;
            }
            return Ok(());
        }

        let index_tmp = self.index_path.with_extension("npy.tmp");
        std::fs::write(&index_tmp, npy::write_npy(&self.matrix))?;
        std::fs::rename(&index_tmp, &self.index_path)?;

        let meta_tmp = self.metadata_path.with_extension("json.tmp");
        std::fs::write(&meta_tmp, serde_json::to_string_pretty(&self.meta)?)?;
        std::fs::rename(&meta_tmp, &self.metadata_path)?;
        Ok(())
    }
}

pub struct VectorIndex {
    text: RwLock<Store>,
    image: RwLock<Store>,
}

impl VectorIndex {
    pub fn load(repo: &Repository) -> VectorIndex {
        let dir = repo.index_dir();
        VectorIndex {
            text: RwLock::new(Store::load(&dir, "search")),
            image: RwLock::new(Store::load(&dir, "image_search")),
        }
    }

    fn store(&self, kind: VectorKind) -> &RwLock<Store> {
        match kind {
            VectorKind::Text => &self.text,
            VectorKind::Image => &self.image,
        }
    }

    /// Remove, then append: idempotent by construction.
    pub fn add_file_embeddings(
        &self,
        kind: VectorKind,
        file_path: &Path,
        chunks: &[String],
        vectors: &Matrix,
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(FilexError::InvalidArgument(format!(
                "chunks and embeddings count mismatch: {} vs {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let file_path_str = file_path.to_string_lossy().to_string();
        let file_name =
            file_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

        let lock = self.store(kind);
        self.remove_file_embeddings_locked(lock, &file_path_str)?;

        let mut store = lock.write().expect("vector index lock poisoned");
        if !vectors.is_empty() {
            let new_cols = vectors[0].len();
            if !store.matrix.is_empty() {
                let existing_cols = store.matrix[0].len();
                if new_cols != existing_cols {
                    return Err(FilexError::InvalidArgument(format!(
                        "embedding dimension mismatch: expected {existing_cols}, got {new_cols}"
                    )));
                }
            }
            for (i, (chunk, vector)) in chunks.iter().zip(vectors.iter()).enumerate() {
                store.matrix.push(vector.clone());
                store.meta.push(VectorMeta {
                    file_path: file_path_str.clone(),
                    file_name: file_name.clone(),
                    chunk_index: i,
                    chunk_text: chunk.clone(),
                });
            }
        }
        store.flush()
    }

    pub fn remove_file_embeddings(&self, kind: Option<VectorKind>, file_path: &Path) -> Result<()> {
        let file_path_str = file_path.to_string_lossy().to_string();
        match kind {
            Some(k) => self.remove_file_embeddings_locked(self.store(k), &file_path_str),
            None => {
                self.remove_file_embeddings_locked(&self.text, &file_path_str)?;
                self.remove_file_embeddings_locked(&self.image, &file_path_str)
            }
        }
    }

    fn remove_file_embeddings_locked(&self, lock: &RwLock<Store>, file_path: &str) -> Result<()> {
        let mut store = lock.write().expect("vector index lock poisoned");
        let keep: Vec<usize> = store
            .meta
            .iter()
            .enumerate()
            .filter(|(_, m)| m.file_path != file_path)
            .map(|(i, _)| i)
            .collect();

        if keep.len() == store.meta.len() {
            return Ok(());
        }

        store.meta = keep.iter().map(|&i| store.meta[i].clone()).collect();
        store.matrix = keep.iter().map(|&i| store.matrix[i].clone()).collect();
        store.flush()
    }

    /// Cosine search against one or both kinds. A zero-norm query or an
    /// empty index yields an empty result for that kind, never an error.
    pub fn search(
        &self,
        top_k: usize,
        text_query: Option<&[f32]>,
        image_query: Option<&[f32]>,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(FilexError::InvalidArgument("top_k must be positive".into()));
        }

        let mut results = Vec::new();
        if let Some(q) = text_query {
            results.extend(self.search_one(&self.text, q));
        }
        if let Some(q) = image_query {
            results.extend(self.search_one(&self.image, q));
        }

        results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    /// Current row counts `(text, image)`, for stats surfaces.
    pub fn row_counts(&self) -> (usize, usize) {
        let text = self.text.read().expect("vector index lock poisoned").matrix.len();
        let image = self.image.read().expect("vector index lock poisoned").matrix.len();
        (text, image)
    }

    fn search_one(&self, lock: &RwLock<Store>, query: &[f32]) -> Vec<SearchResult> {
        let store = lock.read().expect("vector index lock poisoned");
        if store.matrix.is_empty() {
            return Vec::new();
        }
        if store.matrix[0].len() != query.len() {
            return Vec::new();
        }

        let query_norm = l2_norm(query);
        if query_norm == 0.0 {
            return Vec::new();
        }
        let normalized_query: Vec<f32> = query.iter().map(|v| v / query_norm).collect();

        store
            .matrix
            .iter()
            .zip(store.meta.iter())
            .map(|(row, meta)| {
                let row_norm = l2_norm(row) + 1e-8;
                let similarity: f32 =
                    row.iter().zip(normalized_query.iter()).map(|(a, b)| (a / row_norm) * b).sum();
                SearchResult {
                    file_path: meta.file_path.clone(),
                    file_name: meta.file_name.clone(),
                    chunk_index: meta.chunk_index,
                    chunk_text: meta.chunk_text.clone(),
                    similarity,
                }
            })
            .collect()
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unit_vec(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn add_then_search_finds_exact_match() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let index = VectorIndex::load(&repo);

        index
            .add_file_embeddings(
                VectorKind::Text,
                Path::new("/tmp/a.txt"),
                &["alpha".to_string()],
                &vec![unit_vec(4, 0)],
            )
            .unwrap();
        index
            .add_file_embeddings(
                VectorKind::Text,
                Path::new("/tmp/b.txt"),
                &["beta".to_string()],
                &vec![unit_vec(4, 1)],
            )
            .unwrap();

        let results = index.search(1, Some(&unit_vec(4, 1)), None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_path, "/tmp/b.txt");
        assert!(results[0].similarity > 0.9999);
    }

    #[test]
    fn add_is_idempotent() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let index = VectorIndex::load(&repo);

        let path = Path::new("/tmp/a.txt");
        let chunks = vec!["alpha".to_string(), "beta".to_string()];
        let vectors = vec![unit_vec(4, 0), unit_vec(4, 1)];

        index.add_file_embeddings(VectorKind::Text, path, &chunks, &vectors).unwrap();
        index.add_file_embeddings(VectorKind::Text, path, &chunks, &vectors).unwrap();

        let results = index.search(10, Some(&unit_vec(4, 0)), None).unwrap();
        let count_for_a = results.iter().filter(|r| r.file_path == "/tmp/a.txt").count();
        assert_eq!(count_for_a, 2);
    }

    #[test]
    fn remove_when_absent_is_noop() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let index = VectorIndex::load(&repo);
        assert!(index.remove_file_embeddings(Some(VectorKind::Text), Path::new("/tmp/ghost.txt")).is_ok());
    }

    #[test]
    fn top_k_zero_is_invalid_argument() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let index = VectorIndex::load(&repo);
        assert!(matches!(index.search(0, Some(&[1.0]), None), Err(FilexError::InvalidArgument(_))));
    }

    #[test]
    fn dimension_mismatch_query_yields_empty_not_error() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let index = VectorIndex::load(&repo);
        index
            .add_file_embeddings(VectorKind::Text, Path::new("/tmp/a.txt"), &["a".to_string()], &vec![unit_vec(4, 0)])
            .unwrap();
        let results = index.search(10, Some(&unit_vec(8, 0)), None).unwrap();
        assert!(results.is_empty());
    }
}
