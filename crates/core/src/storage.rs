//! Per-file embeddings and metadata blobs, keyed by SHA-256 of the canonical
//! path (C7).

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::handler::Matrix;
use crate::npy;
use crate::repository::Repository;

pub struct BlobStore {
    embeddings_dir: std::path::PathBuf,
    metadata_dir: std::path::PathBuf,
}

/// `sha256(utf8(canonical_path))` as lowercase hex.
pub fn blob_key(canonical_path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_path.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

impl BlobStore {
    pub fn new(repo: &Repository) -> Self {
        Self { embeddings_dir: repo.embeddings_dir(), metadata_dir: repo.metadata_dir() }
    }

    fn embeddings_path(&self, key: &str) -> std::path::PathBuf {
        self.embeddings_dir.join(format!("{key}.npy"))
    }

    fn metadata_path(&self, key: &str) -> std::path::PathBuf {
        self.metadata_dir.join(format!("{key}.json"))
    }

    pub fn save_embeddings(&self, canonical_path: &Path, matrix: &Matrix) -> Result<()> {
        let key = blob_key(canonical_path);
        std::fs::create_dir_all(&self.embeddings_dir)?;
        std::fs::write(self.embeddings_path(&key), npy::write_npy(matrix))?;
        Ok(())
    }

    pub fn save_metadata(&self, canonical_path: &Path, value: &serde_json::Value) -> Result<()> {
        let key = blob_key(canonical_path);
        std::fs::create_dir_all(&self.metadata_dir)?;
        let pretty = serde_json::to_string_pretty(value)?;
        std::fs::write(self.metadata_path(&key), pretty)?;
        Ok(())
    }

    pub fn get_embeddings(&self, canonical_path: &Path) -> Result<Option<Matrix>> {
        let key = blob_key(canonical_path);
        let path = self.embeddings_path(&key);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Ok(Some(npy::read_npy(&bytes)?))
    }

    pub fn get_metadata(&self, canonical_path: &Path) -> Result<Option<serde_json::Value>> {
        let key = blob_key(canonical_path);
        let path = self.metadata_path(&key);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Remove both siblings for `canonical_path`, if present.
    pub fn delete(&self, canonical_path: &Path) -> Result<()> {
        let key = blob_key(canonical_path);
        let emb = self.embeddings_path(&key);
        let meta = self.metadata_path(&key);
        if emb.is_file() {
            std::fs::remove_file(emb)?;
        }
        if meta.is_file() {
            std::fs::remove_file(meta)?;
        }
        Ok(())
    }

    /// Sum of file sizes under `embeddings/` and `metadata/`. Deliberately
    /// excludes the SQL catalog file, matching the source this is grounded
    /// on (see open question 3 in the design notes).
    pub fn storage_size(&self) -> u64 {
        [&self.embeddings_dir, &self.metadata_dir]
            .iter()
            .map(|dir| dir_size(dir))
            .sum()
    }
}

fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_embeddings_and_metadata() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let store = BlobStore::new(&repo);

        let file = tmp.path().join("hello.txt");
        std::fs::write(&file, "alpha beta gamma").unwrap();
        let canonical = file.canonicalize().unwrap();

        let matrix: Matrix = vec![vec![1.0, 2.0, 3.0]];
        store.save_embeddings(&canonical, &matrix).unwrap();
        assert_eq!(store.get_embeddings(&canonical).unwrap(), Some(matrix));

        let meta = serde_json::json!({"chunks": ["alpha beta gamma"]});
        store.save_metadata(&canonical, &meta).unwrap();
        assert_eq!(store.get_metadata(&canonical).unwrap(), Some(meta));
    }

    #[test]
    fn missing_blobs_are_none() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let store = BlobStore::new(&repo);
        let fake = tmp.path().join("ghost.txt");
        assert_eq!(store.get_embeddings(&fake).unwrap(), None);
        assert_eq!(store.get_metadata(&fake).unwrap(), None);
    }

    #[test]
    fn delete_removes_both_siblings() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let store = BlobStore::new(&repo);

        let file = tmp.path().join("hello.txt");
        std::fs::write(&file, "x").unwrap();
        let canonical = file.canonicalize().unwrap();

        store.save_embeddings(&canonical, &vec![vec![1.0]]).unwrap();
        store.save_metadata(&canonical, &serde_json::json!({})).unwrap();
        store.delete(&canonical).unwrap();

        assert_eq!(store.get_embeddings(&canonical).unwrap(), None);
        assert_eq!(store.get_metadata(&canonical).unwrap(), None);
    }

    #[test]
    fn storage_size_excludes_the_catalog_db() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let store = BlobStore::new(&repo);
        std::fs::write(repo.index_db_path(), vec![0u8; 1000]).unwrap();
        assert_eq!(store.storage_size(), 0);
    }
}
