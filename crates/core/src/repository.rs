//! Repository locator: discovers or creates the hidden `.filex` directory and
//! exposes its canonical subpaths, mirroring how a version-control tool finds
//! its own metadata directory by walking up from a starting path.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{FilexError, Result};

pub const REPO_DIR_NAME: &str = ".filex";
pub const INDEX_DIR_NAME: &str = "index";
pub const EMBEDDINGS_DIR_NAME: &str = "embeddings";
pub const METADATA_DIR_NAME: &str = "metadata";
pub const INDEX_DB_NAME: &str = "index.db";

/// A located or freshly created `.filex` repository.
#[derive(Clone, Debug)]
pub struct Repository {
    /// Canonical path to the `.filex` directory itself.
    pub repo_path: PathBuf,
}

impl Repository {
    fn new(repo_path: PathBuf) -> Self {
        Self { repo_path }
    }

    /// Canonical path to `index/`.
    pub fn index_dir(&self) -> PathBuf {
        self.repo_path.join(INDEX_DIR_NAME)
    }

    /// Canonical path to `embeddings/`.
    pub fn embeddings_dir(&self) -> PathBuf {
        self.repo_path.join(EMBEDDINGS_DIR_NAME)
    }

    /// Canonical path to `metadata/`.
    pub fn metadata_dir(&self) -> PathBuf {
        self.repo_path.join(METADATA_DIR_NAME)
    }

    /// Canonical path to `index/index.db`.
    pub fn index_db_path(&self) -> PathBuf {
        self.index_dir().join(INDEX_DB_NAME)
    }

    /// The parent of `.filex` — the scope of files eligible for indexing.
    pub fn work_tree_root(&self) -> &Path {
        // repo_path is always `<work_tree>/.filex`, so parent always exists.
        self.repo_path.parent().unwrap_or(&self.repo_path)
    }

    /// Whether `path`'s canonical form begins with the work tree root.
    /// Any I/O error (path doesn't exist, permission denied, …) answers false.
    pub fn is_in_repo(&self, path: &Path) -> bool {
        let Ok(canonical) = path.canonicalize() else {
            return false;
        };
        canonical.starts_with(self.work_tree_root())
    }

    /// Ascend from `start` (canonicalized) until a child directory literally
    /// named `.filex` exists, stopping at the filesystem root.
    pub fn locate(start: &Path) -> Option<Repository> {
        let mut cur = start.canonicalize().ok()?;
        loop {
            let candidate = cur.join(REPO_DIR_NAME);
            if candidate.is_dir() {
                return Some(Repository::new(candidate));
            }
            match cur.parent() {
                Some(parent) => cur = parent.to_path_buf(),
                None => return None,
            }
        }
    }

    /// Materialize `.filex` and its three subdirectories under `root`,
    /// idempotently. Re-creating an existing repository is a warning, not an
    /// error.
    pub fn create(root: &Path) -> Result<Repository> {
        let root = root.canonicalize().map_err(|_| FilexError::NotFound(root.to_path_buf()))?;
        let repo_path = root.join(REPO_DIR_NAME);

        if repo_path.is_dir() {
            warn!(path = %repo_path.display(), "repository already exists");
        }

        fs::create_dir_all(&repo_path)?;
        let repo = Repository::new(repo_path);
        fs::create_dir_all(repo.index_dir())?;
        fs::create_dir_all(repo.embeddings_dir())?;
        fs::create_dir_all(repo.metadata_dir())?;

        Ok(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_locate_from_nested_child() {
        let tmp = tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let repo = Repository::create(&nested).unwrap();
        assert!(repo.index_dir().is_dir());
        assert!(repo.embeddings_dir().is_dir());
        assert!(repo.metadata_dir().is_dir());

        let child = nested.join("c");
        fs::create_dir_all(&child).unwrap();
        let found = Repository::locate(&child).expect("repository should be found");
        assert_eq!(found.repo_path, repo.repo_path);
    }

    #[test]
    fn locate_returns_none_when_absent() {
        let tmp = tempdir().unwrap();
        assert!(Repository::locate(tmp.path()).is_none());
    }

    #[test]
    fn create_is_idempotent() {
        let tmp = tempdir().unwrap();
        let first = Repository::create(tmp.path()).unwrap();
        let second = Repository::create(tmp.path()).unwrap();
        assert_eq!(first.repo_path, second.repo_path);
    }

    #[test]
    fn is_in_repo_checks_canonical_prefix() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let inside = tmp.path().join("file.txt");
        fs::write(&inside, b"hi").unwrap();
        assert!(repo.is_in_repo(&inside));

        let outside = tempdir().unwrap();
        let other_file = outside.path().join("other.txt");
        fs::write(&other_file, b"hi").unwrap();
        assert!(!repo.is_in_repo(&other_file));
    }
}
