//! Index catalog (C8): durable record of which files are indexed and their
//! content hash, backed by an embedded relational store.

use std::io::Read;
use std::path::Path;

use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::metadata::FileMetadata;
use crate::repository::Repository;
use crate::time_fmt;

#[derive(Clone, Debug, serde::Serialize)]
pub struct FileIndexEntry {
    pub path: String,
    pub file_hash: String,
    pub size: u64,
    pub mtime: String,
    pub indexed_at: String,
    pub extension: String,
    pub is_text: bool,
    pub num_chunks: Option<u32>,
    pub embedding_dim: Option<u32>,
}

pub struct Catalog {
    db_path: std::path::PathBuf,
}

impl Catalog {
    /// Open (and create if absent) the catalog database at
    /// `index/index.db`. A connection is opened per call throughout this
    /// type (acceptable per design; a pool is preferred for a production
    /// deployment but not required at this scale).
    pub fn open(repo: &Repository) -> Result<Catalog> {
        std::fs::create_dir_all(repo.index_dir())?;
        let db_path = repo.index_db_path();
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS file_index (
                path TEXT PRIMARY KEY,
                file_hash TEXT NOT NULL,
                size INTEGER NOT NULL,
                mtime TEXT NOT NULL,
                indexed_at TEXT NOT NULL,
                extension TEXT NOT NULL,
                is_text INTEGER NOT NULL,
                num_chunks INTEGER,
                embedding_dim INTEGER
             );
             CREATE INDEX IF NOT EXISTS idx_file_index_hash ON file_index(file_hash);
             CREATE INDEX IF NOT EXISTS idx_file_index_extension ON file_index(extension);",
        )?;
        Ok(Catalog { db_path })
    }

    fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    pub fn get_entry(&self, canonical_path: &Path) -> Result<Option<FileIndexEntry>> {
        let conn = self.connect()?;
        let path_str = canonical_path.to_string_lossy().to_string();
        let mut stmt = conn.prepare(
            "SELECT path, file_hash, size, mtime, indexed_at, extension, is_text, num_chunks, embedding_dim
             FROM file_index WHERE path = ?1",
        )?;
        let mut rows = stmt.query(params![path_str])?;
        if let Some(row) = rows.next()? {
            Ok(Some(FileIndexEntry {
                path: row.get(0)?,
                file_hash: row.get(1)?,
                size: row.get::<_, i64>(2)? as u64,
                mtime: row.get(3)?,
                indexed_at: row.get(4)?,
                extension: row.get(5)?,
                is_text: row.get::<_, i64>(6)? != 0,
                num_chunks: row.get::<_, Option<i64>>(7)?.map(|v| v as u32),
                embedding_dim: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
            }))
        } else {
            Ok(None)
        }
    }

    /// Change detection: no row → changed; size differs → changed; row mtime
    /// strictly before current mtime → changed; otherwise hash the file and
    /// compare. Hashing is deferred to last so stable files skip the read.
    pub fn has_changed(&self, meta: &FileMetadata) -> Result<bool> {
        let Some(entry) = self.get_entry(&meta.canonical_path)? else {
            return Ok(true);
        };

        if entry.size != meta.size_bytes {
            return Ok(true);
        }

        let current_mtime = time_fmt::to_iso8601(meta.mtime);
        if entry.mtime < current_mtime {
            return Ok(true);
        }

        let current_hash = compute_file_hash(&meta.canonical_path)?;
        Ok(entry.file_hash != current_hash)
    }

    pub fn upsert(
        &self,
        meta: &FileMetadata,
        file_hash: &str,
        num_chunks: Option<u32>,
        embedding_dim: Option<u32>,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO file_index
                (path, file_hash, size, mtime, indexed_at, extension, is_text, num_chunks, embedding_dim)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                meta.canonical_path.to_string_lossy().to_string(),
                file_hash,
                meta.size_bytes as i64,
                time_fmt::to_iso8601(meta.mtime),
                time_fmt::now_iso8601(),
                meta.extension,
                meta.is_text_type as i64,
                num_chunks,
                embedding_dim,
            ],
        )?;
        Ok(())
    }

    pub fn remove(&self, canonical_path: &Path) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM file_index WHERE path = ?1",
            params![canonical_path.to_string_lossy().to_string()],
        )?;
        Ok(())
    }

    pub fn get_all_entries(&self) -> Result<Vec<FileIndexEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT path, file_hash, size, mtime, indexed_at, extension, is_text, num_chunks, embedding_dim
             FROM file_index ORDER BY path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FileIndexEntry {
                path: row.get(0)?,
                file_hash: row.get(1)?,
                size: row.get::<_, i64>(2)? as u64,
                mtime: row.get(3)?,
                indexed_at: row.get(4)?,
                extension: row.get(5)?,
                is_text: row.get::<_, i64>(6)? != 0,
                num_chunks: row.get::<_, Option<i64>>(7)?.map(|v| v as u32),
                embedding_dim: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn get_indexed_files_count(&self) -> Result<usize> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM file_index", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Streamed SHA-256 of file contents, 8 KiB at a time.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unindexed_file_has_changed() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let catalog = Catalog::open(&repo).unwrap();

        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();
        let meta = FileMetadata::from_path(&file).unwrap();
        assert!(catalog.has_changed(&meta).unwrap());
    }

    #[test]
    fn upsert_then_unchanged_until_content_changes() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let catalog = Catalog::open(&repo).unwrap();

        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();
        let meta = FileMetadata::from_path(&file).unwrap();
        let hash = compute_file_hash(&file).unwrap();
        catalog.upsert(&meta, &hash, Some(1), Some(8)).unwrap();

        assert!(!catalog.has_changed(&meta).unwrap());

        std::fs::write(&file, "hello world, changed").unwrap();
        // mtime may tie on fast filesystems; size differs regardless.
        let meta2 = FileMetadata::from_path(&file).unwrap();
        assert!(catalog.has_changed(&meta2).unwrap());
    }

    #[test]
    fn remove_deletes_row() {
        let tmp = tempdir().unwrap();
        let repo = Repository::create(tmp.path()).unwrap();
        let catalog = Catalog::open(&repo).unwrap();

        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();
        let meta = FileMetadata::from_path(&file).unwrap();
        let hash = compute_file_hash(&file).unwrap();
        catalog.upsert(&meta, &hash, Some(1), Some(8)).unwrap();
        assert_eq!(catalog.get_indexed_files_count().unwrap(), 1);

        catalog.remove(&meta.canonical_path).unwrap();
        assert_eq!(catalog.get_indexed_files_count().unwrap(), 0);
    }
}
