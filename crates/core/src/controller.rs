//! Concurrent indexing controller (C11): per-repository task table, at-most-
//! one-job-per-repo admission, and a small bounded worker pool.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{error, info};

use crate::error::{FilexError, Result};
use crate::handler::HandlerRouter;
use crate::manager::RepositoryManager;
use crate::repository::Repository;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Starting,
    Indexing,
    Completed,
    Error,
}

impl TaskStatus {
    fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub indexed: usize,
    pub total: usize,
    pub errors: usize,
    pub message: String,
    pub error: Option<String>,
}

impl TaskRecord {
    fn starting() -> Self {
        TaskRecord {
            status: TaskStatus::Starting,
            indexed: 0,
            total: 0,
            errors: 0,
            message: "starting".to_string(),
            error: None,
        }
    }
}

/// Builds a fresh `HandlerRouter` for a repository manager the controller
/// hasn't seen before. Callers supply this closure once, capturing whichever
/// embedder/chunker configuration is currently selected (e.g. by `--model`).
pub type RouterFactory = Arc<dyn Fn() -> HandlerRouter + Send + Sync>;

/// Long-running background indexing, keyed by canonical `.filex` path.
pub struct IndexingController {
    tasks: Mutex<HashMap<PathBuf, TaskRecord>>,
    managers: DashMap<PathBuf, Arc<RepositoryManager>>,
    router_factory: RouterFactory,
    pool: rayon::ThreadPool,
}

impl IndexingController {
    pub fn new(router_factory: RouterFactory, workers: usize) -> IndexingController {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("filex-indexer-{i}"))
            .build()
            .expect("failed to build indexing worker pool");
        IndexingController {
            tasks: Mutex::new(HashMap::new()),
            managers: DashMap::new(),
            router_factory,
            pool,
        }
    }

    /// Locate or create the repository rooted at/above `repo_path`, caching
    /// its manager so repeated jobs and searches against the same repo reuse
    /// one in-memory vector index rather than reloading it from disk each
    /// time. Exposed publicly so HTTP/CLI surfaces can resolve a manager for
    /// search and stats without going through a job submission.
    pub fn manager_for(&self, repo_path: &Path) -> Result<Arc<RepositoryManager>> {
        let repo = match Repository::locate(repo_path) {
            Some(r) => r,
            None => Repository::create(repo_path)?,
        };
        let key = repo.repo_path.clone();
        if let Some(existing) = self.managers.get(&key) {
            return Ok(existing.clone());
        }
        let manager = Arc::new(RepositoryManager::new(repo, (self.router_factory)())?);
        self.managers.insert(key, manager.clone());
        Ok(manager)
    }

    fn admit(&self, key: &Path) -> Result<()> {
        let mut tasks = self.tasks.lock().expect("task table lock poisoned");
        if let Some(existing) = tasks.get(key) {
            if !existing.status.is_terminal() {
                return Err(FilexError::Conflict(format!(
                    "indexing already in progress for {}: {}/{} done",
                    key.display(),
                    existing.indexed,
                    existing.total
                )));
            }
        }
        tasks.insert(key.to_path_buf(), TaskRecord::starting());
        Ok(())
    }

    fn set_status(&self, key: &Path, status: TaskStatus, message: &str, error: Option<String>) {
        let mut tasks = self.tasks.lock().expect("task table lock poisoned");
        let entry = tasks.entry(key.to_path_buf()).or_insert_with(TaskRecord::starting);
        entry.status = status;
        entry.message = message.to_string();
        entry.error = error;
    }

    fn complete(&self, key: &Path, indexed: usize, total: usize, errors: usize) {
        let mut tasks = self.tasks.lock().expect("task table lock poisoned");
        tasks.insert(
            key.to_path_buf(),
            TaskRecord {
                status: TaskStatus::Completed,
                indexed,
                total,
                errors,
                message: "completed".to_string(),
                error: None,
            },
        );
    }

    /// Admit and dispatch a directory-indexing job. Returns the canonical
    /// `.filex` path identifying the task, immediately, before the job runs.
    pub fn submit_index_directory(
        self: &Arc<Self>,
        repo_path: &Path,
        target: Option<PathBuf>,
        recursive: bool,
        extensions: Option<HashSet<String>>,
        force: bool,
    ) -> Result<PathBuf> {
        let manager = self.manager_for(repo_path)?;
        let key = manager.repository.repo_path.clone();
        self.admit(&key)?;

        let controller = self.clone();
        let job_key = key.clone();
        self.pool.spawn(move || {
            controller.set_status(&job_key, TaskStatus::Indexing, "indexing", None);
            let dir = target.unwrap_or_else(|| manager.repository.work_tree_root().to_path_buf());
            match manager.index_directory(&dir, recursive, extensions.as_ref(), force) {
                Ok(outcome) => {
                    info!(
                        repo = %job_key.display(),
                        indexed = outcome.indexed,
                        total = outcome.total,
                        errors = outcome.errors,
                        "indexing job completed"
                    );
                    controller.complete(&job_key, outcome.indexed, outcome.total, outcome.errors);
                }
                Err(e) => {
                    error!(repo = %job_key.display(), error = %e, "indexing job failed");
                    controller.set_status(&job_key, TaskStatus::Error, "failed", Some(e.to_string()));
                }
            }
        });

        Ok(key)
    }

    /// Admit and dispatch a single-file indexing job.
    pub fn submit_index_file(
        self: &Arc<Self>,
        repo_path: &Path,
        file: PathBuf,
        force: bool,
    ) -> Result<PathBuf> {
        let manager = self.manager_for(repo_path)?;
        let key = manager.repository.repo_path.clone();
        self.admit(&key)?;

        let controller = self.clone();
        let job_key = key.clone();
        self.pool.spawn(move || {
            controller.set_status(&job_key, TaskStatus::Indexing, "indexing", None);
            match manager.index_file(&file, force) {
                Ok(result) => {
                    controller.complete(&job_key, if result.indexed { 1 } else { 0 }, 1, 0);
                }
                Err(e) => {
                    error!(repo = %job_key.display(), error = %e, "indexing job failed");
                    controller.set_status(&job_key, TaskStatus::Error, "failed", Some(e.to_string()));
                }
            }
        });

        Ok(key)
    }

    pub fn progress(&self, repo_key: &Path) -> Option<TaskRecord> {
        self.tasks.lock().expect("task table lock poisoned").get(repo_key).cloned()
    }

    /// Clear a terminal task record. Fails with `Conflict` if the task is
    /// still starting or indexing; clearing an absent or already-cleared key
    /// is a no-op success.
    pub fn clear_progress(&self, repo_key: &Path) -> Result<()> {
        let mut tasks = self.tasks.lock().expect("task table lock poisoned");
        if let Some(record) = tasks.get(repo_key) {
            if !record.status.is_terminal() {
                return Err(FilexError::Conflict(
                    "cannot clear a non-terminal indexing task".to_string(),
                ));
            }
        }
        tasks.remove(repo_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::FixedSizeChunker;
    use crate::embedder::{HashingImageEmbedder, HashingTextEmbedder};
    use crate::handler::{ImageFileHandler, TextFileHandler};
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn test_router() -> HandlerRouter {
        let chunker = Box::new(FixedSizeChunker::new(512, 0).unwrap());
        let text_embedder = Arc::new(HashingTextEmbedder::new(16));
        let image_embedder = Arc::new(HashingImageEmbedder::new(8));
        HandlerRouter::new(TextFileHandler::new(chunker, text_embedder), ImageFileHandler::new(image_embedder))
    }

    fn wait_for_terminal(controller: &IndexingController, key: &Path) -> TaskRecord {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(record) = controller.progress(key) {
                if record.status == TaskStatus::Completed || record.status == TaskStatus::Error {
                    return record;
                }
            }
            if Instant::now() > deadline {
                panic!("indexing job did not reach a terminal state in time");
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn index_directory_job_completes() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha beta").unwrap();
        fs::write(tmp.path().join("b.txt"), "gamma delta").unwrap();

        let controller = Arc::new(IndexingController::new(Arc::new(test_router), 2));
        let key = controller.submit_index_directory(tmp.path(), None, true, None, false).unwrap();

        let record = wait_for_terminal(&controller, &key);
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.indexed, 2);
        assert_eq!(record.total, 2);
    }

    #[test]
    fn second_submit_before_completion_conflicts() {
        let tmp = tempdir().unwrap();
        for i in 0..20 {
            fs::write(tmp.path().join(format!("f{i}.txt")), "alpha beta gamma delta").unwrap();
        }

        let controller = Arc::new(IndexingController::new(Arc::new(test_router), 1));
        let key = controller.submit_index_directory(tmp.path(), None, true, None, false).unwrap();

        let second = controller.submit_index_directory(tmp.path(), None, true, None, false);
        assert!(matches!(second, Err(FilexError::Conflict(_))));

        wait_for_terminal(&controller, &key);
    }

    #[test]
    fn clear_progress_removes_terminal_task() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();

        let controller = Arc::new(IndexingController::new(Arc::new(test_router), 1));
        let key = controller.submit_index_directory(tmp.path(), None, true, None, false).unwrap();
        wait_for_terminal(&controller, &key);

        controller.clear_progress(&key).unwrap();
        assert!(controller.progress(&key).is_none());
    }

    #[test]
    fn clear_progress_on_unknown_key_is_ok() {
        let controller = IndexingController::new(Arc::new(test_router), 1);
        assert!(controller.clear_progress(Path::new("/tmp/does/not/exist/.filex")).is_ok());
    }
}
