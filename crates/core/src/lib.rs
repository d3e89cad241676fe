//! filex-core: local content-addressed semantic search.
//!
//! A repository is a hidden `.filex` directory discovered by walking up from
//! a starting path, holding a SHA-256-keyed blob store, a SQLite catalog of
//! what's been indexed, and a pair of in-memory vector indices (text and
//! image) searched by cosine similarity. [`manager::RepositoryManager`] wires
//! the pipeline together for one repository; [`controller::IndexingController`]
//! runs indexing jobs in the background across many.

pub mod catalog;
pub mod chunker;
pub mod controller;
pub mod embedder;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod manager;
pub mod metadata;
pub mod npy;
pub mod repository;
pub mod storage;
pub mod time_fmt;
pub mod vector_index;

pub use controller::{IndexingController, RouterFactory, TaskRecord, TaskStatus};
pub use error::{FilexError, Result};
pub use handler::{HandlerRouter, Matrix};
pub use manager::{IndexDirectoryResult, IndexFileResult, RepositoryManager};
pub use metadata::FileMetadata;
pub use repository::Repository;
pub use vector_index::{SearchResult, VectorIndex, VectorKind};
