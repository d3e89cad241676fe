//! File handlers and router (C6): dispatch a file to the right pipeline and
//! emit chunks + vectors.

use crate::chunker::Chunker;
use crate::embedder::{ImageEmbedder, TextEmbedder};
use crate::error::Result;
use crate::extractor;
use crate::metadata::FileMetadata;

pub type Matrix = Vec<Vec<f32>>;

/// Result of routing one file through a handler.
pub struct ProcessResult {
    pub chunks: Vec<String>,
    pub embeddings: Matrix,
    pub processed: bool,
    pub reason: Option<String>,
}

/// Shared capability of every handler in the router's chain.
pub trait FileHandler: Send + Sync {
    fn can_handle(&self, meta: &FileMetadata) -> bool;
    fn process(&self, meta: &FileMetadata) -> Result<ProcessResult>;
}

/// Extracts text, chunks it, and embeds every chunk in one batch call.
pub struct TextFileHandler {
    chunker: Box<dyn Chunker>,
    embedder: std::sync::Arc<dyn TextEmbedder>,
}

impl TextFileHandler {
    pub fn new(chunker: Box<dyn Chunker>, embedder: std::sync::Arc<dyn TextEmbedder>) -> Self {
        Self { chunker, embedder }
    }
}

impl FileHandler for TextFileHandler {
    fn can_handle(&self, meta: &FileMetadata) -> bool {
        meta.is_text_type && matches!(meta.extension.as_str(), "txt" | "docx")
    }

    fn process(&self, meta: &FileMetadata) -> Result<ProcessResult> {
        let text = extractor::extract_text(&meta.canonical_path)?;
        let chunks = self.chunker.chunk(&text);
        let embeddings = self.embedder.embed_batch(&chunks)?;
        Ok(ProcessResult { chunks, embeddings, processed: true, reason: None })
    }
}

/// A single chunk equal to the file path, embedded into the image space.
pub struct ImageFileHandler {
    embedder: std::sync::Arc<dyn ImageEmbedder>,
}

impl ImageFileHandler {
    pub fn new(embedder: std::sync::Arc<dyn ImageEmbedder>) -> Self {
        Self { embedder }
    }
}

impl FileHandler for ImageFileHandler {
    fn can_handle(&self, meta: &FileMetadata) -> bool {
        meta.is_image_type && matches!(meta.extension.as_str(), "png" | "jpg" | "jpeg")
    }

    fn process(&self, meta: &FileMetadata) -> Result<ProcessResult> {
        // Preserved from the source this is modeled on: the sole "chunk" for
        // an image is its own file path, not a caption.
        let chunk_text = meta.canonical_path.display().to_string();
        let vector = self.embedder.embed_image(&meta.canonical_path)?;
        Ok(ProcessResult {
            chunks: vec![chunk_text],
            embeddings: vec![vector],
            processed: true,
            reason: None,
        })
    }
}

/// Always accepts; marks the file as not processed and why.
pub struct DefaultFileHandler;

impl FileHandler for DefaultFileHandler {
    fn can_handle(&self, _meta: &FileMetadata) -> bool {
        true
    }

    fn process(&self, meta: &FileMetadata) -> Result<ProcessResult> {
        Ok(ProcessResult {
            chunks: Vec::new(),
            embeddings: Vec::new(),
            processed: false,
            reason: Some(format!("unsupported file type: .{}", meta.extension)),
        })
    }
}

/// Owns an ordered handler list and delegates to the first whose
/// `can_handle` returns true. `DefaultFileHandler` must be last.
pub struct HandlerRouter {
    handlers: Vec<Box<dyn FileHandler>>,
}

impl HandlerRouter {
    pub fn new(text: TextFileHandler, image: ImageFileHandler) -> Self {
        Self {
            handlers: vec![Box::new(text), Box::new(image), Box::new(DefaultFileHandler)],
        }
    }

    pub fn route(&self, meta: &FileMetadata) -> Result<ProcessResult> {
        for handler in &self.handlers {
            if handler.can_handle(meta) {
                return handler.process(meta);
            }
        }
        // Unreachable in practice: DefaultFileHandler always accepts.
        Ok(ProcessResult {
            chunks: Vec::new(),
            embeddings: Vec::new(),
            processed: false,
            reason: Some("no handler accepted this file".to_string()),
        })
    }

    /// Process a batch of files sequentially. Per-path failures become a
    /// result record carrying an error message; the batch never aborts.
    pub fn process_files(
        &self,
        metas: &[FileMetadata],
    ) -> Vec<(FileMetadata, std::result::Result<ProcessResult, String>)> {
        metas
            .iter()
            .map(|m| (m.clone(), self.route(m).map_err(|e| e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::FixedSizeChunker;
    use crate::embedder::{HashingImageEmbedder, HashingTextEmbedder};
    use std::fs;
    use tempfile::tempdir;

    fn router() -> HandlerRouter {
        let chunker = Box::new(FixedSizeChunker::new(512, 0).unwrap());
        let text_embedder = std::sync::Arc::new(HashingTextEmbedder::new(16));
        let image_embedder = std::sync::Arc::new(HashingImageEmbedder::new(8));
        HandlerRouter::new(TextFileHandler::new(chunker, text_embedder), ImageFileHandler::new(image_embedder))
    }

    #[test]
    fn text_file_is_processed() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "alpha beta gamma").unwrap();
        let meta = FileMetadata::from_path(&path).unwrap();

        let result = router().route(&meta).unwrap();
        assert!(result.processed);
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.embeddings.len(), 1);
        assert_eq!(result.embeddings[0].len(), 16);
    }

    #[test]
    fn image_file_chunk_text_is_path() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("a.png");
        fs::write(&path, b"\x89PNG fake").unwrap();
        let meta = FileMetadata::from_path(&path).unwrap();

        let result = router().route(&meta).unwrap();
        assert!(result.processed);
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0], meta.canonical_path.display().to_string());
    }

    #[test]
    fn unsupported_file_is_not_processed_but_no_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("a.bin");
        fs::write(&path, b"\x00\x01").unwrap();
        let meta = FileMetadata::from_path(&path).unwrap();

        let result = router().route(&meta).unwrap();
        assert!(!result.processed);
        assert!(result.reason.is_some());
    }
}
