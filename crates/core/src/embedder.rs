//! Text and image embedding capabilities (C5): external model wrappers behind
//! a small trait boundary, plus a dependency-free stand-in used for
//! development and tests.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{FilexError, Result};

/// Produces dense vectors from text. Batch embedding is the preferred path;
/// callers without a true batch API fall back to repeated `embed` calls.
pub trait TextEmbedder: Send + Sync {
    fn dim(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Produces dense vectors from images, plus a cross-modal text encoder that
/// shares the image embedding space so a text query can retrieve images.
pub trait ImageEmbedder: Send + Sync {
    fn dim(&self) -> usize;

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>>;

    fn embed_batch_images(&self, paths: &[&Path]) -> Result<Vec<Vec<f32>>> {
        paths.iter().map(|p| self.embed_image(p)).collect()
    }

    /// Embed text into the same space as `embed_image`, for cross-modal search.
    fn embed_text_as_image(&self, text: &str) -> Result<Vec<f32>>;
}

/// Derives a fixed-dimension float vector from a seeded hash of the input
/// bytes, L2-normalized. Deterministic and dependency-light: it exists so
/// the rest of the pipeline can be exercised end-to-end without a real model
/// runtime, the same role a dummy embedder plays in this lineage's other
/// pipelines.
fn hash_embed(seed: &[u8], dim: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dim);
    let mut counter: u32 = 0;
    while out.len() < dim {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks(4) {
            if out.len() >= dim {
                break;
            }
            let mut buf = [0u8; 4];
            buf[..chunk.len()].copy_from_slice(chunk);
            let as_u32 = u32::from_le_bytes(buf);
            // Map into [-1, 1).
            out.push((as_u32 as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        counter += 1;
    }

    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-8 {
        for v in out.iter_mut() {
            *v /= norm;
        }
    }
    out
}

pub struct HashingTextEmbedder {
    dim: usize,
}

impl HashingTextEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for HashingTextEmbedder {
    fn default() -> Self {
        Self::new(768)
    }
}

impl TextEmbedder for HashingTextEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(FilexError::InvalidArgument("text must not be empty".into()));
        }
        Ok(hash_embed(text.as_bytes(), self.dim))
    }
}

pub struct HashingImageEmbedder {
    dim: usize,
}

impl HashingImageEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for HashingImageEmbedder {
    fn default() -> Self {
        Self::new(512)
    }
}

impl ImageEmbedder for HashingImageEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        let bytes = std::fs::read(path)?;
        Ok(hash_embed(&bytes, self.dim))
    }

    fn embed_text_as_image(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(FilexError::InvalidArgument("text must not be empty".into()));
        }
        Ok(hash_embed(text.as_bytes(), self.dim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_is_deterministic_and_unit_norm() {
        let e = HashingTextEmbedder::new(64);
        let a = e.embed("hello world").unwrap();
        let b = e.embed("hello world").unwrap();
        assert_eq!(a, b);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_text_is_invalid_argument() {
        let e = HashingTextEmbedder::default();
        assert!(matches!(e.embed(""), Err(FilexError::InvalidArgument(_))));
    }

    #[test]
    fn batch_matches_per_item() {
        let e = HashingTextEmbedder::new(32);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = e.embed_batch(&texts).unwrap();
        assert_eq!(batch[0], e.embed("a").unwrap());
        assert_eq!(batch[1], e.embed("b").unwrap());
    }
}
