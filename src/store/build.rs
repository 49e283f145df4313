use std::path::Path;

use tracing::{info, warn};

use super::{Document, StoreError, VectorStore};
use crate::ollama::{Embedder, OllamaError};

pub const DEFAULT_CHUNK_SIZE: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] OllamaError),

    #[error("chunk size must be at least 1")]
    InvalidChunkSize,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BuildReport {
    pub total: usize,
    pub already_embedded: usize,
    pub added: usize,
}

/// Embeds `documents` into the index at `index_dir`, resuming after the
/// documents an earlier run already saved. The index is saved after every
/// chunk, so an interrupted build loses at most one chunk of work.
///
/// Resumption is positional: the data must be loaded in the same order on
/// every run.
pub async fn build_index(
    embedder: &impl Embedder,
    documents: Vec<Document>,
    index_dir: &Path,
    chunk_size: usize,
) -> Result<BuildReport, BuildError> {
    if chunk_size == 0 {
        return Err(BuildError::InvalidChunkSize);
    }

    let mut store = match VectorStore::open(index_dir)? {
        Some(store) => {
            store.ensure_model(embedder.model())?;
            info!(documents = store.len(), "loaded existing index");
            store
        }
        None => {
            info!(dir = %index_dir.display(), "creating new index");
            VectorStore::new(embedder.model())
        }
    };

    let total = documents.len();
    let already_embedded = store.len();
    if already_embedded > total {
        warn!(
            indexed = already_embedded,
            total, "index holds more documents than the source data; nothing to add"
        );
    }

    let mut added = 0;
    let remaining: Vec<Document> = documents.into_iter().skip(already_embedded).collect();
    for chunk in remaining.chunks(chunk_size) {
        let start = already_embedded + added;
        info!(from = start, to = start + chunk.len(), "embedding chunk");

        let texts: Vec<String> = chunk.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder.embed(&texts).await?;
        store.add(chunk.to_vec(), embeddings)?;
        store.save(index_dir)?;

        added += chunk.len();
        info!(saved = store.len(), "saved progress");
    }

    Ok(BuildReport {
        total,
        already_embedded,
        added,
    })
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use crate::ollama::{Embedder, OllamaError};

    /// Deterministic embeddings: a letter histogram over `a`..`z`, so texts
    /// sharing words land close together.
    pub struct MockEmbedder {
        pub model: String,
        pub batches: Mutex<Vec<usize>>,
        pub fail_after: Option<usize>,
    }

    impl MockEmbedder {
        pub fn new() -> Self {
            Self {
                model: "mock-embed".into(),
                batches: Mutex::new(Vec::new()),
                fail_after: None,
            }
        }

        pub fn failing_after(batches: usize) -> Self {
            Self {
                fail_after: Some(batches),
                ..Self::new()
            }
        }

        pub fn vector(text: &str) -> Vec<f32> {
            let mut v = vec![0.0; 26];
            for c in text.to_ascii_lowercase().chars() {
                if c.is_ascii_lowercase() {
                    v[(c as u8 - b'a') as usize] += 1.0;
                }
            }
            v
        }
    }

    impl Embedder for MockEmbedder {
        fn model(&self) -> &str {
            &self.model
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError> {
            let mut batches = self.batches.lock().unwrap();
            if self.fail_after.is_some_and(|n| batches.len() >= n) {
                return Err(OllamaError::Overloaded);
            }
            batches.push(texts.len());
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }
    }
}
