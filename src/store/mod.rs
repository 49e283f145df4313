//! Persisted embedding index: documents, their vectors, and exact cosine search.

pub mod build;
pub mod records;

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("index I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt index file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("embedding has {got} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{documents} documents but {embeddings} embeddings")]
    CountMismatch { documents: usize, embeddings: usize },

    #[error(
        "index was built with embedding model '{index}', but '{configured}' is configured. Rebuild the index or set EMBEDDING_MODEL={index}"
    )]
    ModelMismatch { index: String, configured: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    document: Document,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VectorStore {
    model: String,
    dimensions: usize,
    entries: Vec<Entry>,
}

impl VectorStore {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            dimensions: 0,
            entries: Vec::new(),
        }
    }

    /// Loads `<dir>/index.json`, or `None` when no index has been saved yet.
    pub fn open(dir: &Path) -> Result<Option<Self>, StoreError> {
        let path = dir.join(INDEX_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let store: Self =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), documents = store.len(), "index loaded");
        Ok(Some(store))
    }

    /// Writes the index atomically: a temp file in `dir`, then a rename.
    pub fn save(&self, dir: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(dir).map_err(io_err(dir))?;
        let path = dir.join(INDEX_FILE);
        let tmp = dir.join(format!("{INDEX_FILE}.tmp"));

        let json = serde_json::to_vec(self).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        fs::write(&tmp, json).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))?;
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ensure_model(&self, configured: &str) -> Result<(), StoreError> {
        if self.model != configured {
            return Err(StoreError::ModelMismatch {
                index: self.model.clone(),
                configured: configured.to_string(),
            });
        }
        Ok(())
    }

    /// Appends documents with their embeddings. The first non-empty add fixes
    /// the dimensionality; later adds must match it.
    pub fn add(
        &mut self,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), StoreError> {
        if documents.len() != embeddings.len() {
            return Err(StoreError::CountMismatch {
                documents: documents.len(),
                embeddings: embeddings.len(),
            });
        }

        let expected = if self.dimensions == 0 {
            embeddings.first().map_or(0, Vec::len)
        } else {
            self.dimensions
        };
        if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                got: bad.len(),
            });
        }

        self.dimensions = expected;
        self.entries.extend(
            documents
                .into_iter()
                .zip(embeddings)
                .map(|(document, embedding)| Entry {
                    document,
                    embedding,
                }),
        );
        Ok(())
    }

    /// Top-`k` documents by cosine similarity to `query`, best first.
    /// Equal scores keep index order.
    pub fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query, &entry.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredDocument {
                document: self.entries[i].document.clone(),
                score,
            })
            .collect())
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

/// Zero vectors score 0 against everything.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}

#[cfg(test)]
pub(crate) fn doc(content: &str) -> Document {
    Document {
        content: content.to_string(),
        metadata: Metadata {
            name: content.split_whitespace().next().unwrap_or_default().to_string(),
            ..Metadata::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    fn sample_store() -> VectorStore {
        let mut store = VectorStore::new("test-model");
        store
            .add(
                vec![doc("napa fever"), doc("seclo acid"), doc("napa extra")],
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.8, 0.6]],
            )
            .unwrap();
        store
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        assert!(approx_eq(cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0));
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn search_ranks_by_similarity() {
        let store = sample_store();
        let results = store.similarity_search(&[1.0, 0.0], 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.content, "napa fever");
        assert_eq!(results[1].document.content, "napa extra");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn search_k_larger_than_store_returns_all() {
        let store = sample_store();
        assert_eq!(store.similarity_search(&[1.0, 1.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn search_with_zero_k_or_empty_store_is_empty() {
        assert!(sample_store().similarity_search(&[1.0, 0.0], 0).unwrap().is_empty());
        assert!(
            VectorStore::new("m")
                .similarity_search(&[1.0, 0.0], 3)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut store = VectorStore::new("m");
        store
            .add(
                vec![doc("first"), doc("second")],
                vec![vec![1.0, 0.0], vec![2.0, 0.0]],
            )
            .unwrap();
        let results = store.similarity_search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].document.content, "first");
        assert_eq!(results[1].document.content, "second");
    }

    #[test]
    fn search_rejects_wrong_query_dimensions() {
        let result = sample_store().similarity_search(&[1.0, 0.0, 0.0], 1);
        assert!(matches!(
            result,
            Err(StoreError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        ));
    }

    #[test]
    fn add_rejects_mismatched_dimensions() {
        let mut store = sample_store();
        let result = store.add(vec![doc("x")], vec![vec![1.0, 2.0, 3.0]]);
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn add_rejects_count_mismatch() {
        let mut store = VectorStore::new("m");
        let result = store.add(vec![doc("a"), doc("b")], vec![vec![1.0]]);
        assert!(matches!(
            result,
            Err(StoreError::CountMismatch {
                documents: 2,
                embeddings: 1
            })
        ));
    }

    #[test]
    fn save_then_open_restores_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = sample_store();
        store.save(dir.path()).unwrap();

        let loaded = VectorStore::open(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model(), "test-model");
        assert_eq!(loaded.dimensions(), 2);
        assert!(!dir.path().join("index.json.tmp").exists());
    }

    #[test]
    fn open_missing_index_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VectorStore::open(&dir.path().join("nothing")).unwrap().is_none());
    }

    #[test]
    fn open_corrupt_index_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), "{not json").unwrap();
        assert!(matches!(
            VectorStore::open(dir.path()),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn model_mismatch_is_reported() {
        let store = VectorStore::new("mistral");
        assert!(store.ensure_model("mistral").is_ok());
        let err = store.ensure_model("nomic-embed-text").unwrap_err();
        assert!(err.to_string().contains("EMBEDDING_MODEL=mistral"));
    }
}
