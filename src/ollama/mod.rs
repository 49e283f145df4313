//! Ollama HTTP API: text generation and embeddings.

pub mod client;
mod types;

pub use client::{Embedder, Generator, OllamaClient, OllamaError};
