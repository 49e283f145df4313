//! Retrieval-augmented answering: translate, retrieve, generate, translate back.

pub mod pipeline;
mod prompt;

pub use pipeline::Assistant;
