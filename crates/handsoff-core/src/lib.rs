//! handsoff-core — Frame embeddings and touch classification.
//!
//! Uses a MobileNet feature extractor via ONNX Runtime for embeddings and a
//! cosine-similarity KNN classifier trained on two labels.

pub mod classifier;
pub mod decision;
pub mod embedder;
pub mod types;

pub use classifier::{ClassifierError, KnnClassifier};
pub use embedder::{EmbedderError, MobileNetEmbedder};
pub use types::{Embedding, Label, Prediction};

/// Default model directory: `$XDG_DATA_HOME/handsoff/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        })
        .join("handsoff/models")
}
