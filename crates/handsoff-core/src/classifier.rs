//! K-nearest-neighbor classifier over cosine similarity.
//!
//! Stores every training embedding with its label and classifies a probe by
//! majority vote of the `k` most similar examples. Confidence is the vote
//! share of each label.

use crate::types::{Embedding, Label, Prediction};
use thiserror::Error;

pub const DEFAULT_K: usize = 3;

#[derive(Error, Debug, PartialEq)]
pub enum ClassifierError {
    #[error("no training examples have been added")]
    Empty,
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A stored (embedding, label) pair.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub embedding: Embedding,
    pub label: Label,
}

/// In-memory KNN classifier. Examples are never individually removed.
#[derive(Debug)]
pub struct KnnClassifier {
    k: usize,
    examples: Vec<TrainingExample>,
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            examples: Vec::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Store a labeled example. All examples must share one dimension.
    pub fn add_example(&mut self, embedding: Embedding, label: Label) -> Result<(), ClassifierError> {
        if let Some(first) = self.examples.first() {
            if first.embedding.dim() != embedding.dim() {
                return Err(ClassifierError::DimensionMismatch {
                    expected: first.embedding.dim(),
                    actual: embedding.dim(),
                });
            }
        }
        self.examples.push(TrainingExample { embedding, label });
        Ok(())
    }

    /// Classify `probe` by majority vote among its nearest neighbors.
    ///
    /// `k` is clamped to the number of stored examples. Ties go to the label
    /// listed first in [`Label::ALL`].
    pub fn predict_class(&self, probe: &Embedding) -> Result<Prediction, ClassifierError> {
        let first = self.examples.first().ok_or(ClassifierError::Empty)?;
        if first.embedding.dim() != probe.dim() {
            return Err(ClassifierError::DimensionMismatch {
                expected: first.embedding.dim(),
                actual: probe.dim(),
            });
        }

        let mut scored: Vec<(f32, Label)> = self
            .examples
            .iter()
            .map(|ex| (probe.similarity(&ex.embedding), ex.label))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let k = self.k.min(scored.len());
        let mut votes = [0usize; Label::ALL.len()];
        for (_, label) in &scored[..k] {
            votes[label.index()] += 1;
        }

        let mut label = Label::ALL[0];
        for candidate in Label::ALL {
            if votes[candidate.index()] > votes[label.index()] {
                label = candidate;
            }
        }

        let k = k as f32;
        Ok(Prediction::new(
            label,
            votes[Label::NotTouching.index()] as f32 / k,
            votes[Label::Touching.index()] as f32 / k,
        ))
    }

    pub fn example_count(&self, label: Label) -> usize {
        self.examples.iter().filter(|ex| ex.label == label).count()
    }

    pub fn total_examples(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.examples.clear();
    }
}
