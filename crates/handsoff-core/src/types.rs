use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two training classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "not_touch")]
    NotTouching,
    #[serde(rename = "touched")]
    Touching,
}

impl Label {
    /// All labels, in tie-break order.
    pub const ALL: [Label; 2] = [Label::NotTouching, Label::Touching];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::NotTouching => "not_touch",
            Label::Touching => "touched",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Label::NotTouching => 0,
            Label::Touching => 1,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown label {0:?} (expected not_touch/good or touched/bad)")]
pub struct ParseLabelError(pub String);

impl FromStr for Label {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "not_touch" | "not-touch" | "good" => Ok(Label::NotTouching),
            "touched" | "touch" | "bad" => Ok(Label::Touching),
            _ => Err(ParseLabelError(s.to_string())),
        }
    }
}

/// Image embedding vector (1280-dimensional for MobileNetV2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "mobilenet_v2").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// Classifier output for a single frame. Not retained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    /// Vote share per label, indexed by [`Label::ALL`] order. Sums to 1.
    confidences: [f32; 2],
}

impl Prediction {
    /// Build a prediction from per-label scores. Scores are clamped to [0, 1].
    pub fn new(label: Label, not_touching: f32, touching: f32) -> Self {
        Self {
            label,
            confidences: [not_touching.clamp(0.0, 1.0), touching.clamp(0.0, 1.0)],
        }
    }

    /// Prediction where `label` holds `confidence` and the other label the rest.
    pub fn with_confidence(label: Label, confidence: f32) -> Self {
        let c = confidence.clamp(0.0, 1.0);
        match label {
            Label::NotTouching => Self::new(label, c, 1.0 - c),
            Label::Touching => Self::new(label, 1.0 - c, c),
        }
    }

    /// Confidence of the predicted label.
    pub fn confidence(&self) -> f32 {
        self.confidence_for(self.label)
    }

    pub fn confidence_for(&self, label: Label) -> f32 {
        self.confidences[label.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse_aliases() {
        assert_eq!("good".parse::<Label>().unwrap(), Label::NotTouching);
        assert_eq!("not_touch".parse::<Label>().unwrap(), Label::NotTouching);
        assert_eq!("BAD".parse::<Label>().unwrap(), Label::Touching);
        assert_eq!("touched".parse::<Label>().unwrap(), Label::Touching);
        assert!("maybe".parse::<Label>().is_err());
    }

    #[test]
    fn test_label_wire_names() {
        assert_eq!(Label::NotTouching.to_string(), "not_touch");
        assert_eq!(serde_json::to_string(&Label::Touching).unwrap(), "\"touched\"");
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_prediction_with_confidence() {
        let p = Prediction::with_confidence(Label::Touching, 0.95);
        assert!((p.confidence() - 0.95).abs() < 1e-6);
        assert!((p.confidence_for(Label::NotTouching) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_prediction_clamps() {
        let p = Prediction::new(Label::Touching, -0.5, 1.5);
        assert_eq!(p.confidence(), 1.0);
        assert_eq!(p.confidence_for(Label::NotTouching), 0.0);
    }
}
