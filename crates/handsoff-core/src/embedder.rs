//! MobileNet image embedder via ONNX Runtime.
//!
//! Runs a MobileNet feature extractor (classification head removed) over a
//! full RGB frame and returns the pooled activation as the embedding.

use crate::types::Embedding;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const MOBILENET_INPUT_SIZE: usize = 224;
const MOBILENET_MEAN: f32 = 127.5;
const MOBILENET_STD: f32 = 127.5;
const MOBILENET_MODEL_VERSION: &str = "mobilenet_v2";

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} — export a MobileNet feature extractor to ONNX and place it there")]
    ModelNotFound(String),
    #[error("frame buffer too short: expected {expected} RGB bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// MobileNet-based frame embedder.
pub struct MobileNetEmbedder {
    session: Session,
}

impl MobileNetEmbedder {
    /// Load the MobileNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded MobileNet model"
        );

        Ok(Self { session })
    }

    /// Embed a packed RGB frame (`width * height * 3` bytes).
    pub fn embed(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Embedding, EmbedderError> {
        let input = preprocess(rgb, width, height)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("feature extraction: {e}")))?;

        if raw.is_empty() {
            return Err(EmbedderError::InferenceFailed("model produced an empty feature vector".into()));
        }

        Ok(Embedding {
            values: raw.to_vec(),
            model_version: Some(MOBILENET_MODEL_VERSION.to_string()),
        })
    }
}

/// Resize an RGB frame to 224x224 and normalize into a NCHW tensor in [-1, 1].
fn preprocess(rgb: &[u8], width: u32, height: u32) -> Result<Array4<f32>, EmbedderError> {
    let expected = width as usize * height as usize * 3;
    if rgb.len() < expected || expected == 0 {
        return Err(EmbedderError::InvalidFrame {
            expected,
            actual: rgb.len(),
        });
    }

    let image = RgbImage::from_raw(width, height, rgb[..expected].to_vec()).ok_or(
        EmbedderError::InvalidFrame {
            expected,
            actual: rgb.len(),
        },
    )?;

    let size = MOBILENET_INPUT_SIZE;
    let resized = image::imageops::resize(&image, size as u32, size as u32, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - MOBILENET_MEAN) / MOBILENET_STD;
        }
    }

    Ok(tensor)
}
