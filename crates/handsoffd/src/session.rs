//! Per-daemon session state: classifier, touched flag, sound gate, notifier.
//!
//! A `Session` is owned exclusively by the controller task; every mutation
//! goes through it.

use crate::controller::{ControlError, Mode};
use crate::engine::{EngineError, FrameEmbedder};
use crate::notifier::Notifier;
use chrono::{DateTime, Utc};
use handsoff_core::decision::is_touching;
use handsoff_core::{KnnClassifier, Label, Prediction};
use handsoff_hw::{Chime, SoundGate};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Tunables for training and prediction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Frames captured per `train` call.
    pub training_samples: usize,
    /// Pause after each training capture.
    pub train_interval: Duration,
    /// Pause after each prediction.
    pub predict_interval: Duration,
    /// A `touched` prediction must exceed this confidence.
    pub touch_confidence: f32,
    pub knn_k: usize,
    pub notify_title: String,
    pub notify_body: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            training_samples: 50,
            train_interval: Duration::from_millis(100),
            predict_interval: Duration::from_millis(200),
            touch_confidence: handsoff_core::decision::DEFAULT_TOUCH_CONFIDENCE,
            knn_k: handsoff_core::classifier::DEFAULT_K,
            notify_title: "Warning".to_string(),
            notify_body: "Hands off your face!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExampleCounts {
    pub not_touch: usize,
    pub touched: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastPrediction {
    pub label: Label,
    pub confidence: f32,
    pub touching: bool,
    pub at: DateTime<Utc>,
}

/// Snapshot returned by the `Status` call.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub mode: Mode,
    pub touched: bool,
    pub sound_ready: bool,
    pub examples: ExampleCounts,
    pub last_prediction: Option<LastPrediction>,
}

pub struct Session<E, C, N> {
    id: Uuid,
    started_at: DateTime<Utc>,
    config: SessionConfig,
    embedder: E,
    classifier: KnnClassifier,
    chime: C,
    gate: SoundGate,
    notifier: N,
    touched: watch::Sender<bool>,
    last_prediction: Option<LastPrediction>,
}

impl<E, C, N> Session<E, C, N>
where
    E: FrameEmbedder,
    C: Chime,
    N: Notifier,
{
    /// Start the embedding engine, then build an empty classifier.
    ///
    /// If `start_engine` fails (camera missing or denied, model missing) no
    /// session and no classifier are created.
    pub fn initialize(
        start_engine: impl FnOnce() -> Result<E, EngineError>,
        config: SessionConfig,
        chime: C,
        notifier: N,
    ) -> Result<Self, EngineError> {
        let embedder = start_engine()?;
        let classifier = KnnClassifier::new(config.knn_k);
        let (touched, _) = watch::channel(false);
        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            config,
            embedder,
            classifier,
            chime,
            gate: SoundGate::new(),
            notifier,
            touched,
            last_prediction: None,
        };
        tracing::info!(session = %session.id, k = session.classifier.k(), "session initialized");
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn classifier(&self) -> &KnnClassifier {
        &self.classifier
    }

    pub fn touched(&self) -> bool {
        *self.touched.borrow()
    }

    /// Receiver that observes every touched-state transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.touched.subscribe()
    }

    #[cfg(test)]
    pub fn sound_gate(&self) -> &SoundGate {
        &self.gate
    }

    /// Capture one frame and store it under `label`.
    pub async fn train_step(&mut self, label: Label) -> Result<(), ControlError> {
        let embedding = self.embedder.embed_frame().await?;
        self.classifier.add_example(embedding, label)?;
        Ok(())
    }

    /// Capture one frame, classify it and apply the touch rule.
    pub async fn predict_step(&mut self) -> Result<bool, ControlError> {
        let embedding = self.embedder.embed_frame().await?;
        let prediction = self.classifier.predict_class(&embedding)?;
        Ok(self.apply_prediction(prediction))
    }

    /// Apply the decision rule and drive the side effects. Returns whether
    /// the frame counts as a touch.
    ///
    /// A touch plays the chime only while the sound gate is open, but posts a
    /// notification every time.
    pub fn apply_prediction(&mut self, prediction: Prediction) -> bool {
        let touching = is_touching(&prediction, self.config.touch_confidence);
        tracing::debug!(
            label = %prediction.label,
            confidence = prediction.confidence(),
            touching,
            "prediction"
        );

        if touching {
            if self.gate.try_acquire() {
                if let Err(e) = self.chime.play(self.gate.clone()) {
                    tracing::warn!(error = %e, "failed to play alert sound");
                    self.gate.release();
                }
            }
            self.notifier
                .notify(&self.config.notify_title, &self.config.notify_body);
        }

        self.set_touched(touching);
        self.last_prediction = Some(LastPrediction {
            label: prediction.label,
            confidence: prediction.confidence(),
            touching,
            at: Utc::now(),
        });
        touching
    }

    pub fn set_touched(&mut self, value: bool) {
        let changed = self.touched.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
        if changed {
            tracing::info!(touched = value, "touch state changed");
        }
    }

    /// Discard all training examples. Returns how many were removed.
    pub fn reset(&mut self) -> usize {
        let removed = self.classifier.total_examples();
        self.classifier.clear_all();
        self.last_prediction = None;
        self.set_touched(false);
        removed
    }

    pub fn status(&self, mode: Mode) -> SessionStatus {
        SessionStatus {
            session_id: self.id.to_string(),
            started_at: self.started_at,
            mode,
            touched: self.touched(),
            sound_ready: self.gate.is_open(),
            examples: ExampleCounts {
                not_touch: self.classifier.example_count(Label::NotTouching),
                touched: self.classifier.example_count(Label::Touching),
            },
            last_prediction: self.last_prediction.clone(),
        }
    }
}
