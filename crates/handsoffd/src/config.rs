use crate::session::SessionConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Path to the MobileNet feature-extractor ONNX model.
    pub model_path: PathBuf,
    /// Alert sound file; a built-in beep is used when unset.
    pub sound_path: Option<PathBuf>,
    /// Number of warmup frames to discard at startup (camera AE stabilization).
    pub warmup_frames: usize,
    /// Minimum gap between desktop notifications.
    pub notify_cooldown: Duration,
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from `HANDSOFF_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("HANDSOFF_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| handsoff_core::default_model_dir());

        let model_path = std::env::var("HANDSOFF_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| model_dir.join("mobilenet_v2.onnx"));

        let defaults = SessionConfig::default();

        Self {
            camera_device: std::env::var("HANDSOFF_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_path,
            sound_path: std::env::var("HANDSOFF_SOUND_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            warmup_frames: env_usize("HANDSOFF_WARMUP_FRAMES", 4),
            notify_cooldown: Duration::from_millis(env_u64("HANDSOFF_NOTIFY_COOLDOWN_MS", 3000)),
            session: SessionConfig {
                training_samples: env_usize("HANDSOFF_TRAINING_SAMPLES", defaults.training_samples),
                train_interval: Duration::from_millis(env_u64("HANDSOFF_TRAIN_INTERVAL_MS", 100)),
                predict_interval: Duration::from_millis(env_u64("HANDSOFF_PREDICT_INTERVAL_MS", 200)),
                touch_confidence: env_f32("HANDSOFF_TOUCH_CONFIDENCE", defaults.touch_confidence),
                knn_k: env_usize("HANDSOFF_KNN_K", defaults.knn_k),
                notify_title: std::env::var("HANDSOFF_NOTIFY_TITLE").unwrap_or(defaults.notify_title),
                notify_body: std::env::var("HANDSOFF_NOTIFY_BODY").unwrap_or(defaults.notify_body),
            },
        }
    }

    pub fn model_path_str(&self) -> String {
        self.model_path.to_string_lossy().into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
