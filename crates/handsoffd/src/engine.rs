use handsoff_core::{Embedding, MobileNetEmbedder};
use handsoff_hw::{Camera, CameraStream};
use std::future::Future;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] handsoff_hw::CameraError),
    #[error("embedder error: {0}")]
    Embedder(#[from] handsoff_core::EmbedderError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Source of frame embeddings: capture one frame and embed it.
pub trait FrameEmbedder: Send {
    fn embed_frame(&mut self) -> impl Future<Output = Result<Embedding, EngineError>> + Send;
}

/// Messages sent from the controller to the engine thread.
enum EngineRequest {
    Embed {
        reply: oneshot::Sender<Result<Embedding, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl FrameEmbedder for EngineHandle {
    fn embed_frame(&mut self) -> impl Future<Output = Result<Embedding, EngineError>> + Send {
        let tx = self.tx.clone();
        async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(EngineRequest::Embed { reply: reply_tx })
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
        }
    }
}

/// Acquire the camera, then load the model. The model loader only runs once
/// the camera is open.
pub fn open_resources<C, M>(
    open_camera: impl FnOnce() -> Result<C, handsoff_hw::CameraError>,
    load_model: impl FnOnce() -> Result<M, handsoff_core::EmbedderError>,
) -> Result<(C, M), EngineError> {
    let camera = open_camera()?;
    let model = load_model()?;
    Ok((camera, model))
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera, loads the MobileNet model, then hands both to the
/// engine thread. The thread starts one capture stream, discards warmup
/// frames on it and serves every embed request from that same stream.
/// Fails fast if any resource is unavailable.
pub fn spawn_engine(
    camera_device: &str,
    model_path: &str,
    warmup_frames: usize,
) -> Result<EngineHandle, EngineError> {
    let (camera, mut embedder) = open_resources(
        || Camera::open(camera_device),
        || MobileNetEmbedder::load(model_path),
    )?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        model = model_path,
        "camera opened and model loaded"
    );

    let (tx, rx) = mpsc::channel::<EngineRequest>(4);
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), EngineError>>();

    std::thread::Builder::new()
        .name("handsoff-engine".into())
        .spawn(move || {
            let mut stream = match camera.stream() {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };

            // Discard warmup frames for auto-exposure stabilization
            if warmup_frames > 0 {
                tracing::info!(count = warmup_frames, "discarding warmup frames");
                if let Err(e) = stream.discard(warmup_frames) {
                    tracing::warn!(error = %e, "warmup capture failed");
                }
            }

            let _ = ready_tx.send(Ok(()));
            tracing::info!("engine thread started");
            serve_requests(rx, || run_embed(&mut stream, &mut embedder));
            tracing::info!("engine thread exiting");
        })?;

    ready_rx.recv().map_err(|_| EngineError::ChannelClosed)??;
    Ok(EngineHandle { tx })
}

/// Answer embed requests until every handle is dropped.
fn serve_requests(
    mut rx: mpsc::Receiver<EngineRequest>,
    mut embed: impl FnMut() -> Result<Embedding, EngineError>,
) {
    while let Some(req) = rx.blocking_recv() {
        match req {
            EngineRequest::Embed { reply } => {
                let _ = reply.send(embed());
            }
        }
    }
}

/// Capture one frame and extract its embedding.
fn run_embed(
    stream: &mut CameraStream<'_>,
    embedder: &mut MobileNetEmbedder,
) -> Result<Embedding, EngineError> {
    let frame = stream.next_frame()?;
    if frame.is_dark {
        tracing::debug!(
            seq = frame.sequence,
            brightness = frame.avg_brightness(),
            "dark frame (camera covered?)"
        );
    }
    let embedding = embedder.embed(&frame.data, frame.width, frame.height)?;
    tracing::trace!(
        seq = frame.sequence,
        dim = embedding.dim(),
        model = embedding.model_version.as_deref().unwrap_or("unknown"),
        elapsed_ms = frame.timestamp.elapsed().as_millis() as u64,
        "frame embedded"
    );
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use handsoff_hw::CameraError;
    use std::cell::Cell;

    #[test]
    fn test_camera_failure_skips_model_load() {
        let model_loaded = Cell::new(false);
        let result = open_resources::<(), ()>(
            || Err(CameraError::PermissionDenied("/dev/video0".into())),
            || {
                model_loaded.set(true);
                Ok(())
            },
        );
        assert!(matches!(result, Err(EngineError::Camera(CameraError::PermissionDenied(_)))));
        assert!(!model_loaded.get());
    }

    #[test]
    fn test_model_failure_after_camera() {
        let result = open_resources::<u32, ()>(
            || Ok(7),
            || Err(handsoff_core::EmbedderError::ModelNotFound("m.onnx".into())),
        );
        assert!(matches!(result, Err(EngineError::Embedder(_))));
    }

    #[test]
    fn test_spawn_engine_missing_camera() {
        let result = spawn_engine("/dev/video-does-not-exist", "/nonexistent.onnx", 0);
        assert!(matches!(result, Err(EngineError::Camera(CameraError::DeviceNotFound(_)))));
    }

    #[tokio::test]
    async fn test_requests_share_one_capture_source() {
        let (tx, rx) = mpsc::channel(4);
        let worker = std::thread::spawn(move || {
            let mut frames = 0u32;
            serve_requests(rx, || {
                frames += 1;
                Ok(Embedding::new(vec![frames as f32]))
            });
            frames
        });

        let mut handle = EngineHandle { tx };
        assert_eq!(handle.embed_frame().await.unwrap().values, vec![1.0]);
        assert_eq!(handle.embed_frame().await.unwrap().values, vec![2.0]);
        assert_eq!(handle.clone().embed_frame().await.unwrap().values, vec![3.0]);

        drop(handle);
        assert_eq!(worker.join().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_embed_error_reaches_caller() {
        let (tx, rx) = mpsc::channel(1);
        let worker = std::thread::spawn(move || {
            serve_requests(rx, || {
                Err(EngineError::Camera(CameraError::CaptureFailed("unplugged".into())))
            })
        });

        let mut handle = EngineHandle { tx };
        assert!(matches!(
            handle.embed_frame().await,
            Err(EngineError::Camera(CameraError::CaptureFailed(_)))
        ));
        drop(handle);
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn test_handle_reports_closed_engine() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut handle = EngineHandle { tx };
        assert!(matches!(handle.embed_frame().await, Err(EngineError::ChannelClosed)));
    }
}
