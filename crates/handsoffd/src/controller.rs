//! Control loop: the single owner of the session.
//!
//! Runs as one tokio task. Commands arrive over a channel; training and
//! prediction advance one step at a time between commands, so `stop` and
//! shutdown take effect at the next step boundary. Modes are exclusive.

use crate::engine::{EngineError, FrameEmbedder};
use crate::notifier::Notifier;
use crate::session::{Session, SessionStatus};
use handsoff_core::{ClassifierError, Label};
use handsoff_hw::Chime;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("busy: currently {0}")]
    Busy(&'static str),
    #[error("prediction loop is already running")]
    AlreadyRunning,
    #[error("no training examples; train at least one label first")]
    NoExamples,
    #[error("cancelled")]
    Cancelled,
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("controller task exited")]
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Mode {
    Idle,
    Training { label: Label, remaining: usize },
    Predicting,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Training { .. } => "training",
            Mode::Predicting => "predicting",
        }
    }
}

enum Command {
    Train {
        label: Label,
        reply: oneshot::Sender<Result<usize, ControlError>>,
    },
    Run {
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    Stop {
        reply: oneshot::Sender<Mode>,
    },
    Reset {
        reply: oneshot::Sender<Result<usize, ControlError>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Clone-safe handle to the controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Command>,
}

impl ControllerHandle {
    /// Capture the configured number of frames under `label`. Resolves when
    /// training finishes, with the number of examples added.
    pub async fn train(&self, label: Label) -> Result<usize, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Train { label, reply }).await?;
        rx.await.map_err(|_| ControlError::ChannelClosed)?
    }

    /// Start the prediction loop. Returns once the loop is running.
    pub async fn run(&self) -> Result<(), ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Run { reply }).await?;
        rx.await.map_err(|_| ControlError::ChannelClosed)?
    }

    /// Cancel training or prediction. Returns the mode that was stopped.
    pub async fn stop(&self) -> Result<Mode, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        rx.await.map_err(|_| ControlError::ChannelClosed)
    }

    /// Discard all training examples. Only allowed while idle.
    pub async fn reset(&self) -> Result<usize, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reset { reply }).await?;
        rx.await.map_err(|_| ControlError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<SessionStatus, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| ControlError::ChannelClosed)
    }

    async fn send(&self, cmd: Command) -> Result<(), ControlError> {
        self.tx.send(cmd).await.map_err(|_| ControlError::ChannelClosed)
    }
}

struct Controller<E, C, N> {
    session: Session<E, C, N>,
    mode: Mode,
    pending_train: Option<oneshot::Sender<Result<usize, ControlError>>>,
    trained: usize,
}

/// Spawn the controller task. It exits when `shutdown` flips (or its sender
/// is dropped) or when every handle is gone.
pub fn spawn<E, C, N>(
    session: Session<E, C, N>,
    shutdown: watch::Receiver<bool>,
) -> (ControllerHandle, JoinHandle<()>)
where
    E: FrameEmbedder + 'static,
    C: Chime + 'static,
    N: Notifier + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let controller = Controller {
        session,
        mode: Mode::Idle,
        pending_train: None,
        trained: 0,
    };
    let task = tokio::spawn(controller.run(rx, shutdown));
    (ControllerHandle { tx }, task)
}

impl<E, C, N> Controller<E, C, N>
where
    E: FrameEmbedder,
    C: Chime,
    N: Notifier,
{
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("controller started");
        let mut next_step = Instant::now();

        loop {
            let active = self.mode != Mode::Idle;
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle(cmd) {
                            next_step = Instant::now();
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(next_step), if active => {
                    let interval = self.step().await;
                    next_step = Instant::now() + interval;
                }
            }
        }

        self.cancel();
        tracing::info!("controller stopped");
    }

    /// Apply a command. Returns true when a new activity started and its
    /// first step should run immediately.
    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Train { label, reply } => {
                if self.mode != Mode::Idle {
                    let _ = reply.send(Err(ControlError::Busy(self.mode.name())));
                    return false;
                }
                let samples = self.session.config().training_samples;
                if samples == 0 {
                    let _ = reply.send(Ok(0));
                    return false;
                }
                tracing::info!(label = %label, samples, "training started");
                self.mode = Mode::Training {
                    label,
                    remaining: samples,
                };
                self.pending_train = Some(reply);
                self.trained = 0;
                true
            }
            Command::Run { reply } => {
                let result = match self.mode {
                    Mode::Predicting => Err(ControlError::AlreadyRunning),
                    Mode::Training { .. } => Err(ControlError::Busy(self.mode.name())),
                    Mode::Idle if self.session.classifier().is_empty() => Err(ControlError::NoExamples),
                    Mode::Idle => Ok(()),
                };
                let started = result.is_ok();
                if started {
                    tracing::info!("prediction loop started");
                    self.mode = Mode::Predicting;
                }
                let _ = reply.send(result);
                started
            }
            Command::Stop { reply } => {
                let previous = self.mode;
                self.cancel();
                let _ = reply.send(previous);
                false
            }
            Command::Reset { reply } => {
                let result = if self.mode == Mode::Idle {
                    let removed = self.session.reset();
                    tracing::info!(removed, "training examples cleared");
                    Ok(removed)
                } else {
                    Err(ControlError::Busy(self.mode.name()))
                };
                let _ = reply.send(result);
                false
            }
            Command::Status { reply } => {
                let _ = reply.send(self.session.status(self.mode));
                false
            }
        }
    }

    /// Advance the current activity by one frame. Returns the pause before
    /// the next step.
    async fn step(&mut self) -> std::time::Duration {
        match self.mode {
            Mode::Idle => {}
            Mode::Training { label, remaining } => {
                let total = self.session.config().training_samples;
                match self.session.train_step(label).await {
                    Ok(()) => {
                        self.trained += 1;
                        tracing::info!(
                            label = %label,
                            progress_pct = self.trained * 100 / total,
                            "training"
                        );
                        if remaining <= 1 {
                            tracing::info!(label = %label, added = self.trained, "training finished");
                            self.finish_training(Ok(self.trained));
                        } else {
                            self.mode = Mode::Training {
                                label,
                                remaining: remaining - 1,
                            };
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, label = %label, "training aborted");
                        self.finish_training(Err(e));
                    }
                }
                return self.session.config().train_interval;
            }
            Mode::Predicting => {
                if let Err(e) = self.session.predict_step().await {
                    tracing::error!(error = %e, "prediction loop stopped");
                    self.mode = Mode::Idle;
                    self.session.set_touched(false);
                }
            }
        }
        self.session.config().predict_interval
    }

    fn finish_training(&mut self, result: Result<usize, ControlError>) {
        self.mode = Mode::Idle;
        if let Some(reply) = self.pending_train.take() {
            let _ = reply.send(result);
        }
    }

    /// Return to idle, failing any pending train request.
    fn cancel(&mut self) {
        match self.mode {
            Mode::Idle => {}
            Mode::Training { label, .. } => {
                tracing::info!(label = %label, added = self.trained, "training cancelled");
                self.finish_training(Err(ControlError::Cancelled));
            }
            Mode::Predicting => {
                tracing::info!("prediction loop stopped");
                self.mode = Mode::Idle;
                self.session.set_touched(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{test_session, FakeChime, FakeEmbedder, FakeNotifier};
    use crate::session::SessionConfig;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        handle: ControllerHandle,
        embedder: FakeEmbedder,
        chime: FakeChime,
        notifier: FakeNotifier,
        touched: watch::Receiver<bool>,
        _shutdown: watch::Sender<bool>,
    }

    fn harness(config: SessionConfig) -> Harness {
        let (session, embedder, chime, notifier) = test_session(config);
        let touched = session.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, _task) = spawn(session, shutdown_rx);
        Harness {
            handle,
            embedder,
            chime,
            notifier,
            touched,
            _shutdown: shutdown_tx,
        }
    }

    fn small_training() -> SessionConfig {
        SessionConfig {
            training_samples: 5,
            ..SessionConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_train_adds_exact_count() {
        let h = harness(SessionConfig::default());
        let started = Instant::now();

        assert_eq!(h.handle.train(Label::NotTouching).await.unwrap(), 50);

        let status = h.handle.status().await.unwrap();
        assert_eq!(status.examples.not_touch, 50);
        assert_eq!(status.examples.touched, 0);
        assert_eq!(status.mode, Mode::Idle);
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 50);
        assert!(started.elapsed() >= Duration::from_millis(49 * 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_requires_examples() {
        let h = harness(SessionConfig::default());
        assert!(matches!(h.handle.run().await, Err(ControlError::NoExamples)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ten_touching_iterations() {
        let h = harness(small_training());
        h.handle.train(Label::Touching).await.unwrap();
        h.handle.run().await.unwrap();

        // Steps at 0, 200, ..., 1800 ms.
        tokio::time::sleep(Duration::from_millis(1_900)).await;

        assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 10);
        assert_eq!(h.chime.plays.load(Ordering::SeqCst), 1);
        assert!(*h.touched.borrow());

        assert_eq!(h.handle.stop().await.unwrap(), Mode::Predicting);
        assert!(!*h.touched.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_rejected() {
        let h = harness(small_training());
        h.handle.train(Label::Touching).await.unwrap();
        h.handle.run().await.unwrap();

        assert!(matches!(h.handle.run().await, Err(ControlError::AlreadyRunning)));
        assert!(matches!(
            h.handle.train(Label::NotTouching).await,
            Err(ControlError::Busy("predicting"))
        ));
        assert!(matches!(h.handle.reset().await, Err(ControlError::Busy("predicting"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_train_while_training_rejected() {
        let h = harness(SessionConfig::default());
        let first = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.train(Label::Touching).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            h.handle.train(Label::NotTouching).await,
            Err(ControlError::Busy("training"))
        ));
        assert!(matches!(h.handle.run().await, Err(ControlError::Busy("training"))));

        assert_eq!(first.await.unwrap().unwrap(), 50);
        let status = h.handle.status().await.unwrap();
        assert_eq!(status.examples.touched, 50);
        assert_eq!(status.examples.not_touch, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_training() {
        let h = harness(SessionConfig::default());
        let pending = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.train(Label::Touching).await })
        };
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(matches!(h.handle.stop().await.unwrap(), Mode::Training { .. }));
        assert!(matches!(pending.await.unwrap(), Err(ControlError::Cancelled)));

        let status = h.handle.status().await.unwrap();
        assert_eq!(status.mode, Mode::Idle);
        assert_eq!(status.examples.touched, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_prediction_loop() {
        let h = harness(small_training());
        h.handle.train(Label::Touching).await.unwrap();
        h.handle.run().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.handle.stop().await.unwrap();

        let calls = h.embedder.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), calls);

        // Idle stop is a no-op.
        assert_eq!(h.handle.stop().await.unwrap(), Mode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_stops_loop() {
        let h = harness(small_training());
        h.handle.train(Label::Touching).await.unwrap();
        h.handle.run().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(*h.touched.borrow());

        h.embedder.fail.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let status = h.handle.status().await.unwrap();
        assert_eq!(status.mode, Mode::Idle);
        assert!(!status.touched);

        // The loop can be restarted once the camera recovers.
        h.embedder.fail.store(false, Ordering::SeqCst);
        h.handle.run().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_training_failure_reported() {
        let h = harness(small_training());
        h.embedder.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            h.handle.train(Label::Touching).await,
            Err(ControlError::Engine(_))
        ));
        assert_eq!(h.handle.status().await.unwrap().mode, Mode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_idle() {
        let h = harness(small_training());
        h.handle.train(Label::Touching).await.unwrap();
        assert_eq!(h.handle.reset().await.unwrap(), 5);
        assert!(matches!(h.handle.run().await, Err(ControlError::NoExamples)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_exits_task() {
        let (session, _, _, _) = test_session(small_training());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, task) = spawn(session, shutdown_rx);
        handle.train(Label::Touching).await.unwrap();
        handle.run().await.unwrap();

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(matches!(handle.status().await, Err(ControlError::ChannelClosed)));
    }
}
