//! Alert chime playback via `rodio`, gated by a cooldown flag.
//!
//! The output stream lives on a dedicated audio thread; callers hold a
//! cheap `Send` handle. A [`SoundGate`] is closed when a chime starts and
//! reopened by the audio thread once the sink has drained.

use rodio::source::{SineWave, Source};
use rodio::{Decoder, OutputStreamBuilder, Sink};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use thiserror::Error;

const BEEP_FREQUENCY_HZ: f32 = 880.0;
const BEEP_DURATION: Duration = Duration::from_millis(400);
const BEEP_VOLUME: f32 = 0.25;

#[derive(Error, Debug)]
pub enum SoundError {
    #[error("sound file not found: {0}")]
    FileNotFound(String),
    #[error("failed to read sound file: {0}")]
    Io(#[from] std::io::Error),
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("audio thread exited")]
    ThreadExited,
}

/// Cooldown flag that prevents overlapping chimes. Starts open.
#[derive(Debug, Clone)]
pub struct SoundGate {
    open: Arc<AtomicBool>,
}

impl Default for SoundGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundGate {
    pub fn new() -> Self {
        Self {
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Close the gate if it is open. Returns true if this call closed it.
    pub fn try_acquire(&self) -> bool {
        self.open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Reopen the gate (the chime's "end" event).
    pub fn release(&self) {
        self.open.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Something that can play the alert sound once.
///
/// Implementations must call [`SoundGate::release`] when playback finishes.
pub trait Chime: Send {
    fn play(&mut self, gate: SoundGate) -> Result<(), SoundError>;
}

enum ChimeSource {
    File(Arc<[u8]>),
    Beep,
}

/// Chime backed by a rodio output stream on its own thread.
pub struct RodioChime {
    tx: mpsc::Sender<SoundGate>,
}

impl RodioChime {
    /// Start the audio thread. Plays `sound_path` if given, otherwise a short beep.
    ///
    /// Fails fast if the file is missing or no output device can be opened.
    pub fn spawn(sound_path: Option<&Path>) -> Result<Self, SoundError> {
        let source = match sound_path {
            Some(path) => {
                if !path.exists() {
                    return Err(SoundError::FileNotFound(path.display().to_string()));
                }
                let bytes: Arc<[u8]> = std::fs::read(path)?.into();
                tracing::info!(path = %path.display(), bytes = bytes.len(), "loaded alert sound");
                ChimeSource::File(bytes)
            }
            None => {
                tracing::info!("no alert sound configured; using built-in beep");
                ChimeSource::Beep
            }
        };

        let (tx, rx) = mpsc::channel::<SoundGate>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), SoundError>>();
        let label = sound_path.map(PathBuf::from);

        std::thread::Builder::new()
            .name("handsoff-audio".into())
            .spawn(move || {
                let stream = match OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(SoundError::Output(e.to_string())));
                        return;
                    }
                };

                while let Ok(gate) = rx.recv() {
                    let sink = Sink::connect_new(stream.mixer());
                    match &source {
                        ChimeSource::File(bytes) => match Decoder::new(Cursor::new(bytes.clone())) {
                            Ok(decoded) => sink.append(decoded),
                            Err(e) => {
                                tracing::warn!(error = %e, path = ?label, "failed to decode alert sound");
                                gate.release();
                                continue;
                            }
                        },
                        ChimeSource::Beep => sink.append(
                            SineWave::new(BEEP_FREQUENCY_HZ)
                                .take_duration(BEEP_DURATION)
                                .amplify(BEEP_VOLUME),
                        ),
                    }
                    sink.sleep_until_end();
                    tracing::debug!("alert sound finished");
                    gate.release();
                }
                tracing::debug!("audio thread exiting");
            })?;

        ready_rx.recv().map_err(|_| SoundError::ThreadExited)??;

        Ok(Self { tx })
    }
}

impl Chime for RodioChime {
    fn play(&mut self, gate: SoundGate) -> Result<(), SoundError> {
        self.tx.send(gate).map_err(|_| SoundError::ThreadExited)
    }
}

/// `None` stands in for a missing audio device: nothing plays and the gate
/// reopens at once.
impl<C: Chime> Chime for Option<C> {
    fn play(&mut self, gate: SoundGate) -> Result<(), SoundError> {
        match self {
            Some(chime) => chime.play(gate),
            None => {
                gate.release();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_chime_releases_gate() {
        let gate = SoundGate::new();
        assert!(gate.try_acquire());
        let mut chime: Option<RodioChime> = None;
        chime.play(gate.clone()).unwrap();
        assert!(gate.is_open());
    }

    #[test]
    fn test_gate_starts_open() {
        assert!(SoundGate::new().is_open());
    }

    #[test]
    fn test_gate_acquire_once() {
        let gate = SoundGate::new();
        assert!(gate.try_acquire());
        assert!(!gate.is_open());
        assert!(!gate.try_acquire());
        gate.release();
        assert!(gate.try_acquire());
    }

    #[test]
    fn test_gate_clones_share_state() {
        let gate = SoundGate::new();
        let end_event = gate.clone();
        assert!(gate.try_acquire());
        end_event.release();
        assert!(gate.is_open());
    }

    #[test]
    fn test_beep_releases_gate_when_finished() {
        let Ok(mut chime) = RodioChime::spawn(None) else {
            return;
        };
        let gate = SoundGate::new();
        assert!(gate.try_acquire());
        chime.play(gate.clone()).unwrap();
        assert!(!gate.is_open());

        let deadline = std::time::Instant::now() + BEEP_DURATION * 2 + Duration::from_millis(500);
        while !gate.is_open() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(gate.is_open());
    }

    #[test]
    fn test_spawn_missing_file() {
        assert!(matches!(
            RodioChime::spawn(Some(Path::new("/nonexistent/alert.mp3"))),
            Err(SoundError::FileNotFound(_))
        ));
    }
}
