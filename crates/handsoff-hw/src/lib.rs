//! handsoff-hw — Hardware abstraction for camera capture and sound playback.
//!
//! Provides V4L2-based camera access producing RGB frames and a rodio-backed
//! alert chime with a cooldown gate.

pub mod camera;
pub mod frame;
pub mod sound;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use sound::{Chime, RodioChime, SoundError, SoundGate};
