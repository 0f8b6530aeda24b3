use crate::controller::{ControlError, ControllerHandle};
use handsoff_core::Label;
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "io.github.handsoff.HandsOff1";
pub const OBJECT_PATH: &str = "/io/github/handsoff/HandsOff1";

impl From<ControlError> for zbus::fdo::Error {
    fn from(err: ControlError) -> Self {
        zbus::fdo::Error::Failed(err.to_string())
    }
}

/// D-Bus interface for the handsoff daemon.
///
/// Bus name: io.github.handsoff.HandsOff1 (session bus)
/// Object path: /io/github/handsoff/HandsOff1
pub struct HandsOffService {
    controller: ControllerHandle,
}

impl HandsOffService {
    pub fn new(controller: ControllerHandle) -> Self {
        Self { controller }
    }
}

#[interface(name = "io.github.handsoff.HandsOff1")]
impl HandsOffService {
    /// Capture training frames for a label. Returns the number of examples added.
    async fn train(&self, label: &str) -> zbus::fdo::Result<u32> {
        let label = label
            .parse::<Label>()
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        tracing::info!(label = %label, "train requested");
        let added = self.controller.train(label).await?;
        Ok(u32::try_from(added).unwrap_or(u32::MAX))
    }

    /// Start the prediction loop.
    async fn run(&self) -> zbus::fdo::Result<()> {
        tracing::info!("run requested");
        Ok(self.controller.run().await?)
    }

    /// Stop training or prediction. Returns the mode that was stopped.
    async fn stop(&self) -> zbus::fdo::Result<String> {
        tracing::info!("stop requested");
        let previous = self.controller.stop().await?;
        Ok(previous.name().to_string())
    }

    /// Discard all training examples. Returns how many were removed.
    async fn reset(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("reset requested");
        let removed = self.controller.reset().await?;
        Ok(u32::try_from(removed).unwrap_or(u32::MAX))
    }

    /// Return session status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.controller.status().await?;
        let mut value = serde_json::to_value(&status)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        value["version"] = env!("CARGO_PKG_VERSION").into();
        Ok(value.to_string())
    }

    /// Emitted whenever the touched state flips.
    #[zbus(signal)]
    pub async fn touch_state_changed(emitter: &SignalEmitter<'_>, touched: bool) -> zbus::Result<()>;
}
