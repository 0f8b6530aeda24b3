use anyhow::{Context, Result};
use handsoff_hw::RodioChime;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use zbus::Connection;

mod config;
mod controller;
mod dbus_interface;
mod engine;
mod notifier;
mod session;

use dbus_interface::{HandsOffService, BUS_NAME, OBJECT_PATH};
use notifier::DesktopNotifier;
use session::Session;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("handsoffd starting");
    let config = config::Config::from_env();

    let conn = Connection::session()
        .await
        .context("failed to connect to the session bus")?;

    let notifier = DesktopNotifier::new(&conn, config.notify_cooldown).await?;

    let chime = match RodioChime::spawn(config.sound_path.as_deref()) {
        Ok(chime) => Some(chime),
        Err(e) => {
            tracing::warn!(error = %e, "alert sound unavailable; continuing silently");
            None
        }
    };

    // Camera first, then the model, then the classifier. Any failure is fatal.
    let model_path = config.model_path_str();
    let session = Session::initialize(
        || engine::spawn_engine(&config.camera_device, &model_path, config.warmup_frames),
        config.session.clone(),
        chime,
        notifier,
    )
    .context("initialization failed")?;

    let mut touched_rx = session.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (controller, controller_task) = controller::spawn(session, shutdown_rx);

    conn.object_server()
        .at(OBJECT_PATH, HandsOffService::new(controller))
        .await?;
    conn.request_name(BUS_NAME)
        .await
        .with_context(|| format!("failed to acquire bus name {BUS_NAME}"))?;

    let iface = conn
        .object_server()
        .interface::<_, HandsOffService>(OBJECT_PATH)
        .await?;
    tokio::spawn(async move {
        while touched_rx.changed().await.is_ok() {
            let touched = *touched_rx.borrow_and_update();
            if let Err(e) = HandsOffService::touch_state_changed(iface.signal_emitter(), touched).await {
                tracing::warn!(error = %e, "failed to emit TouchStateChanged");
            }
        }
    });

    tracing::info!(bus_name = BUS_NAME, path = OBJECT_PATH, "handsoffd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("handsoffd shutting down");

    let _ = shutdown_tx.send(true);
    controller_task.await?;

    Ok(())
}
