//! Desktop notifications over `org.freedesktop.Notifications`.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use zbus::zvariant::Value;
use zbus::{proxy, Connection};

const APP_NAME: &str = "handsoff";
const APP_ICON: &str = "dialog-warning";

#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: &HashMap<&str, &Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

/// Fire-and-forget system notification sink.
pub trait Notifier: Send {
    fn notify(&mut self, title: &str, body: &str);
}

/// Drops events that arrive within `period` of the last accepted one.
#[derive(Debug)]
pub struct Cooldown {
    period: Duration,
    last: Option<Instant>,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Returns true and records `now` if the cooldown has elapsed.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Notifier that posts to the desktop notification daemon on the session bus.
pub struct DesktopNotifier {
    proxy: NotificationsProxy<'static>,
    cooldown: Cooldown,
}

impl DesktopNotifier {
    pub async fn new(conn: &Connection, cooldown: Duration) -> zbus::Result<Self> {
        let proxy = NotificationsProxy::new(conn).await?;
        tracing::info!(cooldown_ms = cooldown.as_millis() as u64, "desktop notifier ready");
        Ok(Self {
            proxy,
            cooldown: Cooldown::new(cooldown),
        })
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&mut self, title: &str, body: &str) {
        if !self.cooldown.ready(Instant::now()) {
            tracing::debug!("notification suppressed by cooldown");
            return;
        }

        let proxy = self.proxy.clone();
        let title = title.to_string();
        let body = body.to_string();
        tokio::spawn(async move {
            let hints = HashMap::new();
            if let Err(e) = proxy
                .notify(APP_NAME, 0, APP_ICON, &title, &body, &[], &hints, -1)
                .await
            {
                tracing::warn!(error = %e, "failed to post desktop notification");
            }
        });
    }
}
