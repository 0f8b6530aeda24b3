use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_lite::StreamExt;
use handsoff_hw::Camera;
use zbus::{proxy, Connection};

#[proxy(
    interface = "io.github.handsoff.HandsOff1",
    default_service = "io.github.handsoff.HandsOff1",
    default_path = "/io/github/handsoff/HandsOff1"
)]
trait HandsOff {
    fn train(&self, label: &str) -> zbus::Result<u32>;
    fn run(&self) -> zbus::Result<()>;
    fn stop(&self) -> zbus::Result<String>;
    fn reset(&self) -> zbus::Result<u32>;
    fn status(&self) -> zbus::Result<String>;

    #[zbus(signal)]
    fn touch_state_changed(&self, touched: bool) -> zbus::Result<()>;
}

#[derive(Parser)]
#[command(name = "handsoff", about = "Face-touch detector control CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture training frames for a label
    Train {
        /// "good" / "not_touch" or "bad" / "touched"
        label: String,
    },
    /// Start touch detection
    Run,
    /// Stop training or detection
    Stop,
    /// Discard all training examples
    Reset,
    /// Show daemon status
    Status,
    /// Print the touched state whenever it changes
    Watch,
    /// List camera devices (bypasses the daemon)
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Devices = cli.command {
        let devices = Camera::list_devices();
        if devices.is_empty() {
            println!("No V4L2 capture devices found");
        }
        for device in devices {
            println!("{}", serde_json::to_string(&device)?);
        }
        return Ok(());
    }

    let conn = Connection::session().await?;
    let daemon = HandsOffProxy::new(&conn).await?;

    match cli.command {
        Commands::Train { label } => {
            println!("Training {label}... keep still");
            let added = daemon.train(&label).await?;
            println!("Added {added} examples");
        }
        Commands::Run => {
            daemon.run().await?;
            println!("Detection running");
        }
        Commands::Stop => {
            let previous = daemon.stop().await?;
            println!("Stopped ({previous})");
        }
        Commands::Reset => {
            let removed = daemon.reset().await?;
            println!("Removed {removed} examples");
        }
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&daemon.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Watch => watch(&daemon).await?,
        Commands::Devices => {}
    }

    Ok(())
}

fn describe(touched: bool) -> &'static str {
    if touched {
        "TOUCHED: hands off!"
    } else {
        "clear"
    }
}

/// Print the current touched state, then every TouchStateChanged signal until interrupted.
async fn watch(daemon: &HandsOffProxy<'_>) -> Result<()> {
    // Subscribe before reading status so no transition falls in between.
    let mut changes = daemon.receive_touch_state_changed().await?;

    let status: serde_json::Value = serde_json::from_str(&daemon.status().await?)?;
    let mut last = status["touched"].as_bool().unwrap_or(false);
    println!("{}", describe(last));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            signal = changes.next() => {
                let Some(signal) = signal else {
                    anyhow::bail!("TouchStateChanged stream closed");
                };
                let touched = signal.args()?.touched;
                if touched != last {
                    println!("{}", describe(touched));
                    last = touched;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(true), "TOUCHED: hands off!");
        assert_eq!(describe(false), "clear");
    }

    #[test]
    fn test_parse_train_label() {
        let cli = Cli::try_parse_from(["handsoff", "train", "bad"]).unwrap();
        assert!(matches!(cli.command, Commands::Train { label } if label == "bad"));
    }
}
