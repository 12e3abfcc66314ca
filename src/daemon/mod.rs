mod app;
mod dbus;
mod notifier;
mod power;
mod timers;

use anyhow::Result;

pub use app::DaemonOptions;

pub const DBUS_NAME: &str = "io.github.pinwatch.Daemon";
pub const DBUS_PATH: &str = "/io/github/pinwatch/Daemon";

pub async fn run(options: DaemonOptions) -> Result<()> {
    tracing::info!(?options, "Starting pinwatch daemon");
    app::run(options).await
}
