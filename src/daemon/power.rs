use crate::watch::WakeLock;
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use zbus::zvariant::OwnedFd;

const LOGIND_NAME: &str = "org.freedesktop.login1";
const LOGIND_PATH: &str = "/org/freedesktop/login1";
const LOGIND_MANAGER: &str = "org.freedesktop.login1.Manager";

#[derive(Debug)]
enum PowerCommand {
    Acquire,
    Release,
}

/// Blocks system sleep through a logind inhibitor while held. The
/// inhibitor lasts as long as its file descriptor stays open.
pub struct LogindWakeLock {
    tx: mpsc::UnboundedSender<PowerCommand>,
}

impl LogindWakeLock {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut connection: Option<zbus::Connection> = None;
            let mut inhibitor: Option<OwnedFd> = None;

            while let Some(command) = rx.recv().await {
                match command {
                    PowerCommand::Acquire => match inhibit(&mut connection).await {
                        Ok(fd) => {
                            tracing::debug!("Sleep inhibitor taken");
                            inhibitor = Some(fd);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to take sleep inhibitor");
                        }
                    },
                    PowerCommand::Release => {
                        if inhibitor.take().is_some() {
                            tracing::debug!("Sleep inhibitor released");
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    fn send(&self, command: PowerCommand) {
        if self.tx.send(command).is_err() {
            tracing::warn!("Wake lock task is gone");
        }
    }
}

impl WakeLock for LogindWakeLock {
    fn acquire(&mut self) {
        self.send(PowerCommand::Acquire);
    }

    fn release(&mut self) {
        self.send(PowerCommand::Release);
    }
}

async fn inhibit(connection: &mut Option<zbus::Connection>) -> Result<OwnedFd> {
    let conn = match connection {
        Some(conn) => conn.clone(),
        None => {
            let conn = zbus::Connection::system()
                .await
                .context("Failed to connect to system D-Bus")?;
            *connection = Some(conn.clone());
            conn
        }
    };

    let reply = conn
        .call_method(
            Some(LOGIND_NAME),
            LOGIND_PATH,
            Some(LOGIND_MANAGER),
            "Inhibit",
            &("sleep", "pinwatch", "Updating watched threads", "block"),
        )
        .await
        .context("logind Inhibit call failed")?;

    reply
        .body()
        .deserialize()
        .context("Failed to read inhibitor file descriptor")
}
