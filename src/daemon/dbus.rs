use super::{DBUS_NAME, DBUS_PATH};
use crate::core::models::PinId;
use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use zbus::interface;

/// Requests from D-Bus clients, answered by the daemon loop.
#[derive(Debug)]
pub enum ControlCommand {
    AddPin {
        board: String,
        thread: u64,
        title: Option<String>,
        reply: oneshot::Sender<bool>,
    },
    RemovePin {
        id: PinId,
        reply: oneshot::Sender<bool>,
    },
    ToggleWatch {
        id: PinId,
        reply: oneshot::Sender<bool>,
    },
    MarkViewed {
        id: PinId,
        reply: oneshot::Sender<bool>,
    },
    PauseAll,
    ClearPins {
        all: bool,
        reply: oneshot::Sender<u32>,
    },
    RestorePins {
        reply: oneshot::Sender<u32>,
    },
    MovePin {
        id: PinId,
        index: u32,
        reply: oneshot::Sender<bool>,
    },
    SetForeground(bool),
}

pub struct PinwatchService {
    tx: mpsc::UnboundedSender<ControlCommand>,
}

impl PinwatchService {
    pub fn new(tx: mpsc::UnboundedSender<ControlCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, command: ControlCommand) -> zbus::fdo::Result<()> {
        self.tx
            .send(command)
            .map_err(|_| zbus::fdo::Error::Failed("daemon is shutting down".into()))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ControlCommand,
    ) -> zbus::fdo::Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply))?;
        rx.await
            .map_err(|_| zbus::fdo::Error::Failed("daemon dropped the request".into()))
    }
}

#[interface(name = "io.github.pinwatch.Daemon")]
impl PinwatchService {
    async fn add_pin(&self, board: String, thread: u64, title: String) -> zbus::fdo::Result<bool> {
        tracing::info!(%board, thread, "D-Bus AddPin called");
        let title = Some(title).filter(|t| !t.trim().is_empty());
        self.request(|reply| ControlCommand::AddPin {
            board,
            thread,
            title,
            reply,
        })
        .await
    }

    async fn remove_pin(&self, id: u32) -> zbus::fdo::Result<bool> {
        self.request(|reply| ControlCommand::RemovePin {
            id: PinId(id),
            reply,
        })
        .await
    }

    async fn toggle_watch(&self, id: u32) -> zbus::fdo::Result<bool> {
        self.request(|reply| ControlCommand::ToggleWatch {
            id: PinId(id),
            reply,
        })
        .await
    }

    async fn mark_viewed(&self, id: u32) -> zbus::fdo::Result<bool> {
        self.request(|reply| ControlCommand::MarkViewed {
            id: PinId(id),
            reply,
        })
        .await
    }

    async fn pause_all(&self) -> zbus::fdo::Result<()> {
        tracing::info!("D-Bus PauseAll called");
        self.send(ControlCommand::PauseAll)
    }

    async fn clear_pins(&self, all: bool) -> zbus::fdo::Result<u32> {
        tracing::info!(all, "D-Bus ClearPins called");
        self.request(|reply| ControlCommand::ClearPins { all, reply })
            .await
    }

    async fn restore_pins(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("D-Bus RestorePins called");
        self.request(|reply| ControlCommand::RestorePins { reply })
            .await
    }

    async fn move_pin(&self, id: u32, index: u32) -> zbus::fdo::Result<bool> {
        self.request(|reply| ControlCommand::MovePin {
            id: PinId(id),
            index,
            reply,
        })
        .await
    }

    async fn set_foreground(&self, in_foreground: bool) -> zbus::fdo::Result<()> {
        self.send(ControlCommand::SetForeground(in_foreground))
    }
}

pub async fn start_dbus_server(
    tx: mpsc::UnboundedSender<ControlCommand>,
) -> Result<zbus::Connection> {
    let connection = zbus::connection::Builder::session()?
        .name(DBUS_NAME)?
        .serve_at(DBUS_PATH, PinwatchService::new(tx))?
        .build()
        .await
        .context("Failed to register D-Bus service")?;

    tracing::info!(name = DBUS_NAME, path = DBUS_PATH, "D-Bus service started");
    Ok(connection)
}
