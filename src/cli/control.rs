use crate::daemon::{DBUS_NAME, DBUS_PATH};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use zbus::zvariant::{DynamicType, Type};

/// Commands forwarded to a running daemon over D-Bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Add {
        board: String,
        thread: u64,
        title: Option<String>,
    },
    Remove(u32),
    Toggle(u32),
    Viewed(u32),
    PauseAll,
    Clear {
        all: bool,
    },
    Restore,
    Move {
        id: u32,
        index: u32,
    },
    Foreground(bool),
}

pub async fn run(control: Control) -> Result<()> {
    let connection = zbus::Connection::session()
        .await
        .context("Failed to connect to session D-Bus")?;

    match control {
        Control::Add {
            board,
            thread,
            title,
        } => {
            let title = title.unwrap_or_default();
            let added: bool = call(&connection, "AddPin", &(board.as_str(), thread, title.as_str())).await?;
            if added {
                println!("Pinned /{}/{}", board, thread);
            } else {
                println!("/{}/{} is already pinned", board, thread);
            }
        }
        Control::Remove(id) => report(call(&connection, "RemovePin", &(id,)).await?, id, "Removed"),
        Control::Toggle(id) => report(call(&connection, "ToggleWatch", &(id,)).await?, id, "Toggled"),
        Control::Viewed(id) => report(call(&connection, "MarkViewed", &(id,)).await?, id, "Marked viewed"),
        Control::PauseAll => {
            let () = call(&connection, "PauseAll", &()).await?;
            println!("Paused all pins");
        }
        Control::Clear { all } => {
            let removed: u32 = call(&connection, "ClearPins", &(all,)).await?;
            println!("Cleared {} {}", removed, if removed == 1 { "pin" } else { "pins" });
        }
        Control::Restore => {
            let restored: u32 = call(&connection, "RestorePins", &()).await?;
            println!("Restored {} {}", restored, if restored == 1 { "pin" } else { "pins" });
        }
        Control::Move { id, index } => {
            report(call(&connection, "MovePin", &(id, index)).await?, id, "Moved")
        }
        Control::Foreground(in_foreground) => {
            let () = call(&connection, "SetForeground", &(in_foreground,)).await?;
            println!("Foreground {}", if in_foreground { "on" } else { "off" });
        }
    }

    Ok(())
}

async fn call<B, R>(connection: &zbus::Connection, method: &str, body: &B) -> Result<R>
where
    B: Serialize + DynamicType,
    R: DeserializeOwned + Type,
{
    connection
        .call_method(Some(DBUS_NAME), DBUS_PATH, Some(DBUS_NAME), method, body)
        .await
        .with_context(|| format!("Failed to call {method} - is the daemon running?"))?
        .body()
        .deserialize()
        .context("Failed to deserialize response")
}

fn report(found: bool, id: u32, action: &str) {
    if found {
        println!("{} pin {}", action, id);
    } else {
        println!("No pin with id {}", id);
    }
}
