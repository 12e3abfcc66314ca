use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod core;
mod daemon;
mod loader;
mod storage;
mod watch;

use cli::control::Control;

#[derive(Parser)]
#[command(name = "pinwatch")]
#[command(author, version, about = "Keeps pinned imageboard threads refreshed and reports new replies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the watch daemon
    Daemon {
        /// Start with the pin list considered on screen
        #[arg(long)]
        foreground: bool,

        /// Keep pins in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show pinned threads
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Open a pinned thread in the browser
    Open {
        /// Pin id as shown by `status`
        id: u32,
    },

    /// Pin a thread
    Add {
        board: String,
        thread: u64,

        /// Title to show instead of the thread reference
        #[arg(long)]
        title: Option<String>,
    },

    /// Remove a pin
    Remove { id: u32 },

    /// Pause or resume watching a pin
    Toggle { id: u32 },

    /// Mark all posts in a pin as read
    Viewed { id: u32 },

    /// Stop watching every pin
    PauseAll,

    /// Remove paused pins, or dead ones while watching is disabled
    Clear {
        /// Remove every pin
        #[arg(long)]
        all: bool,
    },

    /// Put back the pins removed by the last `clear`
    Restore,

    /// Move a pin to a new position in the list
    Move {
        id: u32,

        /// Zero-based position; past the end moves it last
        index: u32,
    },

    /// Tell the daemon whether the pin list is on screen
    Foreground {
        #[arg(value_enum)]
        state: Switch,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn init_logging(journald: bool, debug: bool) {
    let default_directive = if debug { "info,pinwatch=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let journald_layer = if journald {
        tracing_journald::layer().ok()
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(journald_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let control = match cli.command {
        Commands::Daemon {
            foreground,
            ephemeral,
        } => {
            // Logging is not up yet, so a broken config surfaces again from the daemon.
            let debug = crate::core::settings::Settings::load().is_ok_and(|s| s.debug);
            init_logging(true, debug);
            return daemon::run(daemon::DaemonOptions {
                foreground,
                ephemeral,
            })
            .await;
        }
        Commands::Status { json } => {
            init_logging(false, false);
            return cli::status::run(json).await;
        }
        Commands::Open { id } => {
            init_logging(false, false);
            return cli::open::run(id);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            return Ok(());
        }
        Commands::Add {
            board,
            thread,
            title,
        } => Control::Add {
            board,
            thread,
            title,
        },
        Commands::Remove { id } => Control::Remove(id),
        Commands::Toggle { id } => Control::Toggle(id),
        Commands::Viewed { id } => Control::Viewed(id),
        Commands::PauseAll => Control::PauseAll,
        Commands::Clear { all } => Control::Clear { all },
        Commands::Restore => Control::Restore,
        Commands::Move { id, index } => Control::Move { id, index },
        Commands::Foreground { state } => Control::Foreground(matches!(state, Switch::On)),
    };

    init_logging(false, false);
    cli::control::run(control).await
}
