use crate::core::models::Pin;
use crate::core::settings::Settings;
use crate::storage::JsonPinRepository;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
struct StatusOutput {
    watch_enabled: bool,
    background_enabled: bool,
    pins: Vec<PinStatus>,
    #[serde(with = "chrono::serde::ts_seconds")]
    read_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, PartialEq)]
struct PinStatus {
    id: u32,
    board: String,
    thread: u64,
    title: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_posts: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_quotes: Option<i32>,
    url: String,
}

pub async fn run(json: bool) -> Result<()> {
    let settings = Settings::load()?;
    let path = JsonPinRepository::default_path().context("Could not determine data directory")?;
    let mut pins = JsonPinRepository::read_all(&path)
        .with_context(|| format!("Failed to read pins: {}", path.display()))?;
    pins.sort_by_key(|p| p.order);

    let statuses: Vec<PinStatus> = pins
        .iter()
        .map(|pin| pin_status(pin, &settings.api.web_url))
        .collect();

    if json {
        let output = StatusOutput {
            watch_enabled: settings.watch.enabled,
            background_enabled: settings.watch.background,
            pins: statuses,
            read_at: Utc::now(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text_output(&settings, &statuses);
    }

    Ok(())
}

fn pin_state(pin: &Pin) -> &'static str {
    if pin.is_error {
        "404"
    } else if pin.archived {
        "archived"
    } else if pin.watching {
        "watching"
    } else {
        "paused"
    }
}

fn pin_status(pin: &Pin, web_url: &str) -> PinStatus {
    let loaded = pin.is_loaded();
    PinStatus {
        id: pin.id.0,
        board: pin.loadable.board.clone(),
        thread: pin.loadable.thread,
        title: pin.title.clone(),
        state: pin_state(pin),
        new_posts: loaded.then(|| pin.new_post_count()),
        new_quotes: loaded.then(|| pin.new_quote_count()),
        url: pin.loadable.web_url(web_url),
    }
}

fn print_text_output(settings: &Settings, statuses: &[PinStatus]) {
    let watch = if !settings.watch.enabled {
        "disabled"
    } else if settings.watch.background {
        "enabled (background)"
    } else {
        "enabled"
    };
    println!("Watching {}", watch);

    if statuses.is_empty() {
        println!("No pins");
        return;
    }

    for status in statuses {
        println!();
        println!("{:>4}  {}", status.id, status.title);
        println!("      /{}/{}  {}{}", status.board, status.thread, status.state, counts_line(status));
    }
}

fn counts_line(status: &PinStatus) -> String {
    match (status.new_posts, status.new_quotes) {
        (Some(posts), Some(quotes)) if quotes > 0 => format!("  {} new, {} quoting you", posts, quotes),
        (Some(posts), _) if posts > 0 => format!("  {} new", posts),
        _ => String::new(),
    }
}
