use crate::core::models::PinId;
use crate::core::settings::Settings;
use crate::storage::JsonPinRepository;
use anyhow::{Context, Result};

pub fn run(id: u32) -> Result<()> {
    let settings = Settings::load()?;
    let path = JsonPinRepository::default_path().context("Could not determine data directory")?;
    let pins = JsonPinRepository::read_all(&path)
        .with_context(|| format!("Failed to read pins: {}", path.display()))?;

    let pin = pins
        .iter()
        .find(|p| p.id == PinId(id))
        .with_context(|| format!("No pin with id {id}"))?;

    let url = pin.loadable.web_url(&settings.api.web_url);
    tracing::info!(pin_id = id, url, "Opening thread");
    open::that(&url).with_context(|| format!("Failed to open {url}"))?;
    println!("{}", url);
    Ok(())
}
