use anyhow::{Context, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub watch: WatchSettings,
    pub api: ApiSettings,
    pub notifications: NotificationSettings,
    pub saved_replies: Vec<SavedReply>,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watch: WatchSettings::default(),
            api: ApiSettings::default(),
            notifications: NotificationSettings::default(),
            saved_replies: Vec::new(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub enabled: bool,
    pub background: bool,
    pub foreground_interval_secs: u64,
    pub background_interval_secs: u64,
    pub alarm_debounce_secs: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            background: true,
            foreground_interval_secs: 15,
            background_interval_secs: 15 * 60,
            alarm_debounce_secs: 90,
        }
    }
}

impl WatchSettings {
    pub fn foreground_interval(&self) -> Duration {
        Duration::from_secs(self.foreground_interval_secs)
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval_secs)
    }

    pub fn alarm_debounce(&self) -> Duration {
        Duration::from_secs(self.alarm_debounce_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub media_url: String,
    pub web_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://a.4cdn.org".to_string(),
            media_url: "https://i.4cdn.org".to_string(),
            web_url: "https://boards.4chan.org".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// One of the user's own posts; replies to it count as quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SavedReply {
    pub board: String,
    pub no: u64,
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pinwatch").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config directory")?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        settings.validate()?;
        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let watch = &self.watch;
        if watch.alarm_debounce_secs == 0 {
            anyhow::bail!("watch.alarm_debounce_secs must be greater than 0");
        }
        if watch.foreground_interval_secs == 0 {
            anyhow::bail!("watch.foreground_interval_secs must be greater than 0");
        }
        if watch.foreground_interval_secs >= watch.background_interval_secs {
            anyhow::bail!(
                "watch.foreground_interval_secs ({}) must be shorter than watch.background_interval_secs ({})",
                watch.foreground_interval_secs,
                watch.background_interval_secs
            );
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than 0");
        }
        Ok(())
    }
}

/// Holds the current settings and republishes them whenever the config
/// file changes on disk.
pub struct SettingsWatcher {
    path: Option<PathBuf>,
    current: Arc<RwLock<Settings>>,
    tx: broadcast::Sender<Settings>,
    _watcher: Option<RecommendedWatcher>,
}

impl SettingsWatcher {
    pub fn new() -> Result<Self> {
        let path = Settings::config_path();
        let settings = match &path {
            Some(path) => Settings::load_from(path)?,
            None => Settings::default(),
        };
        let (tx, _) = broadcast::channel(8);

        Ok(Self {
            path,
            current: Arc::new(RwLock::new(settings)),
            tx,
            _watcher: None,
        })
    }

    pub async fn get(&self) -> Settings {
        self.current.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn start_watching(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            tracing::warn!("No config path, settings will not be reloaded");
            return Ok(());
        };
        let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Ok(());
        };
        let parent = parent.to_path_buf();
        let file_name = file_name.to_os_string();

        if !parent.exists() {
            tracing::warn!(?parent, "Config directory does not exist, skipping watch");
            return Ok(());
        }

        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = notify_tx.send(());
                    }
                }
            },
            Config::default(),
        )?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", parent.display()))?;
        tracing::info!(?parent, "Watching config directory");

        let current = Arc::clone(&self.current);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while notify_rx.recv().await.is_some() {
                tokio::time::sleep(Duration::from_millis(200)).await;
                while notify_rx.try_recv().is_ok() {}

                let settings = match Settings::load_from(&path) {
                    Ok(settings) => settings,
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring invalid config change");
                        continue;
                    }
                };

                let mut guard = current.write().await;
                if *guard == settings {
                    continue;
                }
                *guard = settings.clone();
                drop(guard);

                tracing::info!("Config changed on disk");
                let _ = tx.send(settings);
            }
        });

        self._watcher = Some(watcher);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.watch.enabled);
        assert!(settings.watch.background);
        assert_eq!(settings.watch.foreground_interval(), Duration::from_secs(15));
        assert_eq!(settings.watch.alarm_debounce(), Duration::from_secs(90));
        assert!(settings.watch.foreground_interval() < settings.watch.background_interval());
        assert!(settings.notifications.enabled);
        assert!(settings.saved_replies.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.watch.alarm_debounce_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.watch.foreground_interval_secs = 900;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.watch.foreground_interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            debug = true

            [watch]
            background = false
            foreground_interval_secs = 30

            [api]
            base_url = "http://localhost:8080"

            [notifications]
            enabled = false

            [[saved_replies]]
            board = "g"
            no = 1234
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert!(settings.debug);
        assert!(settings.watch.enabled);
        assert!(!settings.watch.background);
        assert_eq!(settings.watch.foreground_interval_secs, 30);
        assert_eq!(settings.watch.background_interval_secs, 900);
        assert_eq!(settings.api.base_url, "http://localhost:8080");
        assert_eq!(settings.api.media_url, "https://i.4cdn.org");
        assert!(!settings.notifications.enabled);
        assert_eq!(
            settings.saved_replies,
            vec![SavedReply {
                board: "g".to_string(),
                no: 1234
            }]
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());

        std::fs::write(&path, "[watch]\nenabled = false\n").unwrap();
        assert!(!Settings::load_from(&path).unwrap().watch.enabled);

        std::fs::write(&path, "[watch]\nalarm_debounce_secs = 0\n").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}
