use crate::enhance::EnhancementStyle;
use crate::paths;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const DEFAULT_API_BASE_URL: &str = "https://api.selection-bubble.app/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch for selection monitoring. Read when a session starts.
    pub monitoring_enabled: bool,
    pub selection: SelectionConfig,
    pub bubble: BubbleConfig,
    pub enhancement: EnhancementConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitoring_enabled: true,
            selection: SelectionConfig::default(),
            bubble: BubbleConfig::default(),
            enhancement: EnhancementConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub debounce_ms: u64,
    pub min_trimmed_chars: usize,
    /// Use the primary clipboard when a selection event carries no text.
    pub clipboard_fallback: bool,
    pub clipboard_fallback_max_chars: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            min_trimmed_chars: 2,
            clipboard_fallback: false,
            clipboard_fallback_max_chars: 1000,
        }
    }
}

impl SelectionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BubbleConfig {
    pub initial_x: i32,
    pub initial_y: i32,
    pub drag_threshold_px: u32,
}

impl Default for BubbleConfig {
    fn default() -> Self {
        Self {
            initial_x: 100,
            initial_y: 200,
            drag_threshold_px: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub default_style: EnhancementStyle,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
            default_style: EnhancementStyle::General,
        }
    }
}

impl EnhancementConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Replaces values that would disable core behavior with their defaults.
    fn sanitize(mut self) -> Self {
        let defaults = Config::default();
        if self.selection.debounce_ms == 0 {
            warn!("selection.debounce_ms must be positive; using default");
            self.selection.debounce_ms = defaults.selection.debounce_ms;
        }
        if self.selection.min_trimmed_chars == 0 {
            warn!("selection.min_trimmed_chars must be at least 1; using default");
            self.selection.min_trimmed_chars = defaults.selection.min_trimmed_chars;
        }
        if self.enhancement.request_timeout_secs == 0 {
            warn!("enhancement.request_timeout_secs must be positive; using default");
            self.enhancement.request_timeout_secs = defaults.enhancement.request_timeout_secs;
        }
        if self.enhancement.api_base_url.trim().is_empty() {
            self.enhancement.api_base_url = defaults.enhancement.api_base_url;
        }
        self
    }
}

/// Parses JSONC (comments and trailing commas allowed) into a config.
pub fn parse_config(content: &str) -> Result<Config> {
    let value = jsonc_parser::parse_to_serde_value(content, &Default::default())
        .map_err(|err| anyhow!("Invalid JSONC: {err}"))?;
    let Some(value) = value else {
        return Ok(Config::default());
    };
    let config: Config = serde_json::from_value(value).context("Invalid config values")?;
    Ok(config.sanitize())
}

/// Owns the config file and broadcasts every change.
pub struct ConfigManager {
    path: PathBuf,
    tx: watch::Sender<Config>,
}

impl ConfigManager {
    pub fn load() -> Result<Self> {
        Self::load_from(paths::config_file())
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = parse_config(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            info!("⚙️  Loaded config from {}", path.display());
            config
        } else {
            let config = Config::default();
            write_config(&path, &config)?;
            info!("📝 Wrote default config to {}", path.display());
            config
        };

        let (tx, _) = watch::channel(config);
        Ok(Self { path, tx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Config {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    /// Applies `change`, persists the result and notifies subscribers when
    /// anything differs.
    pub fn update<F>(&self, change: F) -> Result<Config>
    where
        F: FnOnce(&mut Config),
    {
        let current = self.get();
        let mut next = current.clone();
        change(&mut next);
        let next = next.sanitize();

        if next == current {
            debug!("Config unchanged; skipping write");
            return Ok(current);
        }

        write_config(&self.path, &next)?;
        self.tx.send_replace(next.clone());
        Ok(next)
    }

    pub fn set_monitoring_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|config| config.monitoring_enabled = enabled)?;
        info!(
            "{} Selection monitoring {}",
            if enabled { "👀" } else { "🙈" },
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}

fn write_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn comments_and_trailing_commas_are_accepted() {
        let config = parse_config(
            r#"{
                // quieter bubble
                "selection": { "debounce_ms": 250, },
                "enhancement": { "default_style": "concise" },
            }"#,
        )
        .unwrap();
        assert_eq!(config.selection.debounce_ms, 250);
        assert_eq!(config.selection.min_trimmed_chars, 2);
        assert_eq!(config.enhancement.default_style, EnhancementStyle::Concise);
        assert!(config.monitoring_enabled);
    }

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let config =
            parse_config(r#"{"selection":{"debounce_ms":0,"min_trimmed_chars":0}}"#).unwrap();
        assert_eq!(config.selection.debounce_ms, 500);
        assert_eq!(config.selection.min_trimmed_chars, 2);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(parse_config("  // nothing\n").unwrap(), Config::default());
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.jsonc");
        let manager = ConfigManager::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(manager.get(), Config::default());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.jsonc");
        fs::write(&path, r#"{"selection": "#).unwrap();
        assert!(ConfigManager::load_from(&path).is_err());
    }

    #[test]
    fn update_persists_and_broadcasts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.jsonc");
        let manager = ConfigManager::load_from(&path).unwrap();
        let mut rx = manager.subscribe();

        manager.set_monitoring_enabled(false).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().monitoring_enabled);

        let reloaded = ConfigManager::load_from(&path).unwrap();
        assert!(!reloaded.get().monitoring_enabled);

        manager.set_monitoring_enabled(false).unwrap();
        assert!(!rx.has_changed().unwrap());
    }
}
