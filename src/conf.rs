use crate::presence::PresenceThresholds;
use crate::sampler::SamplerConfig;
use crate::session::SessionConfig;
use crate::signal::SignalConfig;
use crate::store::StoreConfig;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Thresholds for the fingertip check
    #[serde(default)]
    pub presence: PresenceThresholds,

    #[serde(default)]
    pub signal: SignalConfig,

    /// Measurement length and when the live value is revealed
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Settings {
    /// Load config from ~/.config/pulsecam/config.toml
    /// Returns default settings if file doesn't exist or fails to parse
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            log::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from: {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse config: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!(
                    "No config file found at {}, using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Save config to ~/.config/pulsecam/config.toml
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = config_path() else {
            anyhow::bail!("Could not determine config directory");
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize settings to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        log::info!("Saved settings to: {}", path.display());

        Ok(())
    }
}

/// Get the path to the config file: ~/.config/pulsecam/config.toml
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pulsecam").map(|dirs| dirs.config_dir().join("config.toml"))
}
