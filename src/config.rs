//! Portal settings file.
//!
//! Optional TOML file holding the portal's own settings: the AP it
//! broadcasts, the listen port and the session timeouts. Submitted Wi-Fi
//! credentials are never written here; provisioning hands the connected
//! station to the system and keeps nothing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::iface::ApOptions;
use crate::portal::PortalSettings;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// SSID the device broadcasts while provisioning.
    #[serde(default = "default_ap_ssid")]
    pub ap_ssid: String,
    /// WPA2 passphrase for the setup network; open when absent.
    #[serde(default)]
    pub ap_passphrase: Option<String>,
    /// Port the portal listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds of accept inactivity before the session times out.
    #[serde(default = "default_inactivity_secs")]
    pub inactivity_timeout_secs: u64,
    /// Seconds each station-connection attempt may take.
    #[serde(default = "default_attempt_secs")]
    pub attempt_timeout_secs: u32,
    /// Device for the access-point role; auto-detected when absent.
    #[serde(default)]
    pub ap_interface: Option<String>,
    /// Device for the station role; auto-detected when absent.
    #[serde(default)]
    pub sta_interface: Option<String>,
}

fn default_ap_ssid() -> String {
    "WiFi-Setup".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_inactivity_secs() -> u64 {
    35
}

fn default_attempt_secs() -> u32 {
    20
}

impl Default for Config {
    fn default() -> Self {
        // Deserializing an empty document applies every field default.
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Session settings derived from this config.
    pub fn portal_settings(&self) -> PortalSettings {
        PortalSettings {
            ap: ApOptions {
                ssid: self.ap_ssid.clone(),
                passphrase: self.ap_passphrase.clone(),
            },
            inactivity_timeout: Duration::from_secs(self.inactivity_timeout_secs),
            attempt: crate::attempt::AttemptSettings {
                timeout_polls: self.attempt_timeout_secs,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("wifi-provision").join("config.toml"))
}
