//! Receiver configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use fm_protocol::{
    AudioPath, BandConfiguration, FunctionalityMask, ProtocolError, Region, ScanMethod,
    MIN_SIGNAL_STRENGTH_DEFAULT, VOLUME_MAX,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::DEFAULT_COMMAND_TIMEOUT;

/// Errors loading or saving a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] ProtocolError),

    #[error("could not determine config directory")]
    NoConfigDir,
}

/// Settings applied when opening and powering up a receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Region preset used when no explicit band is given
    pub region: Region,
    /// Explicit band limits, overriding the region preset
    pub band: Option<BandConfiguration>,
    /// Deadline for every command in milliseconds
    pub command_timeout_ms: u64,
    /// Functionality requested at power-up
    pub functionality: FunctionalityMask,
    /// Audio routing selected at power-up
    pub audio_path: AudioPath,
    /// Volume set at power-up
    pub volume: u8,
    /// Minimum signal strength for seeks
    pub min_signal_strength: u8,
    /// Signal threshold for AF switching
    pub af_threshold: u8,
    /// Seek algorithm used by scans
    pub scan_method: ScanMethod,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            region: Region::Na,
            band: None,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT.as_millis() as u64,
            functionality: FunctionalityMask::power_up_default(),
            audio_path: AudioPath::Digital,
            volume: VOLUME_MAX,
            min_signal_strength: MIN_SIGNAL_STRENGTH_DEFAULT,
            af_threshold: MIN_SIGNAL_STRENGTH_DEFAULT,
            scan_method: ScanMethod::Normal,
        }
    }
}

impl ReceiverConfig {
    /// Effective band
    pub fn band(&self) -> BandConfiguration {
        self.band
            .unwrap_or_else(|| BandConfiguration::for_region(self.region))
    }

    /// Effective per-command deadline
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_timeout_ms == 0 {
            return Err(ProtocolError::InvalidParameter("command timeout is zero".into()).into());
        }
        if let Some(band) = self.band {
            BandConfiguration::new(band.low, band.high, band.step, band.deemphasis, band.region)?;
        }
        Ok(())
    }

    /// Parse and validate JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load from the user config directory, defaulting when the file is absent
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Write to a file as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write to the user config directory
    pub fn save_default(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save(&path)?;
        Ok(path)
    }

    /// `$XDG_CONFIG_HOME/fmctl`, falling back to `~/.config/fmctl`
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("fmctl"));
            }
        }
        dirs::home_dir().map(|h| h.join(".config").join("fmctl"))
    }

    /// Path of the default config file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }
}
