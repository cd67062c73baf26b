//! Configuration for parlance.
//!
//! Loads `${PARLANCE_HOME}/config.toml`. Every key is optional; a missing
//! file yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::image::ImageOptions;
use crate::scroll::DEFAULT_LOOKBACK;
use crate::theme::ColorMode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config from {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config from {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub mod paths {
    //! Path resolution for parlance's config and log directories.
    //!
    //! `PARLANCE_HOME` wins when set, else `~/.config/parlance`.

    use std::path::PathBuf;

    pub fn parlance_home() -> PathBuf {
        if let Some(home) = std::env::var_os("PARLANCE_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .map(|h| h.join(".config").join("parlance"))
            .unwrap_or_else(|| PathBuf::from(".parlance"))
    }

    pub fn config_path() -> PathBuf {
        parlance_home().join("config.toml")
    }

    pub fn logs_dir() -> PathBuf {
        parlance_home().join("logs")
    }
}

/// Color mode preference. `auto` consults `COLORFGBG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModeSetting {
    #[default]
    Auto,
    Dark,
    Light,
}

impl ModeSetting {
    pub fn resolve(self) -> ColorMode {
        match self {
            ModeSetting::Dark => ColorMode::Dark,
            ModeSetting::Light => ColorMode::Light,
            ModeSetting::Auto => ColorMode::detect().unwrap_or(ColorMode::Dark),
        }
    }
}

/// OSC8 hyperlink preference, layered over the capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Osc8Setting {
    #[default]
    Auto,
    Always,
    Never,
}

impl Osc8Setting {
    /// `None` defers to the probe.
    pub fn as_override(self) -> Option<bool> {
        match self {
            Osc8Setting::Auto => None,
            Osc8Setting::Always => Some(true),
            Osc8Setting::Never => Some(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Messages from the end that still count as "at the bottom".
    pub lookback: usize,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    pub enabled: bool,
    pub max_height_px: u32,
    /// Enlarge SVG and raster images narrower than the target width.
    pub upscale: bool,
    pub resize_step_px: u32,
    pub cache_capacity: usize,
    pub cell_width_px: u16,
    pub cell_height_px: u16,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        let options = ImageOptions::default();
        Self {
            enabled: true,
            max_height_px: options.max_height_px,
            upscale: options.upscale,
            resize_step_px: options.resize_step_px,
            cache_capacity: options.cache_capacity,
            cell_width_px: options.cell_width_px,
            cell_height_px: options.cell_height_px,
        }
    }
}

impl ImagesConfig {
    pub fn options(&self) -> ImageOptions {
        ImageOptions {
            max_height_px: self.max_height_px,
            upscale: self.upscale,
            resize_step_px: self.resize_step_px,
            cache_capacity: self.cache_capacity,
            cell_width_px: self.cell_width_px,
            cell_height_px: self.cell_height_px,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    pub osc8: Osc8Setting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub duration_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { duration_ms: 2500 }
    }
}

impl FeedbackConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Theme pair name, matched case-insensitively.
    pub theme: String,
    pub mode: ModeSetting,
    pub scroll: ScrollConfig,
    pub images: ImagesConfig,
    pub links: LinksConfig,
    pub feedback: FeedbackConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: Self::DEFAULT_THEME.to_string(),
            mode: ModeSetting::default(),
            scroll: ScrollConfig::default(),
            images: ImagesConfig::default(),
            links: LinksConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl Config {
    pub const DEFAULT_THEME: &str = "ocean";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from `path`, returning defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.scroll.lookback, 2);
        assert_eq!(config.feedback.duration(), Duration::from_millis(2500));
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "theme = \"solarized\"\nmode = \"light\"\n\n[images]\nupscale = true\n\n[links]\nosc8 = \"never\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.theme, "solarized");
        assert_eq!(config.mode.resolve(), ColorMode::Light);
        assert!(config.images.options().upscale);
        assert_eq!(config.images.max_height_px, 480);
        assert_eq!(config.links.osc8.as_override(), Some(false));
        assert_eq!(config.scroll, ScrollConfig::default());
    }

    #[test]
    fn test_malformed_config_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "mode = \"sepia\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_image_defaults_match_pipeline_defaults() {
        assert_eq!(ImagesConfig::default().options(), ImageOptions::default());
    }
}
