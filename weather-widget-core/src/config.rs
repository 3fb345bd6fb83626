use anyhow::{Context, Result, anyhow, ensure};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::geolocate::DEFAULT_GEOLOCATION_URL;
use crate::provider::openmeteo::DEFAULT_BASE_URL;
use crate::scheduler::{DEFAULT_REFRESH_INTERVAL, SchedulerOptions};
use crate::settings::Settings;

/// Upstream services the widget talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub weather_base_url: String,
    pub geolocation_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            weather_base_url: DEFAULT_BASE_URL.to_string(),
            geolocation_url: DEFAULT_GEOLOCATION_URL.to_string(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// refresh_interval_secs = 900
///
/// [settings]
/// temp_unit = "c"
/// latitude = 48.85
/// longitude = 2.35
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Staleness window and background refresh cadence.
    pub refresh_interval_secs: u64,
    pub settings: Settings,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            settings: Settings::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Load config from the platform location, or defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load config from `path`, or defaults if the file doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform location.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-widget", "weather-widget")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.refresh_interval_secs > 0,
            "refresh_interval_secs must be greater than zero"
        );
        self.settings.validate()?;
        Ok(())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SpeedUnit, TemperatureUnit};

    #[test]
    fn defaults_match_widget_defaults() {
        let cfg = Config::default();

        assert_eq!(cfg.refresh_interval_secs, 900);
        assert_eq!(cfg.scheduler_options().refresh_interval, DEFAULT_REFRESH_INTERVAL);
        assert_eq!(cfg.endpoints.weather_base_url, "https://api.open-meteo.com");
        assert!(!cfg.settings.coordinates().is_set());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[settings]\ntemp_unit = \"c\"\nspeed_unit = \"kmh\"\nlatitude = 48.85\nlongitude = 2.35\n",
        )
        .unwrap();

        let cfg = Config::load_from(&path).unwrap();

        assert_eq!(cfg.settings.temp_unit, TemperatureUnit::Celsius);
        assert_eq!(cfg.settings.speed_unit, SpeedUnit::Kmh);
        assert_eq!(cfg.refresh_interval_secs, 900);
        assert_eq!(cfg.endpoints, Endpoints::default());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.settings.latitude = -33.87;
        cfg.settings.longitude = 151.21;
        cfg.settings.breathing = true;
        cfg.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn invalid_file_is_rejected_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[settings]\nlatitude = 123.0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = Config {
            refresh_interval_secs: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
