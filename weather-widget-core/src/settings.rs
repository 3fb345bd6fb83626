use serde::{Deserialize, Serialize};

use crate::model::{
    Coordinates, LATITUDE_RANGE, LONGITUDE_RANGE, SpeedUnit, TemperatureUnit, WeatherRequest,
};

const DURATION_RANGE: std::ops::RangeInclusive<f64> = 1.0..=1000.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SettingsError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    #[error("breathing duration {0} is outside [1, 1000]")]
    Duration(f64),
}

/// User-facing widget options as delivered by the host settings store.
///
/// Only the units and coordinates feed the weather refresh; the color and
/// animation keys are passed through for the display client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub temp_unit: TemperatureUnit,
    pub speed_unit: SpeedUnit,
    pub latitude: f64,
    pub longitude: f64,
    pub from: String,
    pub mid: String,
    pub to: String,
    pub breathing: bool,
    /// Breathing period in seconds. The host sends any number, not only integers.
    pub duration: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            temp_unit: TemperatureUnit::default(),
            speed_unit: SpeedUnit::default(),
            latitude: 0.0,
            longitude: 0.0,
            from: "black".to_string(),
            mid: "black".to_string(),
            to: "black".to_string(),
            breathing: false,
            duration: 10.0,
        }
    }
}

impl Settings {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn set_coordinates(&mut self, coordinates: Coordinates) {
        self.latitude = coordinates.latitude;
        self.longitude = coordinates.longitude;
    }

    /// The fetch this configuration asks for.
    pub fn weather_request(&self) -> WeatherRequest {
        WeatherRequest {
            coordinates: self.coordinates(),
            temp_unit: self.temp_unit,
            speed_unit: self.speed_unit,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !LATITUDE_RANGE.contains(&self.latitude) {
            return Err(SettingsError::Latitude(self.latitude));
        }
        if !LONGITUDE_RANGE.contains(&self.longitude) {
            return Err(SettingsError::Longitude(self.longitude));
        }
        // duration is only shown (and only meaningful) while breathing is on
        if self.breathing && !DURATION_RANGE.contains(&self.duration) {
            return Err(SettingsError::Duration(self.duration));
        }
        Ok(())
    }
}
