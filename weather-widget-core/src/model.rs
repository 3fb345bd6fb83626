use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const LATITUDE_RANGE: RangeInclusive<f64> = -90.0..=90.0;
pub const LONGITUDE_RANGE: RangeInclusive<f64> = -180.0..=180.0;

/// Temperature unit as stored in settings (`f` / `c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "f")]
    Fahrenheit,
    #[serde(rename = "c")]
    Celsius,
}

impl TemperatureUnit {
    /// Setting code, e.g. `"f"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "f",
            TemperatureUnit::Celsius => "c",
        }
    }

    /// Value of the provider's `temperature_unit` query parameter.
    pub fn provider_name(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "fahrenheit",
            TemperatureUnit::Celsius => "celsius",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Celsius => "°C",
        }
    }
}

/// Wind speed unit as stored in settings (`mph` / `kmh`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    #[default]
    Mph,
    Kmh,
}

impl SpeedUnit {
    /// Setting code, which is also the provider's `wind_speed_unit` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedUnit::Mph => "mph",
            SpeedUnit::Kmh => "kmh",
        }
    }
}

/// A latitude/longitude pair in signed degrees.
///
/// Zero on either axis is the "not configured" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const UNSET: Coordinates = Coordinates {
        latitude: 0.0,
        longitude: 0.0,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when neither component equals the `0` sentinel.
    pub fn is_set(&self) -> bool {
        self.latitude != 0.0 && self.longitude != 0.0
    }

    /// True when both components are finite and within [`LATITUDE_RANGE`] and
    /// [`LONGITUDE_RANGE`].
    pub fn is_in_range(&self) -> bool {
        LATITUDE_RANGE.contains(&self.latitude) && LONGITUDE_RANGE.contains(&self.longitude)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Parameters for one upstream fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherRequest {
    pub coordinates: Coordinates,
    pub temp_unit: TemperatureUnit,
    pub speed_unit: SpeedUnit,
}

/// Hour-by-hour forecast for the requested day.
///
/// Every series has the same length as `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HourlySeries {
    pub time: Vec<DateTime<Utc>>,
    pub temperature_2m: Vec<f32>,
    pub relative_humidity_2m: Vec<f32>,
    pub dew_point_2m: Vec<f32>,
    pub apparent_temperature: Vec<f32>,
    pub precipitation_probability: Vec<f32>,
    pub precipitation: Vec<f32>,
    pub rain: Vec<f32>,
    pub showers: Vec<f32>,
    pub snowfall: Vec<f32>,
    pub snow_depth: Vec<f32>,
    pub cloud_cover: Vec<f32>,
    pub visibility: Vec<f32>,
    pub wind_speed_10m: Vec<f32>,
    pub wind_direction_10m: Vec<f32>,
    pub uv_index: Vec<f32>,
}

impl HourlySeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Conditions at the time of the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CurrentReading {
    pub time: DateTime<Utc>,
    pub temperature_2m: f32,
    pub relative_humidity_2m: f32,
    pub apparent_temperature: f32,
    /// `1.0` during daylight, `0.0` at night.
    pub is_day: f32,
    pub precipitation: f32,
    pub rain: f32,
    pub cloud_cover: f32,
    pub wind_speed_10m: f32,
    pub wind_direction_10m: f32,
    pub wind_gusts_10m: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DailySeries {
    pub time: Vec<DateTime<Utc>>,
    pub temperature_2m_max: Vec<f32>,
    pub temperature_2m_min: Vec<f32>,
    pub precipitation_probability_mean: Vec<f32>,
}

impl DailySeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// One complete weather reading, replaced wholesale on every successful refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub hourly: HourlySeries,
    pub current: CurrentReading,
    pub daily: DailySeries,
    pub temp_unit: TemperatureUnit,
    pub speed_unit: SpeedUnit,
    pub latitude: f64,
    pub longitude: f64,
}

impl WeatherSnapshot {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}
