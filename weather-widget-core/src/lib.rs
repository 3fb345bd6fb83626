//! Core library for the weather widget server.
//!
//! This crate defines:
//! - The Open-Meteo client that produces [`WeatherSnapshot`]s
//! - The cache/scheduler that keeps one snapshot fresh and pushes updates
//! - Event bridge messages, widget settings and the on-disk configuration
//!
//! It is used by the `weather-widget` binary, which supplies the host-facing
//! event bridge.

pub mod bridge;
pub mod config;
pub mod geolocate;
pub mod model;
pub mod provider;
pub mod scheduler;
pub mod settings;

pub use bridge::{ClientMessage, EventBridge, Flow, InboundEvent, dispatch};
pub use config::{Config, Endpoints};
pub use model::{
    Coordinates, CurrentReading, DailySeries, HourlySeries, LATITUDE_RANGE, LONGITUDE_RANGE,
    SpeedUnit, TemperatureUnit, WeatherRequest, WeatherSnapshot,
};
pub use provider::{FetchError, OpenMeteoProvider, WeatherProvider};
pub use scheduler::{SchedulerOptions, WeatherScheduler};
pub use settings::{Settings, SettingsError};
