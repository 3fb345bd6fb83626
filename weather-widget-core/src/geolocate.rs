//! One-time IP geolocation used to pre-fill coordinates on first start.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::model::Coordinates;
use crate::settings::Settings;

pub const DEFAULT_GEOLOCATION_URL: &str = "http://ip-api.com/json/?fields=lat,lon";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum GeolocateError {
    #[error("geolocation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("geolocation service returned status {0}")]
    Status(u16),
    #[error("geolocation response has no usable coordinates")]
    NoCoordinates,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Look up the approximate location of this host's public IP.
pub async fn lookup(url: &str) -> Result<Coordinates, GeolocateError> {
    let http = Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?;

    let response = http.get(url).send().await?;

    if !response.status().is_success() {
        return Err(GeolocateError::Status(response.status().as_u16()));
    }

    let body: IpApiResponse = response.json().await?;
    let coordinates = match (body.lat, body.lon) {
        (Some(lat), Some(lon)) => Coordinates::new(lat, lon),
        _ => return Err(GeolocateError::NoCoordinates),
    };

    if !coordinates.is_in_range() {
        return Err(GeolocateError::NoCoordinates);
    }

    Ok(coordinates)
}

/// Fill unset coordinates from IP geolocation.
///
/// Settings that already carry coordinates are returned untouched. A failed
/// lookup is logged and leaves the sentinel in place.
pub async fn bootstrap(mut settings: Settings, url: &str) -> Settings {
    if settings.coordinates().is_set() {
        return settings;
    }

    match lookup(url).await {
        Ok(coordinates) => {
            tracing::debug!(%coordinates, "Located host by IP");
            settings.set_coordinates(coordinates);
        }
        Err(err) => tracing::warn!(error = %err, "Error getting location"),
    }

    settings
}
