use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::model::{
    CurrentReading, DailySeries, HourlySeries, WeatherRequest, WeatherSnapshot,
};

use super::{FetchError, WeatherProvider, truncate_body};

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

pub const HOURLY_VARIABLES: [&str; 15] = [
    "temperature_2m",
    "relative_humidity_2m",
    "dew_point_2m",
    "apparent_temperature",
    "precipitation_probability",
    "precipitation",
    "rain",
    "showers",
    "snowfall",
    "snow_depth",
    "cloud_cover",
    "visibility",
    "wind_speed_10m",
    "wind_direction_10m",
    "uv_index",
];

pub const CURRENT_VARIABLES: [&str; 10] = [
    "temperature_2m",
    "relative_humidity_2m",
    "apparent_temperature",
    "is_day",
    "precipitation",
    "rain",
    "cloud_cover",
    "wind_speed_10m",
    "wind_direction_10m",
    "wind_gusts_10m",
];

pub const DAILY_VARIABLES: [&str; 3] = [
    "temperature_2m_max",
    "temperature_2m_min",
    "precipitation_probability_mean",
];

/// Client for the keyless Open-Meteo forecast API.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    base_url: String,
    http: Client,
}

impl Default for OpenMeteoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenMeteoProvider {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    fn query(request: &WeatherRequest) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", request.coordinates.latitude.to_string()),
            ("longitude", request.coordinates.longitude.to_string()),
            ("hourly", HOURLY_VARIABLES.join(",")),
            ("current", CURRENT_VARIABLES.join(",")),
            ("daily", DAILY_VARIABLES.join(",")),
            ("temperature_unit", request.temp_unit.provider_name().to_string()),
            ("wind_speed_unit", request.speed_unit.as_str().to_string()),
            ("timeformat", "unixtime".to_string()),
            ("forecast_days", "1".to_string()),
            ("models", "best_match".to_string()),
        ]
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    #[tracing::instrument(level = "debug", skip(self), fields(coordinates = %request.coordinates))]
    async fn fetch_weather(&self, request: &WeatherRequest) -> Result<WeatherSnapshot, FetchError> {
        let url = format!("{}/v1/forecast", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&Self::query(request))
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: OmResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(format!("invalid forecast JSON: {e}")))?;

        let snapshot = parsed.into_snapshot(request)?;
        tracing::debug!(
            hours = snapshot.hourly.len(),
            days = snapshot.daily.len(),
            "Weather data received from Open-Meteo"
        );
        Ok(snapshot)
    }
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    #[serde(default)]
    utc_offset_seconds: i64,
    hourly: Option<OmSeriesSection>,
    current: Option<OmCurrentSection>,
    daily: Option<OmSeriesSection>,
}

/// A columnar section: one `time` column plus one column per variable.
#[derive(Debug, Deserialize)]
struct OmSeriesSection {
    time: Vec<i64>,
    #[serde(flatten)]
    variables: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct OmCurrentSection {
    time: i64,
    #[serde(flatten)]
    variables: HashMap<String, Value>,
}

impl OmResponse {
    fn into_snapshot(self, request: &WeatherRequest) -> Result<WeatherSnapshot, FetchError> {
        let offset = self.utc_offset_seconds;
        let hourly = self.hourly.ok_or_else(|| missing_section("hourly"))?;
        let current = self.current.ok_or_else(|| missing_section("current"))?;
        let daily = self.daily.ok_or_else(|| missing_section("daily"))?;

        let hourly = HourlySeries {
            time: hourly.times(offset)?,
            temperature_2m: hourly.series("hourly", "temperature_2m")?,
            relative_humidity_2m: hourly.series("hourly", "relative_humidity_2m")?,
            dew_point_2m: hourly.series("hourly", "dew_point_2m")?,
            apparent_temperature: hourly.series("hourly", "apparent_temperature")?,
            precipitation_probability: hourly.series("hourly", "precipitation_probability")?,
            precipitation: hourly.series("hourly", "precipitation")?,
            rain: hourly.series("hourly", "rain")?,
            showers: hourly.series("hourly", "showers")?,
            snowfall: hourly.series("hourly", "snowfall")?,
            snow_depth: hourly.series("hourly", "snow_depth")?,
            cloud_cover: hourly.series("hourly", "cloud_cover")?,
            visibility: hourly.series("hourly", "visibility")?,
            wind_speed_10m: hourly.series("hourly", "wind_speed_10m")?,
            wind_direction_10m: hourly.series("hourly", "wind_direction_10m")?,
            uv_index: hourly.series("hourly", "uv_index")?,
        };

        let current = CurrentReading {
            time: to_instant(current.time, offset)?,
            temperature_2m: current.scalar("temperature_2m")?,
            relative_humidity_2m: current.scalar("relative_humidity_2m")?,
            apparent_temperature: current.scalar("apparent_temperature")?,
            is_day: current.scalar("is_day")?,
            precipitation: current.scalar("precipitation")?,
            rain: current.scalar("rain")?,
            cloud_cover: current.scalar("cloud_cover")?,
            wind_speed_10m: current.scalar("wind_speed_10m")?,
            wind_direction_10m: current.scalar("wind_direction_10m")?,
            wind_gusts_10m: current.scalar("wind_gusts_10m")?,
        };

        let daily = DailySeries {
            time: daily.times(offset)?,
            temperature_2m_max: daily.series("daily", "temperature_2m_max")?,
            temperature_2m_min: daily.series("daily", "temperature_2m_min")?,
            precipitation_probability_mean: daily
                .series("daily", "precipitation_probability_mean")?,
        };

        Ok(WeatherSnapshot {
            hourly,
            current,
            daily,
            temp_unit: request.temp_unit,
            speed_unit: request.speed_unit,
            latitude: request.coordinates.latitude,
            longitude: request.coordinates.longitude,
        })
    }
}

impl OmSeriesSection {
    fn times(&self, offset: i64) -> Result<Vec<DateTime<Utc>>, FetchError> {
        self.time.iter().map(|&t| to_instant(t, offset)).collect()
    }

    /// Pull one variable column, requiring it to line up with `time`.
    /// `null` entries become NaN.
    fn series(&self, section: &str, name: &str) -> Result<Vec<f32>, FetchError> {
        let value = self.variables.get(name).ok_or_else(|| {
            FetchError::Malformed(format!("{section} response is missing `{name}`"))
        })?;

        let values = Vec::<Option<f32>>::deserialize(value)
            .map_err(|e| FetchError::Malformed(format!("{section}.{name}: {e}")))?;

        if values.len() != self.time.len() {
            return Err(FetchError::Malformed(format!(
                "{section}.{name} has {} values for {} timestamps",
                values.len(),
                self.time.len()
            )));
        }

        Ok(values.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    }
}

impl OmCurrentSection {
    fn scalar(&self, name: &str) -> Result<f32, FetchError> {
        let value = self.variables.get(name).ok_or_else(|| {
            FetchError::Malformed(format!("current response is missing `{name}`"))
        })?;

        let value = Option::<f32>::deserialize(value)
            .map_err(|e| FetchError::Malformed(format!("current.{name}: {e}")))?;

        Ok(value.unwrap_or(f32::NAN))
    }
}

fn missing_section(section: &str) -> FetchError {
    FetchError::Malformed(format!("response has no {section} section"))
}

/// Provider timestamps are epoch seconds relative to `utc_offset_seconds`.
fn to_instant(epoch_seconds: i64, utc_offset_seconds: i64) -> Result<DateTime<Utc>, FetchError> {
    epoch_seconds
        .checked_add(utc_offset_seconds)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(|| FetchError::Malformed(format!("timestamp {epoch_seconds} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinates, SpeedUnit, TemperatureUnit};
    use serde_json::{Map, json};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const START: i64 = 1_700_000_000;

    fn new_york() -> WeatherRequest {
        WeatherRequest {
            coordinates: Coordinates::new(40.7, -74.0),
            temp_unit: TemperatureUnit::Fahrenheit,
            speed_unit: SpeedUnit::Mph,
        }
    }

    fn columns(names: &[&str], times: Vec<i64>, value: f64) -> Value {
        let mut section = Map::new();
        for name in names {
            section.insert((*name).to_string(), json!(vec![value; times.len()]));
        }
        section.insert("time".to_string(), json!(times));
        Value::Object(section)
    }

    fn forecast_body(hours: usize, utc_offset_seconds: i64) -> Value {
        let hourly_times: Vec<i64> = (0..hours as i64).map(|h| START + h * 3600).collect();

        let mut current = Map::new();
        for name in CURRENT_VARIABLES {
            current.insert(name.to_string(), json!(12.5));
        }
        current.insert("time".to_string(), json!(START));
        current.insert("interval".to_string(), json!(900));

        json!({
            "latitude": 40.710335,
            "longitude": -73.99307,
            "utc_offset_seconds": utc_offset_seconds,
            "timezone": "GMT",
            "hourly": columns(&HOURLY_VARIABLES, hourly_times, 3.0),
            "current": Value::Object(current),
            "daily": columns(&DAILY_VARIABLES, vec![START], 20.0),
        })
    }

    async fn serve(body: Value) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_fetch_sends_fixed_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("latitude", "40.7"))
            .and(query_param("longitude", "-74"))
            .and(query_param("temperature_unit", "fahrenheit"))
            .and(query_param("wind_speed_unit", "mph"))
            .and(query_param("forecast_days", "1"))
            .and(query_param("timeformat", "unixtime"))
            .and(query_param("models", "best_match"))
            .and(query_param("daily", DAILY_VARIABLES.join(",").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(24, 0)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = OpenMeteoProvider::with_base_url(mock_server.uri());
        let snapshot = provider.fetch_weather(&new_york()).await.unwrap();

        assert!(snapshot.current.temperature_2m.is_finite());
        assert_eq!(snapshot.temp_unit, TemperatureUnit::Fahrenheit);
        assert_eq!(snapshot.speed_unit, SpeedUnit::Mph);
        assert_eq!(snapshot.coordinates(), Coordinates::new(40.7, -74.0));
    }

    #[tokio::test]
    async fn test_series_lengths_match_timestamps() {
        let mock_server = serve(forecast_body(24, 0)).await;
        let provider = OpenMeteoProvider::with_base_url(mock_server.uri());

        let snapshot = provider.fetch_weather(&new_york()).await.unwrap();

        let hourly = &snapshot.hourly;
        assert_eq!(hourly.len(), 24);
        for series in [
            &hourly.temperature_2m,
            &hourly.relative_humidity_2m,
            &hourly.dew_point_2m,
            &hourly.apparent_temperature,
            &hourly.precipitation_probability,
            &hourly.precipitation,
            &hourly.rain,
            &hourly.showers,
            &hourly.snowfall,
            &hourly.snow_depth,
            &hourly.cloud_cover,
            &hourly.visibility,
            &hourly.wind_speed_10m,
            &hourly.wind_direction_10m,
            &hourly.uv_index,
        ] {
            assert_eq!(series.len(), hourly.len());
        }

        let daily = &snapshot.daily;
        assert_eq!(daily.len(), 1);
        assert_eq!(daily.temperature_2m_max.len(), 1);
        assert_eq!(daily.temperature_2m_min.len(), 1);
        assert_eq!(daily.precipitation_probability_mean.len(), 1);
    }

    #[tokio::test]
    async fn test_timestamps_apply_utc_offset() {
        let mock_server = serve(forecast_body(2, -18_000)).await;
        let provider = OpenMeteoProvider::with_base_url(mock_server.uri());

        let snapshot = provider.fetch_weather(&new_york()).await.unwrap();

        assert_eq!(snapshot.current.time.timestamp(), START - 18_000);
        assert_eq!(snapshot.hourly.time[1].timestamp(), START + 3600 - 18_000);
        assert_eq!(snapshot.daily.time[0].timestamp(), START - 18_000);
    }

    #[tokio::test]
    async fn test_null_values_become_nan() {
        let mut body = forecast_body(3, 0);
        body["hourly"]["snow_depth"] = json!([0.0, null, 0.0]);
        let mock_server = serve(body).await;
        let provider = OpenMeteoProvider::with_base_url(mock_server.uri());

        let snapshot = provider.fetch_weather(&new_york()).await.unwrap();

        assert!(snapshot.hourly.snow_depth[1].is_nan());
        assert_eq!(snapshot.hourly.snow_depth[2], 0.0);
    }

    #[tokio::test]
    async fn test_missing_variable_is_malformed() {
        let mut body = forecast_body(3, 0);
        body["hourly"].as_object_mut().unwrap().remove("uv_index");
        let mock_server = serve(body).await;
        let provider = OpenMeteoProvider::with_base_url(mock_server.uri());

        let err = provider.fetch_weather(&new_york()).await.unwrap_err();

        assert!(matches!(err, FetchError::Malformed(ref msg) if msg.contains("uv_index")));
    }

    #[tokio::test]
    async fn test_short_series_is_malformed() {
        let mut body = forecast_body(3, 0);
        body["daily"]["temperature_2m_min"] = json!([]);
        let mock_server = serve(body).await;
        let provider = OpenMeteoProvider::with_base_url(mock_server.uri());

        let err = provider.fetch_weather(&new_york()).await.unwrap_err();

        assert!(matches!(err, FetchError::Malformed(ref msg) if msg.contains("temperature_2m_min")));
    }

    #[tokio::test]
    async fn test_missing_section_is_malformed() {
        let mut body = forecast_body(3, 0);
        body.as_object_mut().unwrap().remove("current");
        let mock_server = serve(body).await;
        let provider = OpenMeteoProvider::with_base_url(mock_server.uri());

        let err = provider.fetch_weather(&new_york()).await.unwrap_err();

        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": true, "reason": "Latitude must be in range"})),
            )
            .mount(&mock_server)
            .await;

        let provider = OpenMeteoProvider::with_base_url(mock_server.uri());
        let err = provider.fetch_weather(&new_york()).await.unwrap_err();

        match err {
            FetchError::Status { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Latitude must be in range"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let provider = OpenMeteoProvider::with_base_url(mock_server.uri());
        let err = provider.fetch_weather(&new_york()).await.unwrap_err();

        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // reserve a free port, then release it so nothing is listening there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let provider = OpenMeteoProvider::with_base_url(format!("http://127.0.0.1:{port}"));
        let err = provider.fetch_weather(&new_york()).await.unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenMeteoProvider::with_base_url("http://localhost:8080/");
        assert_eq!(provider.base_url, "http://localhost:8080");
    }
}
