use async_trait::async_trait;
use std::fmt::Debug;

use crate::model::{WeatherRequest, WeatherSnapshot};

pub mod openmeteo;

pub use openmeteo::OpenMeteoProvider;

/// Every way an upstream fetch can fail.
///
/// The scheduler treats all variants alike; the split only exists for
/// diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("weather request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("weather request timed out")]
    Timeout,

    #[error("weather provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed weather response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err)
        }
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Fetch a full snapshot for the given coordinates and units.
    ///
    /// Callers are expected to have checked that the coordinates are set.
    async fn fetch_weather(&self, request: &WeatherRequest) -> Result<WeatherSnapshot, FetchError>;
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
