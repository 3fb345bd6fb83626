//! Messages exchanged with the host event bus, and the dispatcher that maps
//! inbound events onto the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::model::WeatherSnapshot;
use crate::scheduler::WeatherScheduler;
use crate::settings::Settings;

/// The only request value the widget answers.
pub const WEATHER_DATA_REQUEST: &str = "weather_data";

/// Outbound message to connected display clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    WeatherData(WeatherSnapshot),
}

/// Inbound event from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A client asks for data, e.g. `{"type":"get","request":"weather_data"}`.
    Get { request: String },
    /// The host settings store changed.
    Settings { payload: Settings },
    /// The host is shutting the widget down.
    Stop,
}

/// Delivers outbound messages to every connected client.
pub trait EventBridge: Send + Sync + Debug {
    fn send(&self, message: ClientMessage);
}

/// Whether the event loop should keep reading after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Handle one inbound event. Never fails; problems are logged.
pub async fn dispatch(
    scheduler: &WeatherScheduler,
    bridge: &dyn EventBridge,
    event: InboundEvent,
) -> Flow {
    match event {
        InboundEvent::Get { request } if request == WEATHER_DATA_REQUEST => {
            tracing::debug!("Getting weather data");
            match scheduler.get_weather().await {
                Some(snapshot) => bridge.send(ClientMessage::WeatherData(snapshot)),
                None => tracing::debug!("No weather data available yet"),
            }
            Flow::Continue
        }
        InboundEvent::Get { request } => {
            tracing::debug!(%request, "Ignoring unknown request");
            Flow::Continue
        }
        InboundEvent::Settings { payload } => {
            match payload.validate() {
                Ok(()) => {
                    tracing::debug!("Settings updating");
                    scheduler.update_settings(payload);
                }
                Err(err) => tracing::warn!(error = %err, "Ignoring invalid settings"),
            }
            Flow::Continue
        }
        InboundEvent::Stop => {
            scheduler.stop().await;
            Flow::Stop
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Collects every outbound message.
    #[derive(Debug, Default)]
    pub struct RecordingBridge {
        pub messages: Mutex<Vec<ClientMessage>>,
    }

    impl RecordingBridge {
        pub fn sent(&self) -> Vec<ClientMessage> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl EventBridge for RecordingBridge {
        fn send(&self, message: ClientMessage) {
            self.messages.lock().unwrap().push(message);
        }
    }
}
