//! Owns the cached [`WeatherSnapshot`] and keeps it fresh.
//!
//! Foreground reads and the background loop share one refresh path. An async
//! mutex held across check-staleness, fetch and replace keeps at most one
//! upstream call outstanding, and callers that queued behind an attempt get
//! that attempt's result instead of starting their own.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bridge::{ClientMessage, EventBridge};
use crate::model::WeatherSnapshot;
use crate::provider::WeatherProvider;
use crate::settings::Settings;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Staleness window, and the sleep between background refreshes.
    pub refresh_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    snapshot: Option<WeatherSnapshot>,
    /// Start of the last successful attempt. `None` forces the next read to refresh.
    refreshed_at: Option<Instant>,
    updated_at: Option<DateTime<Utc>>,
}

impl CacheState {
    fn is_fresh(&self, window: Duration) -> bool {
        self.refreshed_at.is_some_and(|at| at.elapsed() < window)
    }
}

struct BackgroundLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    provider: Arc<dyn WeatherProvider>,
    bridge: Arc<dyn EventBridge>,
    options: SchedulerOptions,
    settings: watch::Sender<Settings>,
    cache: Mutex<CacheState>,
    /// Bumped after every attempt, while `cache` is still locked.
    attempts: AtomicU64,
    background: Mutex<Option<BackgroundLoop>>,
}

/// Handle to the process's weather cache. Clones share the same state.
#[derive(Clone)]
pub struct WeatherScheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for WeatherScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherScheduler")
            .field("provider", &self.inner.provider)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl WeatherScheduler {
    /// Build a scheduler without starting the background loop.
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        bridge: Arc<dyn EventBridge>,
        settings: Settings,
        options: SchedulerOptions,
    ) -> Self {
        let (settings, _) = watch::channel(settings);
        Self {
            inner: Arc::new(Inner {
                provider,
                bridge,
                options,
                settings,
                cache: Mutex::new(CacheState::default()),
                attempts: AtomicU64::new(0),
                background: Mutex::new(None),
            }),
        }
    }

    /// Build a scheduler and start refreshing right away.
    pub async fn spawn(
        provider: Arc<dyn WeatherProvider>,
        bridge: Arc<dyn EventBridge>,
        settings: Settings,
        options: SchedulerOptions,
    ) -> Self {
        let scheduler = Self::new(provider, bridge, settings, options);
        scheduler.start().await;
        scheduler
    }

    /// Return the cached snapshot, refreshing first if it is stale.
    ///
    /// `None` means no refresh has ever succeeded.
    pub async fn get_weather(&self) -> Option<WeatherSnapshot> {
        self.refresh_if_stale().await
    }

    /// Replace the coordinates and units used by later refreshes.
    ///
    /// The cached snapshot is left alone until it goes stale.
    pub fn update_settings(&self, settings: Settings) {
        self.inner.settings.send_replace(settings);
    }

    /// Settings the next refresh will use.
    pub fn settings(&self) -> Settings {
        self.inner.settings.borrow().clone()
    }

    /// Wall-clock time of the last successful refresh.
    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.inner.cache.lock().await.updated_at
    }

    /// Whether a background loop is currently alive.
    pub async fn is_running(&self) -> bool {
        self.inner
            .background
            .lock()
            .await
            .as_ref()
            .is_some_and(|bg| !bg.handle.is_finished())
    }

    /// Start the background loop: one attempt now, then one per interval.
    /// Does nothing if a loop is already running.
    pub async fn start(&self) {
        let mut background = self.inner.background.lock().await;
        if background.as_ref().is_some_and(|bg| !bg.handle.is_finished()) {
            tracing::debug!("Background weather refresh already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
        *background = Some(BackgroundLoop { shutdown, handle });
    }

    /// Stop scheduling refreshes and forget when the cache was last filled.
    ///
    /// A fetch already in flight is allowed to finish. Safe to call repeatedly.
    pub async fn stop(&self) {
        if let Some(background) = self.inner.background.lock().await.take() {
            background.shutdown.send_replace(true);
        }

        let mut cache = self.inner.cache.lock().await;
        cache.refreshed_at = None;
        cache.updated_at = None;
        tracing::info!("Weather scheduler stopped");
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.inner.options.refresh_interval;
        tracing::info!(interval_secs = interval.as_secs(), "Background weather refresh started");

        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }

            self.refresh_if_stale().await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::debug!("Background weather refresh ended");
    }

    async fn refresh_if_stale(&self) -> Option<WeatherSnapshot> {
        let seen = self.inner.attempts.load(Ordering::Acquire);
        let mut cache = self.inner.cache.lock().await;

        if self.inner.attempts.load(Ordering::Acquire) != seen {
            tracing::debug!("Using result of refresh that completed while waiting");
            return cache.snapshot.clone();
        }

        if cache.is_fresh(self.inner.options.refresh_interval) {
            tracing::debug!("Returning cached weather data");
            return cache.snapshot.clone();
        }

        self.refresh(&mut cache).await;
        self.inner.attempts.fetch_add(1, Ordering::AcqRel);
        cache.snapshot.clone()
    }

    /// One refresh attempt. Failures leave the cache untouched.
    async fn refresh(&self, cache: &mut CacheState) {
        let request = self.inner.settings.borrow().weather_request();

        if !request.coordinates.is_set() {
            tracing::warn!("No latitude or longitude set, not updating weather data");
            return;
        }

        let started = Instant::now();
        tracing::debug!(coordinates = %request.coordinates, "Fetching weather data");

        match self.inner.provider.fetch_weather(&request).await {
            Ok(snapshot) => {
                cache.snapshot = Some(snapshot.clone());
                cache.refreshed_at = Some(started);
                cache.updated_at = Some(Utc::now());
                tracing::info!(coordinates = %request.coordinates, "Weather updated");
                self.inner.bridge.send(ClientMessage::WeatherData(snapshot));
            }
            Err(err) => {
                tracing::warn!(error = %err, "Weather refresh failed, keeping previous data");
            }
        }
    }
}
