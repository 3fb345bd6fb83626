use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use inquire::{CustomType, CustomUserError, Select, validator::Validation};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use weather_widget_core::{
    Config, Flow, LATITUDE_RANGE, LONGITUDE_RANGE, OpenMeteoProvider, SpeedUnit,
    TemperatureUnit, WeatherProvider, WeatherScheduler, WeatherSnapshot, dispatch, geolocate,
};

use crate::stdio::{StdoutBridge, parse_event};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-widget", version, about = "Weather and clock widget server")]
pub struct Cli {
    /// Use this config file instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the widget server, speaking JSON lines on stdin/stdout.
    Serve,

    /// Fetch the weather once and print it.
    Show {
        /// Latitude in degrees; overrides the configured value.
        #[arg(long, allow_hyphen_values = true)]
        latitude: Option<f64>,

        /// Longitude in degrees; overrides the configured value.
        #[arg(long, allow_hyphen_values = true)]
        longitude: Option<f64>,

        /// Report temperatures in Celsius.
        #[arg(long)]
        celsius: bool,

        /// Report wind speeds in km/h.
        #[arg(long)]
        kmh: bool,
    },

    /// Interactively set units and coordinates.
    Configure,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;

        match self.command {
            Command::Serve => serve(config).await,
            Command::Show {
                latitude,
                longitude,
                celsius,
                kmh,
            } => {
                let mut config = config;
                let settings = &mut config.settings;
                if let Some(latitude) = latitude {
                    settings.latitude = latitude;
                }
                if let Some(longitude) = longitude {
                    settings.longitude = longitude;
                }
                if celsius {
                    settings.temp_unit = TemperatureUnit::Celsius;
                }
                if kmh {
                    settings.speed_unit = SpeedUnit::Kmh;
                }
                settings.validate()?;
                show(config).await
            }
            Command::Configure => {
                let config = configure(config)?;
                let path = match &self.config {
                    Some(path) => {
                        config.save_to(path)?;
                        path.clone()
                    }
                    None => config.save()?,
                };
                println!("Saved configuration to {}", path.display());
                Ok(())
            }
        }
    }

    fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let settings =
        geolocate::bootstrap(config.settings.clone(), &config.endpoints.geolocation_url).await;

    let (bridge, writer) = StdoutBridge::spawn();
    let bridge = Arc::new(bridge);
    let provider = Arc::new(OpenMeteoProvider::with_base_url(
        config.endpoints.weather_base_url.as_str(),
    ));

    let scheduler = WeatherScheduler::spawn(
        provider,
        bridge.clone(),
        settings,
        config.scheduler_options(),
    )
    .await;
    tracing::info!("Weather widget server started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        let Some(event) = parse_event(&line) else {
            continue;
        };
        if dispatch(&scheduler, bridge.as_ref(), event).await == Flow::Stop {
            break;
        }
    }

    scheduler.stop().await;
    drop(scheduler);
    drop(bridge);

    writer.await.context("Client writer task failed")??;
    tracing::info!("Weather widget server stopped");
    Ok(())
}

async fn show(config: Config) -> Result<()> {
    let settings = geolocate::bootstrap(config.settings, &config.endpoints.geolocation_url).await;
    let request = settings.weather_request();

    if !request.coordinates.is_set() {
        bail!(
            "No latitude or longitude set.\n\
             Hint: run `weather-widget configure` or pass --latitude and --longitude."
        );
    }

    let provider = OpenMeteoProvider::with_base_url(config.endpoints.weather_base_url.as_str());
    let snapshot = provider
        .fetch_weather(&request)
        .await
        .context("Failed to fetch weather")?;

    print!("{}", render(&snapshot));
    Ok(())
}

fn render(snapshot: &WeatherSnapshot) -> String {
    let temp = snapshot.temp_unit.symbol();
    let speed = snapshot.speed_unit.as_str();
    let current = &snapshot.current;
    let daily = &snapshot.daily;

    let mut out = format!("Weather at {}\n", snapshot.coordinates());
    out.push_str(&format!(
        "  Now       {:.1}{temp} (feels like {:.1}{temp}), humidity {:.0}%, {}\n",
        current.temperature_2m,
        current.apparent_temperature,
        current.relative_humidity_2m,
        if current.is_day >= 1.0 { "day" } else { "night" },
    ));
    out.push_str(&format!(
        "  Wind      {:.1} {speed} from {:.0}°, gusts {:.1} {speed}\n",
        current.wind_speed_10m, current.wind_direction_10m, current.wind_gusts_10m,
    ));
    out.push_str(&format!(
        "  Sky       {:.0}% cloud, {:.1} precipitation\n",
        current.cloud_cover, current.precipitation,
    ));

    if let (Some(high), Some(low), Some(chance)) = (
        daily.temperature_2m_max.first(),
        daily.temperature_2m_min.first(),
        daily.precipitation_probability_mean.first(),
    ) {
        out.push_str(&format!(
            "  Today     high {high:.1}{temp} / low {low:.1}{temp}, {chance:.0}% chance of precipitation\n"
        ));
    }

    out.push_str(&format!("  Observed  {}\n", local_time(current.time)));
    out
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn configure(mut config: Config) -> Result<Config> {
    let settings = &mut config.settings;

    let temp_options = vec!["Fahrenheit", "Celsius"];
    let cursor = match settings.temp_unit {
        TemperatureUnit::Fahrenheit => 0,
        TemperatureUnit::Celsius => 1,
    };
    let choice = Select::new("Temperature unit:", temp_options)
        .with_starting_cursor(cursor)
        .prompt()?;
    settings.temp_unit = match choice {
        "Celsius" => TemperatureUnit::Celsius,
        _ => TemperatureUnit::Fahrenheit,
    };

    let speed_options = vec!["Miles Per Hour", "Kilometers Per Hour"];
    let cursor = match settings.speed_unit {
        SpeedUnit::Mph => 0,
        SpeedUnit::Kmh => 1,
    };
    let choice = Select::new("Wind speed unit:", speed_options)
        .with_starting_cursor(cursor)
        .prompt()?;
    settings.speed_unit = match choice {
        "Kilometers Per Hour" => SpeedUnit::Kmh,
        _ => SpeedUnit::Mph,
    };

    settings.latitude = CustomType::<f64>::new("Latitude:")
        .with_default(settings.latitude)
        .with_help_message("Degrees north, -90 to 90. 0 leaves it unset.")
        .with_validator(|value: &f64| -> Result<Validation, CustomUserError> {
            if LATITUDE_RANGE.contains(value) {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("Latitude must be between -90 and 90".into()))
            }
        })
        .prompt()?;

    settings.longitude = CustomType::<f64>::new("Longitude:")
        .with_default(settings.longitude)
        .with_help_message("Degrees east, -180 to 180. 0 leaves it unset.")
        .with_validator(|value: &f64| -> Result<Validation, CustomUserError> {
            if LONGITUDE_RANGE.contains(value) {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("Longitude must be between -180 and 180".into()))
            }
        })
        .prompt()?;

    config.validate()?;
    Ok(config)
}
