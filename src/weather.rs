//! Weather widget data.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::position::Position;

/// Condition groups of the WMO weather interpretation codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Overcast,
    Fog,
    Drizzle,
    Rain,
    Snow,
    Thunderstorm,
    Unknown,
}

impl WeatherCondition {
    pub fn from_wmo_code(code: u8) -> Self {
        match code {
            0 => WeatherCondition::Clear,
            1 | 2 => WeatherCondition::PartlyCloudy,
            3 => WeatherCondition::Overcast,
            45 | 48 => WeatherCondition::Fog,
            51..=57 => WeatherCondition::Drizzle,
            61..=67 | 80..=82 => WeatherCondition::Rain,
            71..=77 | 85 | 86 => WeatherCondition::Snow,
            95..=99 => WeatherCondition::Thunderstorm,
            _ => WeatherCondition::Unknown,
        }
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WeatherCondition::Clear => "Clear",
            WeatherCondition::PartlyCloudy => "Partly cloudy",
            WeatherCondition::Overcast => "Overcast",
            WeatherCondition::Fog => "Fog",
            WeatherCondition::Drizzle => "Drizzle",
            WeatherCondition::Rain => "Rain",
            WeatherCondition::Snow => "Snow",
            WeatherCondition::Thunderstorm => "Thunderstorm",
            WeatherCondition::Unknown => "Unknown",
        };
        write!(f, "{}", label)
    }
}

/// Current conditions at the observer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub temperature_celsius: f64,
    pub condition: WeatherCondition,
    pub wind_speed_kmh: f64,
    pub wind_direction: f64,
    pub observed_at: NaiveDateTime,
}

// Open-Meteo `current_weather` payload
#[derive(Deserialize)]
struct OpenMeteoResponse {
    current_weather: OpenMeteoCurrent,
}

#[derive(Deserialize)]
struct OpenMeteoCurrent {
    temperature: f64,
    windspeed: f64,
    winddirection: f64,
    weathercode: u8,
    time: String,
}

impl WeatherReport {
    /// Parse an Open-Meteo forecast response carrying `current_weather`.
    pub fn from_open_meteo(json: &str) -> Result<Self, ProviderError> {
        let response: OpenMeteoResponse =
            serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
        let current = response.current_weather;
        let observed_at = NaiveDateTime::parse_from_str(&current.time, "%Y-%m-%dT%H:%M")
            .map_err(|e| ProviderError::Parse(format!("time '{}': {}", current.time, e)))?;

        Ok(Self {
            temperature_celsius: current.temperature,
            condition: WeatherCondition::from_wmo_code(current.weathercode),
            wind_speed_kmh: current.windspeed,
            wind_direction: current.winddirection,
            observed_at,
        })
    }
}

impl fmt::Display for WeatherReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.0}°C {}, wind {:.0} km/h",
            self.temperature_celsius, self.condition, self.wind_speed_kmh
        )
    }
}

pub trait WeatherProvider {
    fn current(&self, position: &Position) -> Result<WeatherReport, ProviderError>;
}

/// A saved Open-Meteo response on disk.
pub struct WeatherFile(pub PathBuf);

impl WeatherProvider for WeatherFile {
    fn current(&self, _position: &Position) -> Result<WeatherReport, ProviderError> {
        let json = fs::read_to_string(&self.0)
            .map_err(|e| ProviderError::Network(format!("{}: {}", self.0.display(), e)))?;
        WeatherReport::from_open_meteo(&json)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", content = "report", rename_all = "snake_case")]
pub enum WeatherState {
    NoData,
    Ready(WeatherReport),
}

/// One fetch, no retries. Any failure leaves the widget empty.
pub fn refresh_weather(provider: &dyn WeatherProvider, position: &Position) -> WeatherState {
    match provider.current(position) {
        Ok(report) => {
            debug!("Weather at {}: {}", position, report);
            WeatherState::Ready(report)
        }
        Err(e) => {
            warn!("Weather unavailable: {}", e);
            WeatherState::NoData
        }
    }
}
