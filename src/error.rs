use thiserror::Error;

use crate::prayer::PrayerName;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a remote collaborator (text generation, weather).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Timeout, DNS, connection refused.
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response arrived but could not be understood.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Network failures, rate limits and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Parse(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("unknown prayer label: {0}")]
    UnknownPrayer(String),

    #[error("duplicate prayer in schedule: {0}")]
    DuplicatePrayer(PrayerName),

    #[error("sun never reaches the {prayer} angle on {date} at this latitude")]
    NoSolarEvent {
        prayer: PrayerName,
        date: chrono::NaiveDate,
    },

    #[error("compass sensor error: {0}")]
    Sensor(String),

    #[error("no GPS fix available")]
    NoFix,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
