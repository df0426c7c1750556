//! # Configuration
//!
//! Compile-time constants plus an optional `~/.qibla/config.toml`.
//! Override order: defaults → config file → env vars → CLI flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, Local, Offset, TimeDelta};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::compass_sensor::MagnetometerCalibration;
use crate::error::{Error, Result};
use crate::next_prayer::SelectorConfig;
use crate::position::Position;
use crate::prayer::{PrayerName, parse_time};
use crate::solar::{AsrMadhab, Method};

// ** GEODESY ** //

/// The Kaaba, Masjid al-Haram, Mecca.
pub const KAABA: Position = Position {
    latitude: 21.422487,
    longitude: 39.826206,
};
/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;
/// Jakarta, used when no location is configured and the GPS has no fix.
pub const FALLBACK_POSITION: Position = Position {
    latitude: -6.2088,
    longitude: 106.8456,
};

// ** PRAYER TIMES ** //

/// 18:00, assumed Maghrib when a schedule has none.
pub const MAGHRIB_FALLBACK_MINUTES: u32 = 18 * 60;
pub const NEXT_PRAYER_REFRESH_SECS: i64 = 60;
/// Duha begins this long after Shuruq.
pub const DEFAULT_DUHA_OFFSET_MINUTES: i64 = 20;
/// Sun altitude at sunrise and sunset: refraction plus the solar semi-diameter.
pub const HORIZON_DEPRESSION: f64 = 0.833;

// ** GPS ** //

pub const NMEA_DEVICE: &str = "/dev/serial0";
/// Give up on a fix after this many sentences.
pub const NMEA_MAX_SENTENCES: usize = 200;

// ** COMPASS CALIBRATION ** //

// Magnetometer calibration offsets (hard iron correction)
// Obtained from the calibrate binary: rotate board 360° and record min/max X,Y values
pub const X_OFFSET: f64 = -2776.0; // (X_min + X_max) / 2
pub const Y_OFFSET: f64 = 2556.0; // (Y_min + Y_max) / 2
pub const HEADING_OFFSET: f64 = 88.0; // Declination and mounting correction to true north
pub const COMPASS_POLL_INTERVAL_MS: u64 = 50;

// ** CONTENT ** //

pub const CONTENT_MAX_ATTEMPTS: u32 = 3;
pub const CONTENT_BASE_DELAY_MS: u64 = 1000;
pub const FALLBACK_PLACE: &str = "Masjid al-Haram";
pub const FALLBACK_QUOTE: &str =
    "Indeed, prayer has been decreed upon the believers a decree of specified times.";

// ============================================================================
// Config file (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct QiblaConfig {
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub prayer: PrayerConfig,
    #[serde(default)]
    pub selector: SelectorSection,
    #[serde(default)]
    pub compass: CompassConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub nmea_device: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PrayerConfig {
    pub method: Option<Method>,
    pub asr: Option<AsrMadhab>,
    /// Minutes east of UTC; the system offset when unset.
    pub utc_offset_minutes: Option<i32>,
    pub duha_offset_minutes: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SelectorSection {
    pub night_prayers: Option<Vec<PrayerName>>,
    /// "HH:MM"
    pub maghrib_fallback: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CompassConfig {
    pub x_offset: Option<f64>,
    pub y_offset: Option<f64>,
    pub heading_offset: Option<f64>,
    pub poll_interval_ms: Option<u64>,
}

/// Values given on the command line; `None` means not specified.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliOverrides {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub method: Option<Method>,
    pub asr: Option<AsrMadhab>,
}

// ============================================================================
// Resolved config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Fixed observer position, if one was configured anywhere.
    pub home: Option<Position>,
    pub nmea_device: PathBuf,
    pub method: Method,
    pub asr: AsrMadhab,
    pub utc_offset: FixedOffset,
    pub duha_offset: TimeDelta,
    pub selector: SelectorConfig,
    pub calibration: MagnetometerCalibration,
    pub poll_interval: Duration,
}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.qibla/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".qibla").join("config.toml"))
}

/// Load `~/.qibla/config.toml`, defaults when there is no home directory.
pub fn load_config() -> Result<QiblaConfig> {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => {
            warn!("Could not determine home directory, using default config");
            Ok(QiblaConfig::default())
        }
    }
}

/// A missing file is replaced by a commented-out default and yields
/// `QiblaConfig::default()`. A malformed file is `Error::ConfigParse`.
pub fn load_config_from(path: &Path) -> Result<QiblaConfig> {
    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(path);
        return Ok(QiblaConfig::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: QiblaConfig = toml::from_str(&contents)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

fn generate_default_config(path: &Path) {
    let default_content = r#"# Qibla configuration
# Every setting is optional; anything left out uses the built-in default.
# Override order: defaults -> this file -> env vars -> CLI flags.

# [location]
# latitude = -6.2088                 # Or set QIBLA_LAT
# longitude = 106.8456               # Or set QIBLA_LON
# nmea_device = "/dev/serial0"

# [prayer]
# method = "muslim_world_league"     # egyptian, karachi, north_america, kemenag
# asr = "standard"                   # or "hanafi"
# utc_offset_minutes = 420           # system offset when unset
# duha_offset_minutes = 20

# [selector]
# night_prayers = ["Isha", "Midnight", "LastThird"]
# maghrib_fallback = "18:00"

# [compass]
# x_offset = -2776.0
# y_offset = 2556.0
# heading_offset = 88.0
# poll_interval_ms = 50
"#;

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!("Failed to create config directory: {}", e);
        return;
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Collapse defaults → config file → env vars → CLI into concrete values.
pub fn resolve(config: &QiblaConfig, cli: &CliOverrides) -> Result<ResolvedConfig> {
    resolve_with_env(config, cli, |key| std::env::var(key).ok())
}

fn resolve_with_env(
    config: &QiblaConfig,
    cli: &CliOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let env_f64 = |key: &str| {
        env(key).and_then(|v| match v.trim().parse::<f64>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring {}={}: not a number", key, v);
                None
            }
        })
    };

    // Coordinates: CLI → env → config, each axis on its own
    let latitude = cli
        .latitude
        .or_else(|| env_f64("QIBLA_LAT"))
        .or(config.location.latitude);
    let longitude = cli
        .longitude
        .or_else(|| env_f64("QIBLA_LON"))
        .or(config.location.longitude);
    let home = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
        (None, None) => None,
        _ => {
            warn!("Only one coordinate configured, ignoring it");
            None
        }
    };

    let utc_offset = match config.prayer.utc_offset_minutes {
        Some(minutes) => FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
            Error::InvalidTime(format!("utc_offset_minutes = {}", minutes))
        })?,
        None => Local::now().offset().fix(),
    };

    let mut selector = SelectorConfig::default();
    if let Some(ref night) = config.selector.night_prayers {
        selector.night_prayers = night.clone();
    }
    if let Some(ref fallback) = config.selector.maghrib_fallback {
        selector.maghrib_fallback = parse_time(fallback)?;
    }

    let defaults = MagnetometerCalibration::default();
    let calibration = MagnetometerCalibration {
        x_offset: config.compass.x_offset.unwrap_or(defaults.x_offset),
        y_offset: config.compass.y_offset.unwrap_or(defaults.y_offset),
        heading_offset: config
            .compass
            .heading_offset
            .unwrap_or(defaults.heading_offset),
    };

    Ok(ResolvedConfig {
        home,
        nmea_device: config
            .location
            .nmea_device
            .as_deref()
            .unwrap_or(NMEA_DEVICE)
            .into(),
        method: cli.method.or(config.prayer.method).unwrap_or_default(),
        asr: cli.asr.or(config.prayer.asr).unwrap_or_default(),
        utc_offset,
        duha_offset: TimeDelta::minutes(
            config
                .prayer
                .duha_offset_minutes
                .unwrap_or(DEFAULT_DUHA_OFFSET_MINUTES),
        ),
        selector,
        calibration,
        poll_interval: Duration::from_millis(
            config
                .compass
                .poll_interval_ms
                .unwrap_or(COMPASS_POLL_INTERVAL_MS),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn fixed_offset_config() -> QiblaConfig {
        QiblaConfig {
            prayer: PrayerConfig {
                utc_offset_minutes: Some(420),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_uses_defaults_when_empty() -> Result<()> {
        let resolved = resolve_with_env(&fixed_offset_config(), &CliOverrides::default(), no_env)?;
        assert_eq!(resolved.home, None);
        assert_eq!(resolved.nmea_device, PathBuf::from(NMEA_DEVICE));
        assert_eq!(resolved.method, Method::MuslimWorldLeague);
        assert_eq!(resolved.asr, AsrMadhab::Standard);
        assert_eq!(resolved.utc_offset.local_minus_utc(), 7 * 3600);
        assert_eq!(resolved.duha_offset, TimeDelta::minutes(20));
        assert_eq!(resolved.selector, SelectorConfig::default());
        assert_eq!(resolved.calibration, MagnetometerCalibration::default());
        assert_eq!(resolved.poll_interval, Duration::from_millis(50));
        Ok(())
    }

    #[test]
    fn test_sparse_toml_parses() -> Result<()> {
        let config: QiblaConfig = toml::from_str(
            r#"
[prayer]
method = "kemenag"
"#,
        )?;
        assert_eq!(config.prayer.method, Some(Method::Kemenag));
        assert!(config.prayer.asr.is_none());
        assert!(config.location.latitude.is_none());
        Ok(())
    }

    #[test]
    fn test_full_toml() -> Result<()> {
        let config: QiblaConfig = toml::from_str(
            r#"
[location]
latitude = 51.5074
longitude = -0.1278
nmea_device = "/dev/ttyUSB0"

[prayer]
method = "north_america"
asr = "hanafi"
utc_offset_minutes = -300
duha_offset_minutes = 15

[selector]
night_prayers = ["Isha"]
maghrib_fallback = "19:30"

[compass]
x_offset = 10.0
heading_offset = 2.5
poll_interval_ms = 100
"#,
        )?;
        let resolved = resolve_with_env(&config, &CliOverrides::default(), no_env)?;
        assert_eq!(resolved.home, Some(Position::new(51.5074, -0.1278)));
        assert_eq!(resolved.nmea_device, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(resolved.method, Method::NorthAmerica);
        assert_eq!(resolved.asr, AsrMadhab::Hanafi);
        assert_eq!(resolved.utc_offset.local_minus_utc(), -5 * 3600);
        assert_eq!(resolved.duha_offset, TimeDelta::minutes(15));
        assert_eq!(resolved.selector.night_prayers, vec![PrayerName::Isha]);
        assert_eq!(
            resolved.selector.maghrib_fallback,
            NaiveTime::from_hms_opt(19, 30, 0).unwrap()
        );
        assert_eq!(resolved.calibration.x_offset, 10.0);
        assert_eq!(resolved.calibration.y_offset, Y_OFFSET);
        assert_eq!(resolved.calibration.heading_offset, 2.5);
        assert_eq!(resolved.poll_interval, Duration::from_millis(100));
        Ok(())
    }

    #[test]
    fn test_env_beats_file_and_cli_beats_env() -> Result<()> {
        let mut config = fixed_offset_config();
        config.location.latitude = Some(1.0);
        config.location.longitude = Some(2.0);
        config.prayer.method = Some(Method::Egyptian);

        let env = |key: &str| match key {
            "QIBLA_LAT" => Some("21.5".to_string()),
            "QIBLA_LON" => Some("39.2".to_string()),
            _ => None,
        };

        let resolved = resolve_with_env(&config, &CliOverrides::default(), env)?;
        assert_eq!(resolved.home, Some(Position::new(21.5, 39.2)));
        assert_eq!(resolved.method, Method::Egyptian);

        let cli = CliOverrides {
            latitude: Some(-33.9),
            method: Some(Method::Karachi),
            ..Default::default()
        };
        let resolved = resolve_with_env(&config, &cli, env)?;
        assert_eq!(resolved.home, Some(Position::new(-33.9, 39.2)));
        assert_eq!(resolved.method, Method::Karachi);
        Ok(())
    }

    #[test]
    fn test_bad_env_value_is_ignored() -> Result<()> {
        let mut config = fixed_offset_config();
        config.location.latitude = Some(1.0);
        config.location.longitude = Some(2.0);
        let env = |key: &str| (key == "QIBLA_LAT").then(|| "north".to_string());

        let resolved = resolve_with_env(&config, &CliOverrides::default(), env)?;
        assert_eq!(resolved.home, Some(Position::new(1.0, 2.0)));
        Ok(())
    }

    #[test]
    fn test_single_coordinate_is_dropped() -> Result<()> {
        let mut config = fixed_offset_config();
        config.location.latitude = Some(1.0);
        let resolved = resolve_with_env(&config, &CliOverrides::default(), no_env)?;
        assert_eq!(resolved.home, None);
        Ok(())
    }

    #[test]
    fn test_bad_maghrib_fallback() {
        let mut config = fixed_offset_config();
        config.selector.maghrib_fallback = Some("sunset".to_string());
        let result = resolve_with_env(&config, &CliOverrides::default(), no_env);
        assert!(matches!(result, Err(Error::InvalidTime(_))));
    }

    #[test]
    fn test_missing_file_generates_default() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("qibla-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = fs::remove_dir_all(&dir);

        let config = load_config_from(&path)?;
        assert!(config.location.latitude.is_none());
        assert!(path.exists());

        // the generated file is all comments and loads as defaults
        let reloaded = load_config_from(&path)?;
        assert!(reloaded.prayer.method.is_none());

        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_parse_error() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("qibla-bad-config-{}", std::process::id()));
        fs::create_dir_all(&dir)?;
        let path = dir.join("config.toml");
        fs::write(&path, "[location]\nlatitude = \"north\"\n")?;

        let result = load_config_from(&path);
        assert!(matches!(result, Err(Error::ConfigParse(_))));

        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
