use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info, warn};
use nmea::Nmea;
use serde::Serialize;

use crate::config::NMEA_MAX_SENTENCES;
use crate::error::{Error, Result};
use crate::position::Position;

/// Anything that can tell where the observer is.
pub trait LocationProvider {
    fn locate(&mut self) -> Result<Position>;
}

/// A fixed coordinate: a configured home location or the built-in fallback.
pub struct StaticLocation(pub Position);

impl LocationProvider for StaticLocation {
    fn locate(&mut self) -> Result<Position> {
        Ok(self.0)
    }
}

/// Latest GPS state accumulated from NMEA sentences.
#[derive(Debug, Default)]
pub struct GpsTracker {
    current_position: Option<Position>,
    num_satellites: Option<u32>,
    hdop: Option<f32>,
}

impl GpsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_current_position(&self) -> Option<Position> {
        self.current_position
    }

    pub fn get_num_satellites(&self) -> Option<u32> {
        self.num_satellites
    }

    pub fn get_hdop(&self) -> Option<f32> {
        self.hdop
    }

    pub fn update_position(&mut self, lat: f64, lon: f64) {
        self.current_position = Some(Position::new(lat, lon));
    }

    /// Copy whatever the parser knows after the latest sentence.
    pub fn ingest(&mut self, nmea: &Nmea) {
        if let (Some(lat), Some(lon)) = (nmea.latitude, nmea.longitude) {
            self.update_position(lat, lon);
        }
        if let Some(num_sats) = nmea.num_of_fix_satellites {
            self.num_satellites = Some(u32::from(num_sats));
        }
        if let Some(hdop) = nmea.hdop {
            self.hdop = Some(hdop);
        }
    }
}

/// Reads NMEA sentences until the first position fix.
pub struct NmeaLocationProvider<R: BufRead> {
    reader: R,
    max_sentences: usize,
    tracker: GpsTracker,
}

impl NmeaLocationProvider<BufReader<File>> {
    /// Serial device such as `/dev/serial0`, or a recorded log file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening NMEA source {}", path.display());
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> NmeaLocationProvider<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_sentences: NMEA_MAX_SENTENCES,
            tracker: GpsTracker::new(),
        }
    }

    pub fn with_max_sentences(mut self, max_sentences: usize) -> Self {
        self.max_sentences = max_sentences;
        self
    }

    pub fn tracker(&self) -> &GpsTracker {
        &self.tracker
    }
}

impl<R: BufRead> LocationProvider for NmeaLocationProvider<R> {
    fn locate(&mut self) -> Result<Position> {
        let mut nmea = Nmea::default();
        let mut line = String::new();
        let mut sentences = 0;

        while sentences < self.max_sentences {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            sentences += 1;

            if let Err(e) = nmea.parse(trimmed) {
                debug!("Skipping NMEA sentence '{}': {}", trimmed, e);
                continue;
            }
            self.tracker.ingest(&nmea);

            if let Some(pos) = self.tracker.get_current_position() {
                info!(
                    "GPS fix {} after {} sentences ({} satellites)",
                    pos,
                    sentences,
                    self.tracker
                        .get_num_satellites()
                        .map_or("?".to_string(), |n| n.to_string())
                );
                return Ok(pos);
            }
        }

        Err(Error::NoFix)
    }
}

/// Where the observer position came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LocationSource {
    Device,
    Fallback,
}

/// Ask the provider, and fall back to a fixed coordinate on any failure.
pub fn locate_or_fallback(
    provider: &mut dyn LocationProvider,
    fallback: Position,
) -> (Position, LocationSource) {
    match provider.locate() {
        Ok(pos) => (pos, LocationSource::Device),
        Err(e) => {
            warn!("Location unavailable ({}), using fallback {}", e, fallback);
            (fallback, LocationSource::Fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GGA_FIX: &str =
        "$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76";
    const GSA: &str = "$GPGSA,A,3,10,07,05,02,29,04,08,13,,,,,1.72,1.03,1.38*0A";
    const GGA_NO_FIX: &str = "$GPGGA,092750.000,,,,,0,0,,,M,,M,,*41";

    struct FailingProvider;

    impl LocationProvider for FailingProvider {
        fn locate(&mut self) -> Result<Position> {
            Err(Error::NoFix)
        }
    }

    #[test]
    fn test_gps_tracker_initialization() {
        let tracker = GpsTracker::new();
        assert!(tracker.get_current_position().is_none());
        assert!(tracker.get_num_satellites().is_none());
        assert!(tracker.get_hdop().is_none());
    }

    #[test]
    fn test_first_fix_from_nmea() -> Result<()> {
        let log = format!("garbage line\n\n{}\n{}\n", GSA, GGA_FIX);
        let mut provider = NmeaLocationProvider::new(Cursor::new(log));

        let pos = provider.locate()?;
        assert!((pos.latitude - 53.361336).abs() < 1e-5);
        assert!((pos.longitude - -6.505620).abs() < 1e-5);
        assert_eq!(provider.tracker().get_num_satellites(), Some(8));
        Ok(())
    }

    #[test]
    fn test_no_fix_is_an_error() {
        let log = format!("{}\n{}\n", GSA, GGA_NO_FIX);
        let mut provider = NmeaLocationProvider::new(Cursor::new(log));
        assert!(matches!(provider.locate(), Err(Error::NoFix)));
    }

    #[test]
    fn test_sentence_budget() {
        let log = format!("{}\n{}\n{}\n", GSA, GSA, GGA_FIX);
        let mut provider = NmeaLocationProvider::new(Cursor::new(log)).with_max_sentences(2);
        assert!(matches!(provider.locate(), Err(Error::NoFix)));
    }

    #[test]
    fn test_locate_or_fallback() {
        let fallback = Position::new(-6.2088, 106.8456);

        let (pos, source) = locate_or_fallback(&mut FailingProvider, fallback);
        assert_eq!(pos, fallback);
        assert_eq!(source, LocationSource::Fallback);

        let home = Position::new(51.5074, -0.1278);
        let (pos, source) = locate_or_fallback(&mut StaticLocation(home), fallback);
        assert_eq!(pos, home);
        assert_eq!(source, LocationSource::Device);
    }

    #[test]
    fn test_missing_device_is_io_error() {
        let result = NmeaLocationProvider::open("/nonexistent/serial0");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
