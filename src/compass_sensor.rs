use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};

// Use rppal in production
#[cfg(not(test))]
use rppal::i2c::I2c;

#[cfg(test)]
// This is only used in testing, not compiled in release.
use crate::mocks::mock_i2c::I2c;

use crate::compass::normalize_degrees;
use crate::config::{HEADING_OFFSET, X_OFFSET, Y_OFFSET};
use crate::error::{Error, Result};
use crate::orientation::{OrientationEvent, OrientationSensor};

const LIS3MDL_ADDR: u16 = 0x1C;

// LIS3MDL Register addresses
const WHO_AM_I: u8 = 0x0F;
const CTRL_REG1: u8 = 0x20;
const CTRL_REG2: u8 = 0x21;
const CTRL_REG3: u8 = 0x22;
const CTRL_REG4: u8 = 0x23;
const CTRL_REG5: u8 = 0x24;
const STATUS_REG: u8 = 0x27;
const OUT_X_L: u8 = 0x28;

const LIS3MDL_ID: u8 = 0x3D;
/// STATUS_REG bit: new X, Y and Z data available.
const ZYXDA: u8 = 0x08;

fn i2c_error(e: impl std::fmt::Display) -> Error {
    Error::Sensor(e.to_string())
}

/// Hard-iron offsets plus the final correction to true north.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MagnetometerCalibration {
    pub x_offset: f64,
    pub y_offset: f64,
    /// Declination and mounting correction, degrees.
    pub heading_offset: f64,
}

impl Default for MagnetometerCalibration {
    fn default() -> Self {
        Self {
            x_offset: X_OFFSET,
            y_offset: Y_OFFSET,
            heading_offset: HEADING_OFFSET,
        }
    }
}

impl MagnetometerCalibration {
    /// Heading in [0, 360) from raw X/Y field readings.
    pub fn heading(&self, x_raw: f64, y_raw: f64) -> f64 {
        let x = x_raw - self.x_offset;
        let y = y_raw - self.y_offset;
        normalize_degrees(y.atan2(x).to_degrees() + self.heading_offset)
    }
}

/// Running min/max of raw readings while the board is turned through 360°.
#[derive(Clone, Copy, Debug)]
pub struct HardIronCalibration {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    samples: usize,
}

impl Default for HardIronCalibration {
    fn default() -> Self {
        Self {
            x_min: f64::MAX,
            x_max: f64::MIN,
            y_min: f64::MAX,
            y_max: f64::MIN,
            samples: 0,
        }
    }
}

impl HardIronCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64, y: f64) {
        self.x_min = self.x_min.min(x);
        self.x_max = self.x_max.max(x);
        self.y_min = self.y_min.min(y);
        self.y_max = self.y_max.max(y);
        self.samples += 1;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.x_min, self.x_max)
    }

    pub fn y_range(&self) -> (f64, f64) {
        (self.y_min, self.y_max)
    }

    /// Centre of the measured circle, `None` before the first sample.
    pub fn offsets(&self) -> Option<(f64, f64)> {
        if self.samples == 0 {
            return None;
        }
        Some((
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        ))
    }
}

/// LIS3MDL magnetometer on the I2C bus.
pub struct CompassSensor {
    i2c: I2c,
    calibration: MagnetometerCalibration,
}

impl CompassSensor {
    pub fn new(calibration: MagnetometerCalibration) -> Result<Self> {
        let mut i2c = I2c::new().map_err(i2c_error)?;
        i2c.set_slave_address(LIS3MDL_ADDR).map_err(i2c_error)?;

        let who_am_i = i2c.smbus_read_byte(WHO_AM_I).map_err(i2c_error)?;
        if who_am_i != LIS3MDL_ID {
            return Err(Error::Sensor(format!(
                "wrong device ID: 0x{:02X}, expected 0x{:02X}",
                who_am_i, LIS3MDL_ID
            )));
        }

        // Temperature enabled, ultra-high performance X/Y, 80 Hz
        i2c.smbus_write_byte(CTRL_REG1, 0xFC).map_err(i2c_error)?;
        // Full scale ±4 gauss
        i2c.smbus_write_byte(CTRL_REG2, 0x00).map_err(i2c_error)?;
        // Continuous conversion
        i2c.smbus_write_byte(CTRL_REG3, 0x00).map_err(i2c_error)?;
        // Ultra-high performance Z, little endian
        i2c.smbus_write_byte(CTRL_REG4, 0x0C).map_err(i2c_error)?;
        // Block data update
        i2c.smbus_write_byte(CTRL_REG5, 0x40).map_err(i2c_error)?;

        std::thread::sleep(std::time::Duration::from_millis(100));

        let status = i2c.smbus_read_byte(STATUS_REG).map_err(i2c_error)?;
        if status == 0 {
            return Err(Error::Sensor(
                "magnetometer not responding (no data ready)".to_string(),
            ));
        }

        info!("Compass (LIS3MDL) initialized");
        Ok(Self { i2c, calibration })
    }

    /// Raw X/Y field, `None` when no new sample is ready.
    pub fn read_raw_magnetometer(&mut self) -> Result<Option<(f64, f64)>> {
        let status = self.i2c.smbus_read_byte(STATUS_REG).map_err(i2c_error)?;
        if status & ZYXDA == 0 {
            return Ok(None);
        }

        // Read 6 bytes starting from OUT_X_L (auto-increment enabled)
        let mut data = [0u8; 6];
        for (i, item) in data.iter_mut().enumerate() {
            *item = self
                .i2c
                .smbus_read_byte(OUT_X_L + i as u8)
                .map_err(i2c_error)?;
        }

        let x = i16::from_le_bytes([data[0], data[1]]) as f64;
        let y = i16::from_le_bytes([data[2], data[3]]) as f64;
        Ok(Some((x, y)))
    }

    pub fn read_heading(&mut self) -> Result<Option<f64>> {
        Ok(self
            .read_raw_magnetometer()?
            .map(|(x, y)| self.calibration.heading(x, y)))
    }
}

/// Orientation source backed by the magnetometer. The bus is opened on the
/// grant request; failing to open it counts as a refusal.
pub struct MagnetometerSensor {
    calibration: MagnetometerCalibration,
    compass: Option<CompassSensor>,
}

impl MagnetometerSensor {
    pub fn new(calibration: MagnetometerCalibration) -> Self {
        Self {
            calibration,
            compass: None,
        }
    }
}

impl OrientationSensor for MagnetometerSensor {
    fn requires_grant(&self) -> bool {
        true
    }

    fn request_grant(&mut self) -> Result<bool> {
        match CompassSensor::new(self.calibration) {
            Ok(compass) => {
                self.compass = Some(compass);
                Ok(true)
            }
            Err(e) => {
                warn!("Magnetometer unavailable: {}", e);
                Ok(false)
            }
        }
    }

    fn poll(&mut self) -> Result<Option<OrientationEvent>> {
        let Some(compass) = self.compass.as_mut() else {
            return Ok(None);
        };
        Ok(compass.read_heading()?.map(OrientationEvent::true_north))
    }
}

/// Plays back recorded orientation samples, one per line:
/// `<deg>` for a true-north heading, `alpha <deg>` or `absolute <deg>` for
/// alpha angles. Blank lines and `#` comments are skipped.
pub struct ReplaySensor {
    events: VecDeque<OrientationEvent>,
}

impl ReplaySensor {
    pub fn from_events(events: impl IntoIterator<Item = OrientationEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut events = VecDeque::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse = |s: &str| {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| Error::Sensor(format!("bad replay sample '{}'", line)))
            };
            let event = if let Some(rest) = line.strip_prefix("alpha") {
                OrientationEvent::alpha(parse(rest)?, false)
            } else if let Some(rest) = line.strip_prefix("absolute") {
                OrientationEvent::alpha(parse(rest)?, true)
            } else {
                OrientationEvent::true_north(parse(line)?)
            };
            events.push_back(event);
        }
        debug!("Loaded {} replay samples", events.len());
        Ok(Self { events })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl OrientationSensor for ReplaySensor {
    fn requires_grant(&self) -> bool {
        false
    }

    fn request_grant(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn poll(&mut self) -> Result<Option<OrientationEvent>> {
        Ok(self.events.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::mock_i2c;
    use crate::orientation::{CompassSession, HeadingSource, PermissionState};

    fn no_offsets() -> MagnetometerCalibration {
        MagnetometerCalibration {
            x_offset: 0.0,
            y_offset: 0.0,
            heading_offset: 0.0,
        }
    }

    fn load_sample(x: i16, y: i16) {
        let [xl, xh] = x.to_le_bytes();
        let [yl, yh] = y.to_le_bytes();
        for (i, byte) in [xl, xh, yl, yh, 0, 0].into_iter().enumerate() {
            mock_i2c::set_register(OUT_X_L + i as u8, byte);
        }
        mock_i2c::set_register(STATUS_REG, ZYXDA);
    }

    fn healthy_device() {
        mock_i2c::reset_mock_bus();
        mock_i2c::set_register(WHO_AM_I, LIS3MDL_ID);
        mock_i2c::set_register(STATUS_REG, ZYXDA);
    }

    #[test]
    fn test_calibrated_heading() {
        let calibration = no_offsets();
        assert_eq!(calibration.heading(1000.0, 0.0), 0.0);
        assert!((calibration.heading(1000.0, 1000.0) - 45.0).abs() < 1e-9);
        assert!((calibration.heading(0.0, -1000.0) - 270.0).abs() < 1e-9);

        let shifted = MagnetometerCalibration {
            x_offset: 500.0,
            y_offset: -200.0,
            heading_offset: 88.0,
        };
        // centred reading points at 0° before the location correction
        assert!((shifted.heading(1500.0, -200.0) - 88.0).abs() < 1e-9);
        assert!((shifted.heading(500.0, -1200.0) - 358.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_calibration_covers_full_turn() {
        let calibration = MagnetometerCalibration::default();
        let radius = 3000.0;
        for step in 0..16 {
            let angle = step as f64 * 22.5;
            let x = X_OFFSET + radius * angle.to_radians().cos();
            let y = Y_OFFSET + radius * angle.to_radians().sin();
            // readings a real sensor can produce
            assert!(x.abs() <= i16::MAX as f64 && y.abs() <= i16::MAX as f64);

            let heading = calibration.heading(x.round(), y.round());
            let expected = normalize_degrees(angle + HEADING_OFFSET);
            let error = (heading - expected + 540.0).rem_euclid(360.0) - 180.0;
            assert!(error.abs() < 0.1, "step {}: {} vs {}", step, heading, expected);
        }
    }

    #[test]
    fn test_hard_iron_offsets() {
        let mut calibration = HardIronCalibration::new();
        assert_eq!(calibration.offsets(), None);

        for (x, y) in [(-3000.0, 100.0), (1000.0, -500.0), (200.0, 2500.0)] {
            calibration.add(x, y);
        }
        assert_eq!(calibration.samples(), 3);
        assert_eq!(calibration.x_range(), (-3000.0, 1000.0));
        assert_eq!(calibration.offsets(), Some((-1000.0, 1000.0)));
    }

    #[test]
    fn test_sensor_reads_heading() -> Result<()> {
        healthy_device();
        let mut compass = CompassSensor::new(no_offsets())?;

        load_sample(0, 1000);
        let heading = compass.read_heading()?.unwrap();
        assert!((heading - 90.0).abs() < 1e-9);

        // device initialised with the documented control values
        assert_eq!(mock_i2c::get_register(CTRL_REG1), 0xFC);
        assert_eq!(mock_i2c::get_register(CTRL_REG5), 0x40);
        assert_eq!(mock_i2c::slave_address(), Some(LIS3MDL_ADDR));
        Ok(())
    }

    #[test]
    fn test_sensor_no_data_ready() -> Result<()> {
        healthy_device();
        let mut compass = CompassSensor::new(no_offsets())?;
        mock_i2c::set_register(STATUS_REG, 0x00);
        assert_eq!(compass.read_heading()?, None);
        Ok(())
    }

    #[test]
    fn test_wrong_device_id() {
        healthy_device();
        mock_i2c::set_register(WHO_AM_I, 0x33);
        assert!(matches!(CompassSensor::new(no_offsets()), Err(Error::Sensor(_))));
    }

    #[test]
    fn test_session_over_magnetometer() -> Result<()> {
        healthy_device();
        let mut session = CompassSession::new(MagnetometerSensor::new(no_offsets()), 295.0);
        assert_eq!(session.open()?, PermissionState::Granted);

        load_sample(1000, -100);
        assert!(session.pump()?);
        let readout = session.readout();
        assert_eq!(readout.source, Some(HeadingSource::TrueNorth));
        assert!(readout.accumulated < 0.0 && readout.accumulated > -10.0);
        Ok(())
    }

    #[test]
    fn test_missing_bus_is_denied() -> Result<()> {
        mock_i2c::reset_mock_bus();
        mock_i2c::set_bus_available(false);
        let mut session = CompassSession::new(MagnetometerSensor::new(no_offsets()), 295.0);
        assert_eq!(session.open()?, PermissionState::Denied);
        assert!(!session.pump()?);
        Ok(())
    }

    #[test]
    fn test_replay_parse() -> Result<()> {
        let mut sensor = ReplaySensor::parse("# recorded\n10\n\nalpha 90\nabsolute 270.5\n")?;
        assert_eq!(sensor.remaining(), 3);
        assert_eq!(sensor.poll()?, Some(OrientationEvent::true_north(10.0)));
        assert_eq!(sensor.poll()?, Some(OrientationEvent::alpha(90.0, false)));
        let event = sensor.poll()?.unwrap();
        assert_eq!(event.heading(), Some((89.5, HeadingSource::Absolute)));
        assert_eq!(sensor.poll()?, None);

        assert!(matches!(ReplaySensor::parse("north"), Err(Error::Sensor(_))));
        Ok(())
    }
}
