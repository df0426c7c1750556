use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::EARTH_RADIUS_KM;

/// Observer or target coordinate in decimal degrees.
///
/// Latitude is expected in [-90, 90] and longitude in [-180, 180]. Values
/// outside those ranges are not rejected; the formulas simply produce
/// meaningless results.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.latitude, self.longitude)
    }
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Initial great-circle bearing from this position to another.
    /// Returns degrees in [0, 360), 0 is true north.
    pub fn bearing_to(&self, other: &Position) -> f64 {
        let lat_from = self.latitude.to_radians();
        let lat_to = other.latitude.to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let y = delta_lon.sin() * lat_to.cos();
        let x = lat_from.cos() * lat_to.sin() - lat_from.sin() * lat_to.cos() * delta_lon.cos();

        let bearing = y.atan2(x).to_degrees();

        (bearing + 360.0) % 360.0
    }

    /// Great-circle distance to another position using the haversine formula.
    /// Read more here: https://en.wikipedia.org/wiki/Haversine_formula
    /// Returns kilometres, unrounded.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let lat_from = self.latitude.to_radians();
        let lat_to = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat_from.cos() * lat_to.cos() * (delta_lon / 2.0).sin().powi(2);
        // rounding can push antipodal pairs just past 1
        let a = a.min(1.0);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }
}
