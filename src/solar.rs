//! Astronomical prayer times.
//!
//! Sun declination and the equation of time come from the low-precision
//! solar coordinates of the Astronomical Almanac (good to about a minute
//! between 1950 and 2050). Each prayer is the moment the sun reaches a given
//! altitude, solved with the hour-angle formula around solar noon:
//!
//! ```text
//! T(α) = 1/15 · acos((−sin α − sin δ · sin φ) / (cos δ · cos φ))
//! ```
//!
//! Fajr and Isha use the method's twilight depression angles, Shuruq and
//! Maghrib the standard 0.833° refraction-corrected horizon, Asr the
//! shadow-length rule. Midnight and the last third of the night are
//! divisions of the span from today's Maghrib to the next day's Fajr.

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_DUHA_OFFSET_MINUTES, HORIZON_DEPRESSION};
use crate::error::{Error, Result};
use crate::position::Position;
use crate::prayer::{DaySchedule, PrayerEntry, PrayerName};

/// Twilight angle conventions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    MuslimWorldLeague,
    Egyptian,
    Karachi,
    NorthAmerica,
    /// Kementerian Agama, Indonesia.
    Kemenag,
}

impl Method {
    /// Sun depression below the horizon for (Fajr, Isha), degrees.
    pub fn angles(&self) -> (f64, f64) {
        match self {
            Method::MuslimWorldLeague => (18.0, 17.0),
            Method::Egyptian => (19.5, 17.5),
            Method::Karachi => (18.0, 18.0),
            Method::NorthAmerica => (15.0, 15.0),
            Method::Kemenag => (20.0, 18.0),
        }
    }
}

/// Asr starts when an object's shadow equals its noon shadow plus `factor` times its height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AsrMadhab {
    #[default]
    Standard,
    Hanafi,
}

impl AsrMadhab {
    fn shadow_factor(&self) -> f64 {
        match self {
            AsrMadhab::Standard => 1.0,
            AsrMadhab::Hanafi => 2.0,
        }
    }
}

/// Source of a day's prayer schedule.
pub trait PrayerTimeProvider {
    fn schedule(&self, position: &Position, date: NaiveDate) -> Result<DaySchedule>;
}

fn fix_angle(a: f64) -> f64 {
    a.rem_euclid(360.0)
}

fn fix_hour(h: f64) -> f64 {
    h.rem_euclid(24.0)
}

/// Julian day at 0h UT of a Gregorian date.
pub fn julian_day(date: NaiveDate) -> f64 {
    let (mut year, mut month) = (date.year() as f64, date.month() as f64);
    if month <= 2.0 {
        year -= 1.0;
        month += 12.0;
    }
    let a = (year / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();
    (365.25 * (year + 4716.0)).floor() + (30.6001 * (month + 1.0)).floor() + date.day() as f64 + b
        - 1524.5
}

/// Declination (degrees) and equation of time (hours) at a Julian day.
fn sun_position(jd: f64) -> (f64, f64) {
    let d = jd - 2451545.0;
    let g = fix_angle(357.529 + 0.98560028 * d).to_radians();
    let q = fix_angle(280.459 + 0.98564736 * d);
    let l = fix_angle(q + 1.915 * g.sin() + 0.020 * (2.0 * g).sin()).to_radians();
    let e = (23.439 - 0.00000036 * d).to_radians();

    let right_ascension = (e.cos() * l.sin()).atan2(l.cos()).to_degrees() / 15.0;
    let equation_of_time = q / 15.0 - fix_hour(right_ascension);
    let declination = (e.sin() * l.sin()).asin().to_degrees();
    (declination, equation_of_time)
}

/// Sun geometry for one observer on one date. Times are hours of local
/// solar-ish time before the timezone shift.
struct DayGeometry {
    jd: f64,
    latitude: f64,
}

impl DayGeometry {
    fn new(position: &Position, date: NaiveDate) -> Self {
        Self {
            jd: julian_day(date) - position.longitude / (15.0 * 24.0),
            latitude: position.latitude,
        }
    }

    fn mid_day(&self, guess: f64) -> f64 {
        let (_, eqt) = sun_position(self.jd + guess / 24.0);
        fix_hour(12.0 - eqt)
    }

    /// When the sun is `angle` degrees below the horizon, before noon if `morning`.
    fn sun_angle_time(&self, angle: f64, guess: f64, morning: bool) -> Option<f64> {
        let (decl, _) = sun_position(self.jd + guess / 24.0);
        let (decl, lat) = (decl.to_radians(), self.latitude.to_radians());
        let noon = self.mid_day(guess);

        let cos_hour_angle =
            (-angle.to_radians().sin() - decl.sin() * lat.sin()) / (decl.cos() * lat.cos());
        if !(-1.0..=1.0).contains(&cos_hour_angle) {
            return None;
        }
        let t = cos_hour_angle.acos().to_degrees() / 15.0;
        Some(if morning { noon - t } else { noon + t })
    }

    fn asr_time(&self, factor: f64, guess: f64) -> Option<f64> {
        let (decl, _) = sun_position(self.jd + guess / 24.0);
        let angle = -(1.0 / (factor + (self.latitude - decl).abs().to_radians().tan()))
            .atan()
            .to_degrees();
        self.sun_angle_time(angle, guess, false)
    }
}

/// Computes schedules from the sun's position.
#[derive(Clone, Debug)]
pub struct SolarCalculator {
    pub method: Method,
    pub asr: AsrMadhab,
    pub duha_offset: Duration,
    pub utc_offset: FixedOffset,
}

impl SolarCalculator {
    pub fn new(method: Method, asr: AsrMadhab, utc_offset: FixedOffset) -> Self {
        Self {
            method,
            asr,
            duha_offset: Duration::minutes(DEFAULT_DUHA_OFFSET_MINUTES),
            utc_offset,
        }
    }

    pub fn with_duha_offset(mut self, offset: Duration) -> Self {
        self.duha_offset = offset;
        self
    }

    fn to_local(&self, position: &Position, date: NaiveDate, hours: f64) -> NaiveDateTime {
        let zone = self.utc_offset.local_minus_utc() as f64 / 3600.0;
        let local = hours + zone - position.longitude / 15.0;
        let minutes = (local * 60.0).round() as i64;
        date.and_time(NaiveTime::default()) + Duration::minutes(minutes)
    }

    fn fajr(&self, position: &Position, date: NaiveDate) -> Result<NaiveDateTime> {
        let (fajr_angle, _) = self.method.angles();
        let geometry = DayGeometry::new(position, date);
        let hours = geometry
            .sun_angle_time(fajr_angle, 5.0, true)
            .ok_or(Error::NoSolarEvent {
                prayer: PrayerName::Fajr,
                date,
            })?;
        Ok(self.to_local(position, date, hours))
    }

    /// Local date-times of every prayer for `date`, Midnight and LastThird
    /// possibly landing on the following calendar day.
    pub fn times(
        &self,
        position: &Position,
        date: NaiveDate,
    ) -> Result<Vec<(PrayerName, NaiveDateTime)>> {
        let (_, isha_angle) = self.method.angles();
        let geometry = DayGeometry::new(position, date);
        let missing = |prayer| Error::NoSolarEvent { prayer, date };
        let local = |hours| self.to_local(position, date, hours);

        let fajr = self.fajr(position, date)?;
        let shuruq = geometry
            .sun_angle_time(HORIZON_DEPRESSION, 6.0, true)
            .ok_or_else(|| missing(PrayerName::Shuruq))?;
        let dhuhr = geometry.mid_day(12.0);
        let asr = geometry
            .asr_time(self.asr.shadow_factor(), 13.0)
            .ok_or_else(|| missing(PrayerName::Asr))?;
        let maghrib = geometry
            .sun_angle_time(HORIZON_DEPRESSION, 18.0, false)
            .ok_or_else(|| missing(PrayerName::Maghrib))?;
        let isha = geometry
            .sun_angle_time(isha_angle, 18.0, false)
            .ok_or_else(|| missing(PrayerName::Isha))?;

        let shuruq = local(shuruq);
        let maghrib = local(maghrib);

        // the night runs to the next day's Fajr
        let next_date = date.succ_opt().ok_or_else(|| missing(PrayerName::Midnight))?;
        let next_fajr = self.fajr(position, next_date)?;
        let night = next_fajr - maghrib;

        Ok(vec![
            (PrayerName::Fajr, fajr),
            (PrayerName::Shuruq, shuruq),
            (PrayerName::Duha, shuruq + self.duha_offset),
            (PrayerName::Dhuhr, local(dhuhr)),
            (PrayerName::Asr, local(asr)),
            (PrayerName::Maghrib, maghrib),
            (PrayerName::Isha, local(isha)),
            (PrayerName::Midnight, maghrib + night / 2),
            (PrayerName::LastThird, maghrib + night * 2 / 3),
        ])
    }
}

impl PrayerTimeProvider for SolarCalculator {
    fn schedule(&self, position: &Position, date: NaiveDate) -> Result<DaySchedule> {
        let times = self.times(position, date)?;
        debug!(
            "Computed {} prayer times for {} at {} ({:?})",
            times.len(),
            date,
            position,
            self.method
        );
        let entries = times
            .into_iter()
            .map(|(name, at)| PrayerEntry::new(name, at.time()))
            .collect();
        DaySchedule::new(date, entries)
    }
}
