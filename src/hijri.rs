//! Tabular Islamic calendar.
//!
//! Arithmetic (Kuwaiti) calendar: 30-year cycles with 11 leap years, months
//! alternating 30 and 29 days. It can differ by a day or two from a calendar
//! based on actual crescent sighting.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Julian day number of 1 January 1 CE (proleptic Gregorian) minus one.
const JDN_CE_OFFSET: i64 = 1_721_425;

const MONTH_NAMES: [&str; 12] = [
    "Muharram",
    "Safar",
    "Rabi al-Awwal",
    "Rabi al-Thani",
    "Jumada al-Ula",
    "Jumada al-Akhirah",
    "Rajab",
    "Sha'ban",
    "Ramadan",
    "Shawwal",
    "Dhu al-Qa'dah",
    "Dhu al-Hijjah",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HijriDate {
    pub year: i64,
    /// 1 = Muharram.
    pub month: u32,
    pub day: u32,
}

impl HijriDate {
    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month as usize - 1) % 12]
    }

    /// Tabular conversion of a Gregorian civil date.
    pub fn from_gregorian(date: NaiveDate) -> Self {
        let jdn = date.num_days_from_ce() as i64 + JDN_CE_OFFSET;

        let l = jdn - 1_948_440 + 10_632;
        let n = (l - 1) / 10_631;
        let l = l - 10_631 * n + 354;
        let j = ((10_985 - l) / 5_316) * ((50 * l) / 17_719) + (l / 5_670) * ((43 * l) / 15_238);
        let l = l - ((30 - j) / 15) * ((17_719 * j) / 50) - (j / 16) * ((15_238 * j) / 43) + 29;
        let month = (24 * l) / 709;
        let day = l - (709 * month) / 24;
        let year = 30 * n + j - 30;

        Self {
            year,
            month: month as u32,
            day: day as u32,
        }
    }

    /// The Hijri day begins at sunset, so anything from Maghrib onward
    /// already belongs to the next day.
    pub fn at(moment: NaiveDateTime, maghrib: NaiveTime) -> Self {
        let date = if moment.time() >= maghrib {
            moment.date().succ_opt().unwrap_or(moment.date())
        } else {
            moment.date()
        };
        Self::from_gregorian(date)
    }
}

impl fmt::Display for HijriDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} AH", self.day, self.month_name(), self.year)
    }
}
