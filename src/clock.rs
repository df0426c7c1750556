//! Analog clock face: hand angles and prayer markers on a 12-hour dial.
//!
//! Angles are degrees clockwise from 12 o'clock.

use chrono::{NaiveTime, Timelike};
use serde::Serialize;

use crate::prayer::{DaySchedule, PrayerName};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ClockHands {
    pub hour: f64,
    pub minute: f64,
    pub second: f64,
}

impl ClockHands {
    /// Hands sweep continuously: the second hand includes the fraction of
    /// the current second, the minute hand the seconds, the hour hand the minutes.
    pub fn at(time: NaiveTime) -> Self {
        let seconds = time.second() as f64 + time.nanosecond().min(999_999_999) as f64 / 1e9;
        let minutes = time.minute() as f64 + seconds / 60.0;
        let hours = (time.hour() % 12) as f64 + minutes / 60.0;

        Self {
            hour: hours * 30.0,
            minute: minutes * 6.0,
            second: seconds * 6.0,
        }
    }
}

/// Where a prayer sits on the dial.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PrayerMarker {
    pub name: PrayerName,
    pub angle: f64,
    pub is_next: bool,
}

/// One marker per schedule entry, at the hour-hand angle of its time.
pub fn prayer_markers(schedule: &DaySchedule, next: Option<usize>) -> Vec<PrayerMarker> {
    schedule
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| PrayerMarker {
            name: entry.name,
            angle: ClockHands::at(entry.time).hour,
            is_next: Some(i) == next,
        })
        .collect()
}
