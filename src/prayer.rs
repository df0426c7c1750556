//! Named prayer times for one day.

use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrayerName {
    Fajr,
    Shuruq,
    Duha,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
    Midnight,
    LastThird,
}

impl PrayerName {
    /// Chronological order within a prayer-day.
    pub const ALL: [PrayerName; 9] = [
        PrayerName::Fajr,
        PrayerName::Shuruq,
        PrayerName::Duha,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
        PrayerName::Midnight,
        PrayerName::LastThird,
    ];

    pub fn arabic_name(&self) -> &'static str {
        match self {
            PrayerName::Fajr => "الفجر",
            PrayerName::Shuruq => "الشروق",
            PrayerName::Duha => "الضحى",
            PrayerName::Dhuhr => "الظهر",
            PrayerName::Asr => "العصر",
            PrayerName::Maghrib => "المغرب",
            PrayerName::Isha => "العشاء",
            PrayerName::Midnight => "منتصف الليل",
            PrayerName::LastThird => "الثلث الأخير",
        }
    }

    /// Resolve a free-form label such as "Maghrib (Sunset)" or
    /// "Last third of the night". Matching is case-insensitive and ignores
    /// spaces, dashes and underscores.
    pub fn from_label(label: &str) -> Option<PrayerName> {
        let key: String = label
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();

        // longer, more specific names first so "lastthird" beats "third"
        const ALIASES: [(&str, PrayerName); 16] = [
            ("lastthird", PrayerName::LastThird),
            ("thirdofthenight", PrayerName::LastThird),
            ("midnight", PrayerName::Midnight),
            ("maghrib", PrayerName::Maghrib),
            ("sunset", PrayerName::Maghrib),
            ("shuruq", PrayerName::Shuruq),
            ("sunrise", PrayerName::Shuruq),
            ("dhuhr", PrayerName::Dhuhr),
            ("zuhr", PrayerName::Dhuhr),
            ("fajr", PrayerName::Fajr),
            ("subuh", PrayerName::Fajr),
            ("duha", PrayerName::Duha),
            ("isha", PrayerName::Isha),
            ("isya", PrayerName::Isha),
            ("asr", PrayerName::Asr),
            ("ashar", PrayerName::Asr),
        ];

        ALIASES
            .iter()
            .find(|(alias, _)| key.contains(alias))
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for PrayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrayerName::LastThird => write!(f, "Last Third"),
            other => write!(f, "{:?}", other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrayerEntry {
    pub name: PrayerName,
    pub arabic_name: String,
    pub time: NaiveTime,
}

impl PrayerEntry {
    pub fn new(name: PrayerName, time: NaiveTime) -> Self {
        Self {
            name,
            arabic_name: name.arabic_name().to_string(),
            time,
        }
    }

    pub fn minutes(&self) -> u32 {
        minutes_of_day(self.time)
    }
}

pub fn minutes_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Parse a 24-hour "HH:MM" string.
pub fn parse_time(text: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M").map_err(|_| Error::InvalidTime(text.to_string()))
}

/// One calendar day's prayers, chronological within the prayer-day.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub entries: Vec<PrayerEntry>,
}

impl DaySchedule {
    /// Rejects a schedule naming the same prayer twice. Missing prayers are allowed.
    pub fn new(date: NaiveDate, entries: Vec<PrayerEntry>) -> Result<Self> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(Error::DuplicatePrayer(entry.name));
            }
        }
        Ok(Self { date, entries })
    }

    /// Build a schedule from `(label, "HH:MM")` pairs, in the given order.
    pub fn from_labels(date: NaiveDate, pairs: &[(&str, &str)]) -> Result<Self> {
        let entries = pairs
            .iter()
            .map(|(label, time)| {
                let name = PrayerName::from_label(label)
                    .ok_or_else(|| Error::UnknownPrayer(label.to_string()))?;
                Ok(PrayerEntry::new(name, parse_time(time)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(date, entries)
    }

    pub fn get(&self, name: PrayerName) -> Option<&PrayerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn position(&self, name: PrayerName) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
