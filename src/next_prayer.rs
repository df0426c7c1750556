//! Which prayer comes next.
//!
//! Night prayers (Isha, Midnight, LastThird by default) can fall after
//! midnight on the clock while still belonging to the night that began at
//! today's Maghrib. Any night prayer whose clock time is earlier than Maghrib
//! is pushed forward one day before comparing against the current time.

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use log::debug;

use crate::config::{MAGHRIB_FALLBACK_MINUTES, NEXT_PRAYER_REFRESH_SECS};
use crate::prayer::{DaySchedule, PrayerEntry, PrayerName, minutes_of_day};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Knobs for the night-prayer heuristic. Revisit `night_prayers` whenever the
/// set of named prayers changes.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectorConfig {
    pub night_prayers: Vec<PrayerName>,
    /// Used when the schedule has no Maghrib entry.
    pub maghrib_fallback: NaiveTime,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            night_prayers: vec![PrayerName::Isha, PrayerName::Midnight, PrayerName::LastThird],
            maghrib_fallback: NaiveTime::from_num_seconds_from_midnight_opt(
                MAGHRIB_FALLBACK_MINUTES * 60,
                0,
            )
            .unwrap_or_default(),
        }
    }
}

impl SelectorConfig {
    fn is_night_prayer(&self, name: PrayerName) -> bool {
        self.night_prayers.contains(&name)
    }

    /// Minutes since midnight for each entry, night prayers shifted past Maghrib.
    pub fn adjusted_minutes(&self, entries: &[PrayerEntry]) -> Vec<u32> {
        let maghrib = entries
            .iter()
            .find(|e| e.name == PrayerName::Maghrib)
            .map(PrayerEntry::minutes)
            .unwrap_or_else(|| minutes_of_day(self.maghrib_fallback));

        entries
            .iter()
            .map(|entry| {
                let minutes = entry.minutes();
                if self.is_night_prayer(entry.name) && minutes < maghrib {
                    minutes + MINUTES_PER_DAY
                } else {
                    minutes
                }
            })
            .collect()
    }
}

/// Index of the next prayer, or `None` when the day in view is not today.
///
/// Picks the entry with the smallest strictly positive gap to `now`; ties go
/// to the earliest entry in schedule order. When every entry has passed,
/// index 0 (Fajr, tomorrow) is next. An empty schedule has no next prayer.
pub fn select_next_prayer(
    entries: &[PrayerEntry],
    now: NaiveTime,
    viewing_today: bool,
    config: &SelectorConfig,
) -> Option<usize> {
    if !viewing_today || entries.is_empty() {
        return None;
    }

    let now = minutes_of_day(now);
    let mut best: Option<(usize, u32)> = None;
    for (index, minutes) in config.adjusted_minutes(entries).into_iter().enumerate() {
        if minutes <= now {
            continue;
        }
        let gap = minutes - now;
        if best.is_none_or(|(_, best_gap)| gap < best_gap) {
            best = Some((index, gap));
        }
    }

    Some(best.map_or(0, |(index, _)| index))
}

/// Keeps the "next" flag of the schedule in view up to date.
///
/// Recomputes immediately when the schedule changes, and on `tick` once the
/// refresh interval has elapsed or the calendar date has rolled over.
#[derive(Debug)]
pub struct PrayerBoard {
    config: SelectorConfig,
    schedule: Option<DaySchedule>,
    next: Option<usize>,
    last_evaluated: Option<NaiveDateTime>,
}

impl PrayerBoard {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            schedule: None,
            next: None,
            last_evaluated: None,
        }
    }

    pub fn set_schedule(&mut self, schedule: DaySchedule, now: NaiveDateTime) -> Option<usize> {
        self.schedule = Some(schedule);
        self.evaluate(now);
        self.next
    }

    /// Periodic re-evaluation. Returns true when the next prayer changed.
    pub fn tick(&mut self, now: NaiveDateTime) -> bool {
        let due = match self.last_evaluated {
            None => true,
            Some(last) => {
                last.date() != now.date()
                    || now - last >= TimeDelta::seconds(NEXT_PRAYER_REFRESH_SECS)
                    || now < last
            }
        };
        if !due {
            return false;
        }
        let before = self.next;
        self.evaluate(now);
        before != self.next
    }

    fn evaluate(&mut self, now: NaiveDateTime) {
        self.next = self.schedule.as_ref().and_then(|schedule| {
            let viewing_today = schedule.date == now.date();
            select_next_prayer(&schedule.entries, now.time(), viewing_today, &self.config)
        });
        self.last_evaluated = Some(now);

        if let Some(entry) = self.next_entry() {
            debug!("Next prayer at {}: {} {}", now, entry.name, entry.time.format("%H:%M"));
        }
    }

    pub fn schedule(&self) -> Option<&DaySchedule> {
        self.schedule.as_ref()
    }

    pub fn next_index(&self) -> Option<usize> {
        self.next
    }

    pub fn next_entry(&self) -> Option<&PrayerEntry> {
        let index = self.next?;
        self.schedule.as_ref()?.entries.get(index)
    }

    /// One flag per entry; exactly one set when viewing today.
    pub fn flags(&self) -> Vec<bool> {
        self.schedule
            .as_ref()
            .map(|s| (0..s.len()).map(|i| Some(i) == self.next).collect())
            .unwrap_or_default()
    }
}
