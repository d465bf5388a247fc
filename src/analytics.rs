//! Activity Analytics
//!
//! Pure computations over event rows that were already fetched from the
//! store (one query per window). Only MSG rows count; anything else in the
//! input is skipped.
//!
//! All windows are half-open `[start, end)` in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::events::{Event, EventKind};

/// Length of a top posters ranking
pub const TOP_POSTERS_LIMIT: usize = 15;

pub const HOURS_PER_DAY: usize = 24;
pub const DAYS_PER_WEEK: usize = 7;

/// Half-open time range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// The calendar day holding `date`
pub fn day_window(date: NaiveDate) -> Window {
    let start = midnight(date);
    Window {
        start,
        end: start + Duration::days(1),
    }
}

/// The day before `date`
pub fn previous_day_window(date: NaiveDate) -> Window {
    day_window(date - Duration::days(1))
}

/// Monday 00:00 to the following Monday 00:00 around `date`
pub fn week_window(date: NaiveDate) -> Window {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    let start = midnight(monday);
    Window {
        start,
        end: start + Duration::days(DAYS_PER_WEEK as i64),
    }
}

/// The week before the one holding `date`
pub fn previous_week_window(date: NaiveDate) -> Window {
    week_window(date - Duration::days(DAYS_PER_WEEK as i64))
}

/// Every window a report needs, relative to `now`
#[derive(Debug, Clone, Copy)]
pub struct ReportWindows {
    pub day: Window,
    pub previous_day: Window,
    pub week: Window,
    pub previous_week: Window,
}

impl ReportWindows {
    pub fn at(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self {
            day: day_window(today),
            previous_day: previous_day_window(today),
            week: week_window(today),
            previous_week: previous_week_window(today),
        }
    }
}

/// One line of a ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PosterCount {
    pub pseudo: String,
    pub count: usize,
}

fn messages(events: &[Event]) -> impl Iterator<Item = &Event> {
    events.iter().filter(|e| e.kind == EventKind::Msg)
}

/// Most active posters, by message count
///
/// Equal counts keep the order in which the pseudos first appear.
pub fn top_posters(events: &[Event]) -> Vec<PosterCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut ranking: Vec<PosterCount> = Vec::new();

    for event in messages(events) {
        match index.get(event.pseudo.as_str()) {
            Some(&i) => ranking[i].count += 1,
            None => {
                index.insert(&event.pseudo, ranking.len());
                ranking.push(PosterCount {
                    pseudo: event.pseudo.clone(),
                    count: 1,
                });
            }
        }
    }

    // sort_by is stable
    ranking.sort_by(|a, b| b.count.cmp(&a.count));
    ranking.truncate(TOP_POSTERS_LIMIT);
    ranking
}

/// Message count for each hour of the day, 0 to 23
pub fn messages_per_hour(events: &[Event]) -> Vec<usize> {
    let mut hours = vec![0; HOURS_PER_DAY];
    for event in messages(events) {
        hours[event.timestamp.hour() as usize] += 1;
    }
    hours
}

/// Mean message count per weekday, Monday first
///
/// Each weekday's total is divided by the number of distinct dates on which
/// that weekday shows up in the data. Unseen weekdays average 0.
pub fn average_per_weekday(events: &[Event]) -> Vec<f64> {
    let mut totals = [0usize; DAYS_PER_WEEK];
    let mut dates: [HashSet<NaiveDate>; DAYS_PER_WEEK] = Default::default();

    for event in messages(events) {
        let date = event.timestamp.date_naive();
        let day = date.weekday().num_days_from_monday() as usize;
        totals[day] += 1;
        dates[day].insert(date);
    }

    totals
        .iter()
        .zip(dates.iter())
        .map(|(&total, days)| {
            if days.is_empty() {
                0.0
            } else {
                total as f64 / days.len() as f64
            }
        })
        .collect()
}
