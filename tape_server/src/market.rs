//! Market session clock.
//!
//! Decides whether the US equity market is open at a given instant: regular hours
//! 09:30–16:00 America/New_York, Monday to Friday, excluding the exchange holidays of
//! that year. The session is recomputed from the wall clock on every call and never
//! cached.
//!
//! Holiday rules: fixed-date holidays (New Year's Day, Juneteenth, Independence Day,
//! Christmas) move to Friday when they fall on a Saturday and to Monday when they fall
//! on a Sunday, except New Year's Day which is only moved forward. Floating holidays are
//! the usual nth-weekday rules. Good Friday is not modelled.

use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use clap::ValueEnum;

/// Regular session open, minutes after local midnight (09:30).
pub const OPEN_MINUTE: u32 = 9 * 60 + 30;
/// Regular session close, minutes after local midnight (16:00). Exclusive.
pub const CLOSE_MINUTE: u32 = 16 * 60;

/// Source of "now" for scheduling decisions.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// How the session is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MarketMode {
    /// Trading hours, weekdays and the holiday calendar.
    #[default]
    Calendar,
    /// Always open. Handy for demos outside trading hours.
    Open,
    /// Always closed.
    Closed,
}

/// Market session calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketCalendar {
    mode: MarketMode,
}

impl MarketCalendar {
    pub fn new(mode: MarketMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MarketMode {
        self.mode
    }

    /// Whether the regular session is open at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        match self.mode {
            MarketMode::Open => true,
            MarketMode::Closed => false,
            MarketMode::Calendar => is_regular_session(now),
        }
    }
}

/// Calendar rule behind `MarketMode::Calendar`.
pub fn is_regular_session(now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&New_York);

    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let minute = local.hour() * 60 + local.minute();
    if !(OPEN_MINUTE..CLOSE_MINUTE).contains(&minute) {
        return false;
    }

    !holidays(local.year()).contains(&local.date_naive())
}

/// Exchange holidays observed in `year`.
pub fn holidays(year: i32) -> BTreeSet<NaiveDate> {
    let mut days = BTreeSet::new();

    let fixed = [(6, 19), (7, 4), (12, 25)];
    for (month, day) in fixed {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            days.insert(observed(date));
        }
    }

    // A Saturday New Year's Day is not moved back into the previous year.
    if let Some(new_year) = NaiveDate::from_ymd_opt(year, 1, 1) {
        match new_year.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => {
                days.insert(new_year + Duration::days(1));
            }
            _ => {
                days.insert(new_year);
            }
        }
    }

    let floating = [
        (1, Weekday::Mon, 3),  // Martin Luther King Jr. Day
        (2, Weekday::Mon, 3),  // Washington's Birthday
        (9, Weekday::Mon, 1),  // Labor Day
        (11, Weekday::Thu, 4), // Thanksgiving
    ];
    for (month, weekday, n) in floating {
        if let Some(date) = NaiveDate::from_weekday_of_month_opt(year, month, weekday, n) {
            days.insert(date);
        }
    }

    if let Some(memorial) = last_weekday_of_month(year, 5, Weekday::Mon) {
        days.insert(memorial);
    }

    days
}

fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, 5)
        .or_else(|| NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4))
}
