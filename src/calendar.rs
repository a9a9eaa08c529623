//! The holiday calendar capability consumed by day-type strategies.
//!
//! Implementations answer "is this date a holiday?" for single dates and for batches. The
//! batched form is part of the engine's performance contract: an implementation backed by
//! per-year holiday data must resolve each distinct year's data once for the whole batch
//! rather than once per date. Fetching gazetted holiday data from the network and caching it
//! on disk is a concern for callers; the implementations here are pure and deterministic.
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::{BTreeSet, HashSet};

/// Answers holiday queries for single dates and date batches.
pub trait HolidayCalendar {
    /// Whether the given date is a holiday
    fn is_holiday(&self, date: NaiveDate) -> bool;

    /// Whether each of the given dates is a holiday.
    ///
    /// The default implementation loops over [`HolidayCalendar::is_holiday`]. Implementations
    /// whose holiday data is resolved per year should override this to resolve each distinct
    /// year once for the whole batch.
    fn is_holiday_batch(&self, dates: &[NaiveDate]) -> Vec<bool> {
        dates.iter().map(|&date| self.is_holiday(date)).collect()
    }

    /// Optional hook to resolve holiday data for the given years ahead of a batch of queries
    fn preload(&self, _years: &BTreeSet<i32>) {}
}

/// Gazetted solar-calendar holidays observed every year as (month, day)
const GAZETTED_SOLAR_HOLIDAYS: [(u32, u32); 5] = [(1, 1), (2, 28), (4, 4), (5, 1), (10, 10)];

/// The Taipower holiday calendar.
///
/// Every Sunday is a holiday, as are the fixed gazetted solar-calendar holidays (New Year's
/// Day, Peace Memorial Day, Tomb Sweeping Day, Labour Day and National Day). Movable
/// holidays (lunar-calendar festivals and government make-up days) vary per year and can be
/// supplied via [`TaiwanCalendar::with_holidays`] from whatever source the caller trusts.
#[derive(Debug, Default)]
pub struct TaiwanCalendar {
    extra_holidays: HashSet<NaiveDate>,
}

impl TaiwanCalendar {
    /// Create a calendar with only the fixed holiday rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a calendar that additionally treats the given dates as holidays
    pub fn with_holidays<I>(holidays: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        Self {
            extra_holidays: holidays.into_iter().collect(),
        }
    }
}

impl HolidayCalendar for TaiwanCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        date.weekday() == Weekday::Sun
            || GAZETTED_SOLAR_HOLIDAYS.contains(&(date.month(), date.day()))
            || self.extra_holidays.contains(&date)
    }

    fn is_holiday_batch(&self, dates: &[NaiveDate]) -> Vec<bool> {
        // All rules are in-memory, so a single pass is already batched
        dates.iter().map(|&date| self.is_holiday(date)).collect()
    }
}

/// Calendar based on explicit holidays and configurable weekend days.
///
/// Lets callers define non-Taipower day taxonomies, e.g. a site where Monday is the weekly
/// rest day.
#[derive(Debug, Default)]
pub struct CustomCalendar {
    holidays: HashSet<NaiveDate>,
    weekend_days: HashSet<Weekday>,
}

impl CustomCalendar {
    /// Create a calendar from explicit holidays and weekend weekdays
    pub fn new<H, W>(holidays: H, weekend_days: W) -> Self
    where
        H: IntoIterator<Item = NaiveDate>,
        W: IntoIterator<Item = Weekday>,
    {
        Self {
            holidays: holidays.into_iter().collect(),
            weekend_days: weekend_days.into_iter().collect(),
        }
    }
}

impl HolidayCalendar for CustomCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.weekend_days.contains(&date.weekday()) || self.holidays.contains(&date)
    }

    fn is_holiday_batch(&self, dates: &[NaiveDate]) -> Vec<bool> {
        dates.iter().map(|&date| self.is_holiday(date)).collect()
    }
}
