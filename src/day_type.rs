//! Code for classifying calendar dates into tariff day types.
use crate::calendar::HolidayCalendar;
use crate::id::define_id_type;
use chrono::{Datelike, NaiveDate, Weekday};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::rc::Rc;

define_id_type! {DayType}

/// Maps calendar dates to day-type labels.
///
/// The Taipower taxonomy is weekday / saturday / sunday_holiday, but custom taxonomies with
/// arbitrary labels are supported (see [`WeekdayDayTypeStrategy`]).
pub trait DayTypeStrategy {
    /// The day type of the given date
    fn day_type_of(&self, date: NaiveDate) -> DayType;

    /// The day types of the given dates.
    ///
    /// Implementations backed by a holiday calendar must make a single batched holiday query
    /// for the whole slice; the engine's batch path relies on this to keep calendar cost
    /// proportional to distinct days rather than rows.
    fn day_types_batch(&self, dates: &[NaiveDate]) -> Vec<DayType> {
        dates.iter().map(|&date| self.day_type_of(date)).collect()
    }

    /// The fixed enumerable set of day types, for building lookup tables
    fn all_day_types(&self) -> Vec<DayType>;

    /// Resolve holiday data for the given years ahead of a batch of queries
    fn preload(&self, _years: &BTreeSet<i32>) {}
}

/// The Taipower day-type rule: holidays count as Sundays, Saturdays are their own day type.
pub struct TaiwanDayTypeStrategy {
    calendar: Rc<dyn HolidayCalendar>,
}

impl TaiwanDayTypeStrategy {
    /// Create a strategy consulting the given holiday calendar
    pub fn new(calendar: Rc<dyn HolidayCalendar>) -> Self {
        Self { calendar }
    }

    fn classify(date: NaiveDate, is_holiday: bool) -> DayType {
        if is_holiday {
            "sunday_holiday".into()
        } else if date.weekday() == Weekday::Sat {
            "saturday".into()
        } else {
            "weekday".into()
        }
    }
}

impl DayTypeStrategy for TaiwanDayTypeStrategy {
    fn day_type_of(&self, date: NaiveDate) -> DayType {
        Self::classify(date, self.calendar.is_holiday(date))
    }

    fn day_types_batch(&self, dates: &[NaiveDate]) -> Vec<DayType> {
        let holiday_flags = self.calendar.is_holiday_batch(dates);
        dates
            .iter()
            .zip(holiday_flags)
            .map(|(&date, is_holiday)| Self::classify(date, is_holiday))
            .collect()
    }

    fn all_day_types(&self) -> Vec<DayType> {
        vec!["weekday".into(), "saturday".into(), "sunday_holiday".into()]
    }

    fn preload(&self, years: &BTreeSet<i32>) {
        self.calendar.preload(years);
    }
}

/// Maps weekdays to day-type labels with a holiday override.
///
/// Lets callers define non-Taipower taxonomies, e.g. treating Monday as a weekend day.
pub struct WeekdayDayTypeStrategy {
    calendar: Rc<dyn HolidayCalendar>,
    weekday_map: IndexMap<Weekday, DayType>,
    holiday_label: DayType,
}

impl WeekdayDayTypeStrategy {
    /// Create a strategy from an explicit weekday map and a holiday override label
    pub fn new(
        calendar: Rc<dyn HolidayCalendar>,
        weekday_map: IndexMap<Weekday, DayType>,
        holiday_label: DayType,
    ) -> Self {
        Self {
            calendar,
            weekday_map,
            holiday_label,
        }
    }

    /// Create a strategy with the default Taipower-style weekday map
    pub fn with_default_map(calendar: Rc<dyn HolidayCalendar>) -> Self {
        let weekday_map = [
            (Weekday::Mon, "weekday".into()),
            (Weekday::Tue, "weekday".into()),
            (Weekday::Wed, "weekday".into()),
            (Weekday::Thu, "weekday".into()),
            (Weekday::Fri, "weekday".into()),
            (Weekday::Sat, "saturday".into()),
            (Weekday::Sun, "sunday".into()),
        ]
        .into_iter()
        .collect();
        Self::new(calendar, weekday_map, "holiday".into())
    }
}

impl DayTypeStrategy for WeekdayDayTypeStrategy {
    fn day_type_of(&self, date: NaiveDate) -> DayType {
        if self.calendar.is_holiday(date) {
            return self.holiday_label.clone();
        }
        self.weekday_map
            .get(&date.weekday())
            .cloned()
            .unwrap_or_else(|| "weekday".into())
    }

    fn day_types_batch(&self, dates: &[NaiveDate]) -> Vec<DayType> {
        let holiday_flags = self.calendar.is_holiday_batch(dates);
        dates
            .iter()
            .zip(holiday_flags)
            .map(|(&date, is_holiday)| {
                if is_holiday {
                    self.holiday_label.clone()
                } else {
                    self.weekday_map
                        .get(&date.weekday())
                        .cloned()
                        .unwrap_or_else(|| "weekday".into())
                }
            })
            .collect()
    }

    fn all_day_types(&self) -> Vec<DayType> {
        let mut seen: Vec<DayType> = Vec::new();
        for label in self.weekday_map.values() {
            if !seen.contains(label) {
                seen.push(label.clone());
            }
        }
        if !seen.contains(&self.holiday_label) {
            seen.push(self.holiday_label.clone());
        }
        seen
    }

    fn preload(&self, years: &BTreeSet<i32>) {
        self.calendar.preload(years);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{CustomCalendar, TaiwanCalendar};
    use rstest::{fixture, rstest};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[fixture]
    fn taiwan_strategy() -> TaiwanDayTypeStrategy {
        // 2025-06-02 is a gazetted make-up holiday in this fixture
        let calendar = TaiwanCalendar::with_holidays([date(2025, 6, 2)]);
        TaiwanDayTypeStrategy::new(Rc::new(calendar))
    }

    #[rstest]
    #[case(date(2025, 6, 3), "weekday")] // Tuesday
    #[case(date(2025, 6, 7), "saturday")]
    #[case(date(2025, 6, 8), "sunday_holiday")] // Sunday
    #[case(date(2025, 6, 2), "sunday_holiday")] // gazetted holiday on a Monday
    fn test_taiwan_day_types(
        taiwan_strategy: TaiwanDayTypeStrategy,
        #[case] target: NaiveDate,
        #[case] expected: &str,
    ) {
        assert_eq!(taiwan_strategy.day_type_of(target), expected.into());
    }

    #[rstest]
    fn test_batch_matches_scalar(taiwan_strategy: TaiwanDayTypeStrategy) {
        let dates: Vec<_> = (1..=8).map(|d| date(2025, 6, d)).collect();
        let batch = taiwan_strategy.day_types_batch(&dates);
        let scalar: Vec<_> = dates
            .iter()
            .map(|&d| taiwan_strategy.day_type_of(d))
            .collect();
        assert_eq!(batch, scalar);
    }

    #[test]
    fn test_weekday_strategy_custom_taxonomy() {
        let calendar = Rc::new(CustomCalendar::new([], [Weekday::Mon]));
        let weekday_map: IndexMap<_, DayType> = [
            (Weekday::Tue, "open".into()),
            (Weekday::Wed, "open".into()),
            (Weekday::Thu, "open".into()),
            (Weekday::Fri, "open".into()),
            (Weekday::Sat, "open".into()),
            (Weekday::Sun, "open".into()),
        ]
        .into_iter()
        .collect();
        let strategy = WeekdayDayTypeStrategy::new(calendar, weekday_map, "closed".into());

        // Monday is a weekend day for this caller
        assert_eq!(strategy.day_type_of(date(2025, 3, 10)), "closed".into());
        assert_eq!(strategy.day_type_of(date(2025, 3, 11)), "open".into());
        assert_eq!(
            strategy.all_day_types(),
            vec![DayType::new("open"), DayType::new("closed")]
        );
    }
}
