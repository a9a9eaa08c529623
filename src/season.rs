//! Code for classifying calendar dates into tariff seasons.
use chrono::{Datelike, NaiveDate};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};

/// A tariff season.
///
/// Taipower schedules distinguish only summer and non-summer rates, so the set is closed.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum SeasonType {
    /// The summer rate season
    #[string = "summer"]
    Summer,
    /// The rest of the year
    #[string = "non_summer"]
    NonSummer,
}

impl SeasonType {
    /// Every season, in a fixed order suitable for building lookup tables
    pub const ALL: [SeasonType; 2] = [SeasonType::Summer, SeasonType::NonSummer];

    /// The stable string label for this season
    pub fn label(&self) -> &'static str {
        match self {
            SeasonType::Summer => "summer",
            SeasonType::NonSummer => "non_summer",
        }
    }
}

/// A window of the year delimited by (month, day) bounds, both inclusive.
///
/// If the start bound is after the end bound the window wraps past year-end, e.g. a window
/// of (11, 1)..(2, 28) contains both Dec 31 and Jan 1.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SeasonWindow {
    start: (u32, u32),
    end: (u32, u32),
}

impl SeasonWindow {
    /// Create a window from inclusive (month, day) bounds
    pub fn new(start: (u32, u32), end: (u32, u32)) -> Self {
        Self { start, end }
    }

    /// Whether the given date falls within the window
    pub fn contains(&self, date: NaiveDate) -> bool {
        let current = (date.month(), date.day());
        if self.start <= self.end {
            self.start <= current && current <= self.end
        } else {
            current >= self.start || current <= self.end
        }
    }
}

/// Maps calendar dates to seasons.
pub trait SeasonStrategy {
    /// The season the given date falls in.
    ///
    /// Every date maps to exactly one season; there are no error conditions.
    fn season_of(&self, date: NaiveDate) -> SeasonType;

    /// The fixed enumerable set of seasons, for building lookup tables
    fn all_seasons(&self) -> Vec<SeasonType> {
        SeasonType::ALL.to_vec()
    }
}

/// The Taipower season rule: summer within a configured window, non-summer otherwise.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TaiwanSeasonStrategy {
    summer: SeasonWindow,
}

impl TaiwanSeasonStrategy {
    /// Create a strategy with the given summer window
    pub fn new(summer_start: (u32, u32), summer_end: (u32, u32)) -> Self {
        Self {
            summer: SeasonWindow::new(summer_start, summer_end),
        }
    }
}

impl Default for TaiwanSeasonStrategy {
    /// The published Taipower summer window, June 1 to September 30
    fn default() -> Self {
        Self::new((6, 1), (9, 30))
    }
}

impl SeasonStrategy for TaiwanSeasonStrategy {
    fn season_of(&self, date: NaiveDate) -> SeasonType {
        if self.summer.contains(date) {
            SeasonType::Summer
        } else {
            SeasonType::NonSummer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(date(2025, 6, 1), SeasonType::Summer)] // first day inside
    #[case(date(2025, 9, 30), SeasonType::Summer)] // last day inside
    #[case(date(2025, 5, 31), SeasonType::NonSummer)]
    #[case(date(2025, 10, 1), SeasonType::NonSummer)]
    #[case(date(2025, 1, 15), SeasonType::NonSummer)]
    fn test_default_summer_window(#[case] target: NaiveDate, #[case] expected: SeasonType) {
        assert_eq!(TaiwanSeasonStrategy::default().season_of(target), expected);
    }

    #[rstest]
    #[case(date(2024, 12, 31), SeasonType::Summer)]
    #[case(date(2025, 1, 1), SeasonType::Summer)]
    #[case(date(2025, 2, 28), SeasonType::Summer)]
    #[case(date(2025, 3, 1), SeasonType::NonSummer)]
    #[case(date(2025, 10, 31), SeasonType::NonSummer)]
    #[case(date(2025, 11, 1), SeasonType::Summer)]
    fn test_wrapping_window(#[case] target: NaiveDate, #[case] expected: SeasonType) {
        // A window whose start is after its end wraps past year-end
        let strategy = TaiwanSeasonStrategy::new((11, 1), (2, 28));
        assert_eq!(strategy.season_of(target), expected);
    }

    #[test]
    fn test_every_date_has_a_season() {
        let strategy = TaiwanSeasonStrategy::default();
        let mut current = date(2024, 1, 1);
        while current <= date(2024, 12, 31) {
            // No panic and a defined value for every day of a leap year
            let _ = strategy.season_of(current);
            current = current.succ_opt().unwrap();
        }
    }
}
