//! Code for time-of-day rate schedules.
use anyhow::{Context, Result, anyhow};
use chrono::{NaiveTime, Timelike};
use itertools::Itertools;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::rc::Rc;

/// The number of minutes in a day; slot coverage is resolved at minute granularity
pub const MINUTES_PER_DAY: usize = 1440;

/// A rate-period label.
///
/// Peak, semi-peak and off-peak are the labels used by the built-in Taipower schedules, but
/// arbitrary labels are accepted for custom plans. Parsing a known label always yields the
/// corresponding built-in variant, so labels compare consistently however they were written.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RatePeriod {
    /// The peak rate period
    Peak,
    /// The semi-peak rate period used by three-stage schedules
    SemiPeak,
    /// The off-peak rate period
    OffPeak,
    /// A custom rate-period label
    Custom(Rc<str>),
}

impl RatePeriod {
    /// The stable string label for this period
    pub fn label(&self) -> &str {
        match self {
            RatePeriod::Peak => "peak",
            RatePeriod::SemiPeak => "semi_peak",
            RatePeriod::OffPeak => "off_peak",
            RatePeriod::Custom(label) => label,
        }
    }
}

impl Display for RatePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<&str> for RatePeriod {
    fn from(label: &str) -> Self {
        match label {
            "peak" => RatePeriod::Peak,
            "semi_peak" => RatePeriod::SemiPeak,
            "off_peak" => RatePeriod::OffPeak,
            other => RatePeriod::Custom(Rc::from(other)),
        }
    }
}

impl From<String> for RatePeriod {
    fn from(label: String) -> Self {
        label.as_str().into()
    }
}

impl Serialize for RatePeriod {
    fn serialize<S>(&self, serialiser: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialiser.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RatePeriod {
    fn deserialize<D>(deserialiser: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label: String = Deserialize::deserialize(deserialiser)?;
        if label.is_empty() {
            return Err(D::Error::custom("Rate period label cannot be empty"));
        }
        Ok(label.into())
    }
}

/// Parse a time of day in "HH:MM" form.
///
/// "24:00" is accepted as an alias for midnight, so a slot written as 00:00-24:00 covers the
/// whole day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let (hour, minute) = value
        .split(':')
        .collect_tuple()
        .ok_or_else(|| anyhow!("Invalid time format: {value}"))?;
    let hour: u32 = hour
        .parse()
        .with_context(|| format!("Invalid time format: {value}"))?;
    let minute: u32 = minute
        .parse()
        .with_context(|| format!("Invalid time format: {value}"))?;
    if hour == 24 && minute == 0 {
        return Ok(NaiveTime::MIN);
    }
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow!("Invalid time value: {value}"))
}

/// The minute of the day for the given time, in `0..1440`
fn minute_of(time: NaiveTime) -> usize {
    (time.hour() * 60 + time.minute()) as usize
}

/// A contiguous time-of-day range tagged with a rate period.
///
/// Start is inclusive and end exclusive. A slot whose start is after its end wraps past
/// midnight; a slot whose start equals its end covers the whole day.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TimeSlot {
    /// Start of the slot (inclusive)
    pub start: NaiveTime,
    /// End of the slot (exclusive)
    pub end: NaiveTime,
    /// The rate period in force during the slot
    pub period: RatePeriod,
}

impl TimeSlot {
    /// Create a slot from explicit times
    pub fn new(start: NaiveTime, end: NaiveTime, period: RatePeriod) -> Self {
        Self { start, end, period }
    }

    /// Create a slot from "HH:MM" strings and a period label
    pub fn from_labels(start: &str, end: &str, period: &str) -> Result<Self> {
        Ok(Self {
            start: parse_time_of_day(start)?,
            end: parse_time_of_day(end)?,
            period: period.into(),
        })
    }

    /// The half-open minute ranges this slot covers.
    ///
    /// One range for a linear slot, two for a slot wrapping past midnight. Computed once at
    /// schedule build time and reused by both the scalar and the batch lookup paths.
    fn minute_ranges(&self) -> Vec<(usize, usize)> {
        let start = minute_of(self.start);
        let end = minute_of(self.end);
        if start == end {
            vec![(0, MINUTES_PER_DAY)]
        } else if start < end {
            vec![(start, end)]
        } else {
            vec![(start, MINUTES_PER_DAY), (0, end)]
        }
    }
}

/// The ordered time slots for one (season, day type) pair.
///
/// Slots may overlap; lookup scans them in declared order and the first match wins. Minutes
/// not covered by any slot fall back to the profile's default period.
#[derive(Clone, PartialEq, Debug)]
pub struct DaySchedule {
    slots: Vec<TimeSlot>,
    ranges: Vec<Vec<(usize, usize)>>,
}

impl DaySchedule {
    /// Create a schedule from ordered slots, resolving each slot's minute coverage
    pub fn new(slots: Vec<TimeSlot>) -> Self {
        let ranges = slots.iter().map(TimeSlot::minute_ranges).collect();
        Self { slots, ranges }
    }

    /// The slots in declared order
    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    /// The period in force at the given time, or `None` if no slot covers it
    pub fn period_at(&self, time: NaiveTime) -> Option<&RatePeriod> {
        let minute = minute_of(time);
        self.iter_coverage()
            .find(|(_, ranges)| ranges.iter().any(|&(lo, hi)| lo <= minute && minute < hi))
            .map(|(period, _)| period)
    }

    /// Iterate over each slot's period and resolved minute ranges, in declared order
    pub(crate) fn iter_coverage(&self) -> impl Iterator<Item = (&RatePeriod, &[(usize, usize)])> {
        self.slots
            .iter()
            .zip(&self.ranges)
            .map(|(slot, ranges)| (&slot.period, ranges.as_slice()))
    }
}

impl FromIterator<TimeSlot> for DaySchedule {
    fn from_iter<I: IntoIterator<Item = TimeSlot>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[rstest]
    #[case("00:00", time(0, 0))]
    #[case("09:30", time(9, 30))]
    #[case("24:00", time(0, 0))] // alias for midnight
    fn test_parse_time_of_day(#[case] input: &str, #[case] expected: NaiveTime) {
        assert_eq!(parse_time_of_day(input).unwrap(), expected);
    }

    #[rstest]
    #[case("9")]
    #[case("25:00")]
    #[case("24:30")]
    #[case("09:60")]
    #[case("ab:cd")]
    fn test_parse_time_of_day_invalid(#[case] input: &str) {
        assert!(parse_time_of_day(input).is_err());
    }

    #[test]
    fn test_period_parsing_canonicalises_labels() {
        assert_eq!(RatePeriod::from("peak"), RatePeriod::Peak);
        assert_eq!(RatePeriod::from("semi_peak"), RatePeriod::SemiPeak);
        assert_eq!(RatePeriod::from("off_peak"), RatePeriod::OffPeak);
        assert_eq!(
            RatePeriod::from("night_rate"),
            RatePeriod::Custom("night_rate".into())
        );
    }

    #[test]
    fn test_linear_slot_boundaries() {
        let schedule: DaySchedule =
            [TimeSlot::from_labels("09:00", "24:00", "peak").unwrap()].into_iter().collect();

        assert_eq!(schedule.period_at(time(8, 59)), None);
        assert_eq!(schedule.period_at(time(9, 0)), Some(&RatePeriod::Peak));
        assert_eq!(schedule.period_at(time(23, 59)), Some(&RatePeriod::Peak));
        assert_eq!(schedule.period_at(time(0, 0)), None); // end is exclusive
    }

    #[test]
    fn test_wrapping_slot() {
        let schedule: DaySchedule =
            [TimeSlot::from_labels("22:30", "07:30", "off_peak").unwrap()].into_iter().collect();

        assert_eq!(schedule.period_at(time(22, 30)), Some(&RatePeriod::OffPeak));
        assert_eq!(schedule.period_at(time(23, 59)), Some(&RatePeriod::OffPeak));
        assert_eq!(schedule.period_at(time(0, 0)), Some(&RatePeriod::OffPeak));
        assert_eq!(schedule.period_at(time(7, 29)), Some(&RatePeriod::OffPeak));
        assert_eq!(schedule.period_at(time(7, 30)), None);
        assert_eq!(schedule.period_at(time(12, 0)), None);
    }

    #[test]
    fn test_full_day_slot() {
        let schedule: DaySchedule =
            [TimeSlot::from_labels("00:00", "24:00", "off_peak").unwrap()].into_iter().collect();

        for minute in [0, 719, 1439] {
            let t = time(minute / 60, minute % 60);
            assert_eq!(schedule.period_at(t), Some(&RatePeriod::OffPeak));
        }
    }

    #[test]
    fn test_first_match_wins_for_overlapping_slots() {
        let schedule: DaySchedule = [
            TimeSlot::from_labels("09:00", "12:00", "peak").unwrap(),
            TimeSlot::from_labels("09:00", "24:00", "semi_peak").unwrap(),
        ]
        .into_iter()
        .collect();

        assert_eq!(schedule.period_at(time(10, 0)), Some(&RatePeriod::Peak));
        assert_eq!(schedule.period_at(time(12, 0)), Some(&RatePeriod::SemiPeak));
    }
}
