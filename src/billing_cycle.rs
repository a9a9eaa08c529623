//! Code for grouping timestamps into billing periods.
//!
//! Taipower reads most meters every two months, with customers split into odd-month and
//! even-month reading groups. The billing period a reading belongs to is keyed by the
//! period's meter-reading (anchor) month.
use crate::series::UsageSeries;
use chrono::{Datelike, NaiveDateTime};
use indexmap::IndexMap;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::fmt::Display;

/// The meter-reading cycle a plan is billed on.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Debug,
    Default,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum BillingCycleType {
    /// Meters read every month
    #[default]
    #[string = "monthly"]
    Monthly,
    /// Meters read in odd months; periods pair (Dec, Jan), (Feb, Mar), ...
    #[string = "odd_month"]
    OddMonth,
    /// Meters read in even months; periods pair (Jan, Feb), (Mar, Apr), ...
    #[string = "even_month"]
    EvenMonth,
}

impl BillingCycleType {
    /// The factor applied to finite tier boundaries under this cycle.
    ///
    /// Bimonthly cycles double every finite tier limit; usage is never halved, which keeps
    /// the brackets progressive when usage is lumpy across the two months.
    pub fn tier_multiplier(&self) -> f64 {
        match self {
            BillingCycleType::Monthly => 1.0,
            BillingCycleType::OddMonth | BillingCycleType::EvenMonth => 2.0,
        }
    }

    /// The number of calendar months one billing period spans
    pub fn months_per_period(&self) -> u32 {
        match self {
            BillingCycleType::Monthly => 1,
            BillingCycleType::OddMonth | BillingCycleType::EvenMonth => 2,
        }
    }
}

/// A billing period, identified by the year and anchor month of its meter reading.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BillingPeriod {
    /// The calendar year of the anchor month
    pub year: i32,
    /// The anchor (meter-reading) month, 1-12
    pub month: u32,
}

impl Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl serde::Serialize for BillingPeriod {
    fn serialize<S>(&self, serialiser: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialiser.collect_str(self)
    }
}

/// The billing period the given timestamp belongs to under the given cycle.
///
/// Every timestamp maps to exactly one period. Odd-month cycles move December into January
/// of the *following* year; even-month cycles never cross a year boundary, so December of
/// year Y and January of year Y+1 land in different periods.
pub fn billing_period_key(at: NaiveDateTime, cycle: BillingCycleType) -> BillingPeriod {
    let year = at.year();
    let month = at.month();
    match cycle {
        BillingCycleType::Monthly => BillingPeriod { year, month },
        BillingCycleType::OddMonth => {
            if month == 12 {
                BillingPeriod {
                    year: year + 1,
                    month: 1,
                }
            } else if month == 1 {
                BillingPeriod { year, month: 1 }
            } else {
                // Rounds 2,3 -> 3; 4,5 -> 5; ...; 10,11 -> 11
                BillingPeriod {
                    year,
                    month: (month / 2) * 2 + 1,
                }
            }
        }
        // Rounds 1,2 -> 2; 3,4 -> 4; ...; 11,12 -> 12
        BillingCycleType::EvenMonth => BillingPeriod {
            year,
            month: (month + 1) / 2 * 2,
        },
    }
}

/// The plain calendar-month key for the given timestamp
pub fn month_key(at: NaiveDateTime) -> BillingPeriod {
    BillingPeriod {
        year: at.year(),
        month: at.month(),
    }
}

/// Group a series' row indices by billing period, preserving chronological order.
///
/// The groups partition the series: every row lands in exactly one group.
pub fn group_by_billing_period(
    series: &UsageSeries,
    cycle: BillingCycleType,
) -> IndexMap<BillingPeriod, Vec<usize>> {
    let mut groups: IndexMap<BillingPeriod, Vec<usize>> = IndexMap::new();
    for (row, &ts) in series.timestamps().iter().enumerate() {
        groups
            .entry(billing_period_key(ts, cycle))
            .or_default()
            .push(row);
    }
    groups.sort_unstable_keys();
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::timestamp;
    use rstest::rstest;

    #[rstest]
    #[case(timestamp(2025, 2, 10, 0, 0), 2025, 3)]
    #[case(timestamp(2025, 3, 10, 0, 0), 2025, 3)]
    #[case(timestamp(2025, 1, 10, 0, 0), 2025, 1)]
    #[case(timestamp(2024, 12, 10, 0, 0), 2025, 1)] // December crosses into next year
    #[case(timestamp(2025, 10, 31, 23, 59), 2025, 11)]
    #[case(timestamp(2025, 11, 1, 0, 0), 2025, 11)]
    fn test_odd_month_grouping(
        #[case] at: NaiveDateTime,
        #[case] year: i32,
        #[case] month: u32,
    ) {
        assert_eq!(
            billing_period_key(at, BillingCycleType::OddMonth),
            BillingPeriod { year, month }
        );
    }

    #[rstest]
    #[case(timestamp(2025, 1, 10, 0, 0), 2025, 2)]
    #[case(timestamp(2025, 2, 10, 0, 0), 2025, 2)]
    #[case(timestamp(2024, 12, 10, 0, 0), 2024, 12)] // no year-crossing
    #[case(timestamp(2025, 11, 10, 0, 0), 2025, 12)]
    fn test_even_month_grouping(
        #[case] at: NaiveDateTime,
        #[case] year: i32,
        #[case] month: u32,
    ) {
        assert_eq!(
            billing_period_key(at, BillingCycleType::EvenMonth),
            BillingPeriod { year, month }
        );
    }

    #[test]
    fn test_monthly_grouping_is_identity() {
        let at = timestamp(2025, 7, 15, 12, 30);
        assert_eq!(
            billing_period_key(at, BillingCycleType::Monthly),
            BillingPeriod {
                year: 2025,
                month: 7
            }
        );
    }

    #[test]
    fn test_dec_jan_split_under_even_month() {
        // December 2024 and January 2025 must land in different periods
        let dec = billing_period_key(timestamp(2024, 12, 31, 23, 59), BillingCycleType::EvenMonth);
        let jan = billing_period_key(timestamp(2025, 1, 1, 0, 0), BillingCycleType::EvenMonth);
        assert_ne!(dec, jan);
        assert_eq!(
            dec,
            BillingPeriod {
                year: 2024,
                month: 12
            }
        );
        assert_eq!(
            jan,
            BillingPeriod {
                year: 2025,
                month: 2
            }
        );
    }

    #[test]
    fn test_groups_partition_the_series() {
        let series = UsageSeries::from_pairs(
            (0..12).map(|m| (timestamp(2025, m + 1, 15, 0, 0), 1.0)),
        );
        for cycle in [
            BillingCycleType::Monthly,
            BillingCycleType::OddMonth,
            BillingCycleType::EvenMonth,
        ] {
            let groups = group_by_billing_period(&series, cycle);
            let mut rows: Vec<_> = groups.values().flatten().copied().collect();
            rows.sort_unstable();
            assert_eq!(rows, (0..12).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_group_keys_are_sorted() {
        let series = UsageSeries::from_pairs([
            (timestamp(2024, 11, 15, 0, 0), 1.0),
            (timestamp(2024, 12, 15, 0, 0), 1.0),
            (timestamp(2025, 1, 15, 0, 0), 1.0),
            (timestamp(2025, 2, 15, 0, 0), 1.0),
        ]);
        let groups = group_by_billing_period(&series, BillingCycleType::OddMonth);
        let keys: Vec<_> = groups.keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                BillingPeriod {
                    year: 2024,
                    month: 11
                },
                BillingPeriod {
                    year: 2025,
                    month: 1
                },
                BillingPeriod {
                    year: 2025,
                    month: 3
                },
            ]
        );
        // Dec 2024 and Jan 2025 share the Jan 2025 period
        assert_eq!(
            groups[&BillingPeriod {
                year: 2025,
                month: 1
            }],
            vec![1, 2]
        );
    }

    #[test]
    fn test_billing_period_display() {
        let period = BillingPeriod {
            year: 2025,
            month: 3,
        };
        assert_eq!(period.to_string(), "2025-03");
    }
}
