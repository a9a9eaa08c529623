//! The dense period lookup table behind batch tariff evaluation.
//!
//! The engine enumerates seasons × day types × 1440 minutes into a table of period codes so
//! that resolving a large batch of timestamps costs O(1) per timestamp after a one-time
//! construction pass over the configured slots.
use crate::day_type::DayType;
use crate::profile::{TariffContext, TariffProfile, minute_of_day};
use crate::schedule::{MINUTES_PER_DAY, RatePeriod};
use crate::season::SeasonType;
use anyhow::{Result, ensure};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use indexmap::IndexSet;
use std::collections::{BTreeSet, HashMap};

/// A prebuilt season × day type × minute-of-day period lookup table.
#[derive(Debug)]
pub struct TariffEngine {
    seasons: Vec<SeasonType>,
    day_types: Vec<DayType>,
    /// Interned periods; code 0 is the profile's default period
    periods: Vec<RatePeriod>,
    day_type_index: HashMap<DayType, usize>,
    table: Vec<u8>,
}

impl TariffEngine {
    /// Build the lookup table for the given profile.
    ///
    /// Fails fast if the profile's strategies enumerate no seasons or no day types; once
    /// built, resolution itself never fails.
    pub(crate) fn build(profile: &TariffProfile) -> Result<Self> {
        let seasons = profile.season_strategy().all_seasons();
        let day_types = profile.day_type_strategy().all_day_types();
        ensure!(
            !seasons.is_empty() && !day_types.is_empty(),
            "Cannot build period lookup table: no seasons or day types to enumerate"
        );

        // Intern the periods appearing in the profile, default first
        let mut periods: IndexSet<RatePeriod> = IndexSet::new();
        periods.insert(profile.default_period().clone());
        for schedule in profile.schedules().values() {
            for slot in schedule.slots() {
                periods.insert(slot.period.clone());
            }
        }
        ensure!(
            periods.len() <= usize::from(u8::MAX) + 1,
            "Too many distinct rate periods: {}",
            periods.len()
        );

        let day_type_index: HashMap<_, _> = day_types
            .iter()
            .enumerate()
            .map(|(i, day_type)| (day_type.clone(), i))
            .collect();

        // Unpainted minutes keep code 0, the default period
        let mut table = vec![0u8; seasons.len() * day_types.len() * MINUTES_PER_DAY];
        for ((season, day_type), schedule) in profile.schedules() {
            let Some(s_idx) = seasons.iter().position(|s| s == season) else {
                continue;
            };
            let Some(&d_idx) = day_type_index.get(day_type) else {
                continue;
            };
            let offset = (s_idx * day_types.len() + d_idx) * MINUTES_PER_DAY;

            // Paint in reverse declaration order so that, where slots overlap, the earliest
            // declared slot ends up owning the minute (first-match-wins).
            for (period, ranges) in schedule.iter_coverage().collect::<Vec<_>>().into_iter().rev()
            {
                let code = periods.get_index_of(period).unwrap() as u8;
                for &(lo, hi) in ranges {
                    table[offset + lo..offset + hi].fill(code);
                }
            }
        }

        Ok(Self {
            seasons,
            day_types,
            periods: periods.into_iter().collect(),
            day_type_index,
            table,
        })
    }

    /// The interned periods, default period first
    pub fn periods(&self) -> &[RatePeriod] {
        &self.periods
    }

    /// Resolve season, day type and period for every timestamp in the batch.
    ///
    /// Season and day-type strategies are consulted once per distinct calendar date, not once
    /// per timestamp, and holiday data for the distinct years is preloaded with a single
    /// call; with many intraday readings on few days the strategy cost scales with the day
    /// count. Output rows preserve the input's order and duplicates.
    pub(crate) fn resolve_batch(
        &self,
        profile: &TariffProfile,
        timestamps: &[NaiveDateTime],
    ) -> TariffContext {
        // Deduplicate by calendar date, remembering each row's date position
        let mut distinct_dates: IndexSet<NaiveDate> = IndexSet::new();
        let mut date_pos = Vec::with_capacity(timestamps.len());
        for ts in timestamps {
            let (idx, _) = distinct_dates.insert_full(ts.date());
            date_pos.push(idx);
        }
        let date_list: Vec<NaiveDate> = distinct_dates.into_iter().collect();

        let years: BTreeSet<i32> = date_list.iter().map(NaiveDate::year).collect();
        profile.day_type_strategy().preload(&years);

        let seasons_by_date: Vec<SeasonType> = date_list
            .iter()
            .map(|&date| profile.season_strategy().season_of(date))
            .collect();
        let day_types_by_date = profile.day_type_strategy().day_types_batch(&date_list);

        let s_idx_by_date: Vec<usize> = seasons_by_date
            .iter()
            .map(|season| self.seasons.iter().position(|s| s == season).unwrap_or(0))
            .collect();
        let d_idx_by_date: Vec<usize> = day_types_by_date
            .iter()
            .map(|day_type| self.day_type_index.get(day_type).copied().unwrap_or(0))
            .collect();

        let mut seasons = Vec::with_capacity(timestamps.len());
        let mut day_types = Vec::with_capacity(timestamps.len());
        let mut periods = Vec::with_capacity(timestamps.len());
        for (&ts, &pos) in timestamps.iter().zip(&date_pos) {
            let offset =
                (s_idx_by_date[pos] * self.day_types.len() + d_idx_by_date[pos]) * MINUTES_PER_DAY;
            let code = self.table[offset + minute_of_day(ts)];
            seasons.push(seasons_by_date[pos]);
            day_types.push(day_types_by_date[pos].clone());
            periods.push(self.periods[code as usize].clone());
        }

        TariffContext {
            timestamps: timestamps.to_vec(),
            seasons,
            day_types,
            periods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{residential_two_tier_profile, timestamp};
    use rstest::rstest;

    #[rstest]
    fn test_batch_scalar_equivalence(residential_two_tier_profile: TariffProfile) {
        let profile = residential_two_tier_profile;
        let timestamps = vec![
            timestamp(2025, 7, 1, 8, 59),
            timestamp(2025, 7, 1, 9, 0),
            timestamp(2025, 7, 1, 23, 59),
            timestamp(2025, 7, 2, 0, 0),
            timestamp(2025, 7, 5, 12, 0),  // Saturday
            timestamp(2025, 7, 6, 12, 0),  // Sunday
            timestamp(2025, 12, 1, 18, 0), // non-summer weekday
        ];
        let context = profile.evaluate(&timestamps).unwrap();

        assert_eq!(context.len(), timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let (season, day_type, period) = profile.context_at(ts);
            assert_eq!(context.seasons[i], season, "season mismatch at {ts}");
            assert_eq!(context.day_types[i], day_type, "day type mismatch at {ts}");
            assert_eq!(context.periods[i], period, "period mismatch at {ts}");
        }
    }

    #[rstest]
    fn test_batch_preserves_order_and_duplicates(residential_two_tier_profile: TariffProfile) {
        let ts = timestamp(2025, 7, 1, 10, 0);
        let context = residential_two_tier_profile
            .evaluate(&[ts, ts, timestamp(2025, 7, 1, 3, 0)])
            .unwrap();
        assert_eq!(context.len(), 3);
        assert_eq!(context.periods[0], context.periods[1]);
        assert_eq!(context.periods[0], RatePeriod::Peak);
        assert_eq!(context.periods[2], RatePeriod::OffPeak);
    }

    #[rstest]
    fn test_every_minute_resolves(residential_two_tier_profile: TariffProfile) {
        // Slot coverage completeness: every minute of a summer weekday maps to some period
        let profile = residential_two_tier_profile;
        let timestamps: Vec<_> = (0..MINUTES_PER_DAY)
            .map(|m| timestamp(2025, 7, 1, (m / 60) as u32, (m % 60) as u32))
            .collect();
        let context = profile.evaluate(&timestamps).unwrap();
        assert_eq!(context.len(), MINUTES_PER_DAY);
        // 09:00-24:00 peak, the rest off-peak
        for (i, period) in context.periods.iter().enumerate() {
            let expected = if i >= 540 {
                RatePeriod::Peak
            } else {
                RatePeriod::OffPeak
            };
            assert_eq!(*period, expected, "minute {i}");
        }
    }

    #[rstest]
    fn test_empty_batch(residential_two_tier_profile: TariffProfile) {
        let context = residential_two_tier_profile.evaluate(&[]).unwrap();
        assert!(context.is_empty());
    }

    #[test]
    fn test_build_fails_without_seasons() {
        use crate::calendar::TaiwanCalendar;
        use crate::day_type::TaiwanDayTypeStrategy;
        use crate::fixture::assert_error;
        use crate::season::SeasonStrategy;
        use std::rc::Rc;

        struct NoSeasons;
        impl SeasonStrategy for NoSeasons {
            fn season_of(&self, _date: NaiveDate) -> SeasonType {
                SeasonType::Summer
            }

            fn all_seasons(&self) -> Vec<SeasonType> {
                Vec::new()
            }
        }

        let profile = TariffProfile::new(
            "broken",
            Box::new(NoSeasons),
            Box::new(TaiwanDayTypeStrategy::new(Rc::new(TaiwanCalendar::new()))),
            Default::default(),
            RatePeriod::OffPeak,
        );
        assert_error!(
            profile.ensure_built(),
            "Cannot build period lookup table: no seasons or day types to enumerate"
        );
    }
}
