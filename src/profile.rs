//! Code for tariff profiles: the season/day-type/time-of-day structure of a plan.
use crate::day_type::{DayType, DayTypeStrategy};
use crate::engine::TariffEngine;
use crate::schedule::{DaySchedule, RatePeriod};
use crate::season::{SeasonStrategy, SeasonType};
use anyhow::Result;
use chrono::{NaiveDateTime, Timelike};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use std::cell::OnceCell;

/// A schedule map from (season, day type) to the day's time slots
pub type ScheduleMap = IndexMap<(SeasonType, DayType), DaySchedule>;

/// The season, day-type and time-of-day structure of a tariff plan.
///
/// A profile composes a season strategy, a day-type strategy and a day schedule for each
/// (season, day type) pair that the plan distinguishes. Minutes not covered by any slot, and
/// (season, day type) pairs with no schedule at all, resolve to the default period.
pub struct TariffProfile {
    name: String,
    season_strategy: Box<dyn SeasonStrategy>,
    day_type_strategy: Box<dyn DayTypeStrategy>,
    schedules: ScheduleMap,
    default_period: RatePeriod,
    engine: OnceCell<TariffEngine>,
}

impl TariffProfile {
    /// Create a profile from its parts
    pub fn new(
        name: &str,
        season_strategy: Box<dyn SeasonStrategy>,
        day_type_strategy: Box<dyn DayTypeStrategy>,
        schedules: ScheduleMap,
        default_period: RatePeriod,
    ) -> Self {
        Self {
            name: name.to_string(),
            season_strategy,
            day_type_strategy,
            schedules,
            default_period,
            engine: OnceCell::new(),
        }
    }

    /// The profile's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The period minutes fall back to when no slot covers them
    pub fn default_period(&self) -> &RatePeriod {
        &self.default_period
    }

    /// The configured season strategy
    pub fn season_strategy(&self) -> &dyn SeasonStrategy {
        self.season_strategy.as_ref()
    }

    /// The configured day-type strategy
    pub fn day_type_strategy(&self) -> &dyn DayTypeStrategy {
        self.day_type_strategy.as_ref()
    }

    /// The configured schedules
    pub fn schedules(&self) -> &ScheduleMap {
        &self.schedules
    }

    /// The schedule for the given (season, day type) pair, if one is configured
    pub fn schedule_for(&self, season: SeasonType, day_type: &DayType) -> Option<&DaySchedule> {
        self.schedules.get(&(season, day_type.clone()))
    }

    /// Build the period lookup engine if it has not been built yet.
    ///
    /// The engine is built once per profile and cached. Building is not thread-safe; callers
    /// sharing a profile across threads should call this before sharing.
    pub fn ensure_built(&self) -> Result<&TariffEngine> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }
        let engine = TariffEngine::build(self)?;
        Ok(self.engine.get_or_init(|| engine))
    }

    /// The rate period in force at the given instant.
    ///
    /// Resolution never fails: an instant with no configured schedule or covering slot
    /// resolves to the default period.
    pub fn period_at(&self, at: NaiveDateTime) -> RatePeriod {
        let season = self.season_strategy.season_of(at.date());
        let day_type = self.day_type_strategy.day_type_of(at.date());
        match self.schedule_for(season, &day_type) {
            Some(schedule) => schedule
                .period_at(at.time())
                .unwrap_or(&self.default_period)
                .clone(),
            None => self.default_period.clone(),
        }
    }

    /// The (season, day type, period) context at the given instant
    pub fn context_at(&self, at: NaiveDateTime) -> (SeasonType, DayType, RatePeriod) {
        let season = self.season_strategy.season_of(at.date());
        let day_type = self.day_type_strategy.day_type_of(at.date());
        let period = match self.schedule_for(season, &day_type) {
            Some(schedule) => schedule
                .period_at(at.time())
                .unwrap_or(&self.default_period)
                .clone(),
            None => self.default_period.clone(),
        };
        (season, day_type, period)
    }

    /// Resolve season, day type and period for every timestamp in the batch.
    ///
    /// Builds the lookup engine on first use; see [`TariffEngine::resolve_batch`] for the
    /// performance contract.
    pub fn evaluate(&self, timestamps: &[NaiveDateTime]) -> Result<TariffContext> {
        Ok(self.ensure_built()?.resolve_batch(self, timestamps))
    }

    /// A serializable description of the profile
    pub fn describe(&self) -> ProfileDescription {
        let schedules = self
            .schedules
            .iter()
            .map(|((season, day_type), schedule)| ScheduleDescription {
                season: season.label().to_string(),
                day_type: day_type.to_string(),
                slots: schedule
                    .slots()
                    .iter()
                    .map(|slot| SlotDescription {
                        start: slot.start.format("%H:%M").to_string(),
                        end: slot.end.format("%H:%M").to_string(),
                        period: slot.period.label().to_string(),
                    })
                    .collect(),
            })
            .sorted_by(|a, b| (&a.season, &a.day_type).cmp(&(&b.season, &b.day_type)))
            .collect();

        ProfileDescription {
            name: self.name.clone(),
            seasons: self
                .season_strategy
                .all_seasons()
                .iter()
                .map(|season| season.label().to_string())
                .collect(),
            day_types: self
                .day_type_strategy
                .all_day_types()
                .iter()
                .map(DayType::to_string)
                .collect(),
            default_period: self.default_period.label().to_string(),
            schedules,
        }
    }
}

impl std::fmt::Debug for TariffProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TariffProfile")
            .field("name", &self.name)
            .field("default_period", &self.default_period)
            .field("schedules", &self.schedules.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Season, day-type and period columns aligned to a batch of timestamps.
///
/// Rows are in input order; duplicates in the input yield duplicate rows.
#[derive(Clone, PartialEq, Debug)]
pub struct TariffContext {
    /// The input timestamps, in input order
    pub timestamps: Vec<NaiveDateTime>,
    /// The season of each timestamp
    pub seasons: Vec<SeasonType>,
    /// The day type of each timestamp
    pub day_types: Vec<DayType>,
    /// The rate period of each timestamp
    pub periods: Vec<RatePeriod>,
}

impl TariffContext {
    /// The number of rows
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the context has no rows
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// A serializable description of a single time slot
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct SlotDescription {
    /// Start of the slot as "HH:MM"
    pub start: String,
    /// End of the slot as "HH:MM"
    pub end: String,
    /// The slot's rate-period label
    pub period: String,
}

/// A serializable description of one (season, day type) schedule
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct ScheduleDescription {
    /// The season label
    pub season: String,
    /// The day-type label
    pub day_type: String,
    /// The slots in declared order
    pub slots: Vec<SlotDescription>,
}

/// A serializable description of a tariff profile
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct ProfileDescription {
    /// The profile's name
    pub name: String,
    /// All season labels
    pub seasons: Vec<String>,
    /// All day-type labels
    pub day_types: Vec<String>,
    /// The default period label
    pub default_period: String,
    /// All configured schedules
    pub schedules: Vec<ScheduleDescription>,
}

/// The minute of the day for the given timestamp
pub(crate) fn minute_of_day(at: NaiveDateTime) -> usize {
    (at.time().hour() * 60 + at.time().minute()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{residential_two_tier_profile, timestamp};
    use rstest::rstest;

    #[rstest]
    fn test_scalar_resolution_boundaries(residential_two_tier_profile: TariffProfile) {
        let profile = residential_two_tier_profile;
        // Summer weekday: peak runs 09:00-24:00
        assert_eq!(
            profile.period_at(timestamp(2025, 7, 1, 8, 59)),
            RatePeriod::OffPeak
        );
        assert_eq!(
            profile.period_at(timestamp(2025, 7, 1, 9, 0)),
            RatePeriod::Peak
        );
        assert_eq!(
            profile.period_at(timestamp(2025, 7, 1, 23, 59)),
            RatePeriod::Peak
        );
        assert_eq!(
            profile.period_at(timestamp(2025, 7, 2, 0, 0)),
            RatePeriod::OffPeak
        );
    }

    #[rstest]
    fn test_unconfigured_pair_resolves_to_default(residential_two_tier_profile: TariffProfile) {
        // 2025-07-06 is a Sunday; no schedule is configured for sunday_holiday
        let period = residential_two_tier_profile.period_at(timestamp(2025, 7, 6, 12, 0));
        assert_eq!(period, RatePeriod::OffPeak);
    }

    #[rstest]
    fn test_describe_lists_schedules(residential_two_tier_profile: TariffProfile) {
        let description = residential_two_tier_profile.describe();
        assert_eq!(description.name, "residential_simple_2_tier");
        assert_eq!(description.seasons, vec!["summer", "non_summer"]);
        assert_eq!(
            description.day_types,
            vec!["weekday", "saturday", "sunday_holiday"]
        );
        assert_eq!(description.default_period, "off_peak");
        assert!(!description.schedules.is_empty());
        // Sorted by season then day type
        let keys: Vec<_> = description
            .schedules
            .iter()
            .map(|s| (s.season.clone(), s.day_type.clone()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
