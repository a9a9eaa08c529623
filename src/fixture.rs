//! Fixtures for tests
use crate::calendar::TaiwanCalendar;
use crate::day_type::TaiwanDayTypeStrategy;
use crate::plan::TariffPlan;
use crate::profile::{ScheduleMap, TariffProfile};
use crate::rate::{ConsumptionTier, TariffRate};
use crate::schedule::{RatePeriod, TimeSlot};
use crate::season::{SeasonType, TaiwanSeasonStrategy};
use crate::units::{Energy, MoneyPerEnergy};
use chrono::{NaiveDate, NaiveDateTime};
use rstest::fixture;
use std::rc::Rc;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// A timestamp from its parts, for concise test data
pub fn timestamp(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// The simple two-tier residential TOU profile: summer weekday peak 09:00-24:00, non-summer
/// weekday peak 06:00-11:00 and 14:00-24:00, everything else off-peak.
#[fixture]
pub fn residential_two_tier_profile() -> TariffProfile {
    let calendar = Rc::new(TaiwanCalendar::new());
    let schedules: ScheduleMap = [
        (
            (SeasonType::Summer, "weekday".into()),
            [TimeSlot::from_labels("09:00", "24:00", "peak").unwrap()]
                .into_iter()
                .collect(),
        ),
        (
            (SeasonType::NonSummer, "weekday".into()),
            [
                TimeSlot::from_labels("06:00", "11:00", "peak").unwrap(),
                TimeSlot::from_labels("14:00", "24:00", "peak").unwrap(),
            ]
            .into_iter()
            .collect(),
        ),
    ]
    .into_iter()
    .collect();

    TariffProfile::new(
        "residential_simple_2_tier",
        Box::new(TaiwanSeasonStrategy::default()),
        Box::new(TaiwanDayTypeStrategy::new(calendar)),
        schedules,
        RatePeriod::OffPeak,
    )
}

#[fixture]
pub fn residential_two_tier_plan(residential_two_tier_profile: TariffProfile) -> TariffPlan {
    let rates = TariffRate::from_period_costs([
        (
            (SeasonType::Summer, RatePeriod::Peak),
            MoneyPerEnergy(5.01),
        ),
        (
            (SeasonType::Summer, RatePeriod::OffPeak),
            MoneyPerEnergy(1.96),
        ),
        (
            (SeasonType::NonSummer, RatePeriod::Peak),
            MoneyPerEnergy(4.78),
        ),
        (
            (SeasonType::NonSummer, RatePeriod::OffPeak),
            MoneyPerEnergy(1.89),
        ),
    ]);
    TariffPlan::new(residential_two_tier_profile, rates)
}

/// A two-bracket tiered plan: up to 120 kWh at 1.96/1.78, the rest at 2.55/2.26
/// (summer/non-summer).
#[fixture]
pub fn residential_tiered_plan() -> TariffPlan {
    let calendar = Rc::new(TaiwanCalendar::new());
    let profile = TariffProfile::new(
        "residential_non_tou",
        Box::new(TaiwanSeasonStrategy::default()),
        Box::new(TaiwanDayTypeStrategy::new(calendar)),
        ScheduleMap::new(),
        RatePeriod::OffPeak,
    );
    let rates = TariffRate::from_tiers(vec![
        ConsumptionTier {
            start_kwh: Energy(0.0),
            end_kwh: Some(Energy(120.0)),
            summer_cost: MoneyPerEnergy(1.96),
            non_summer_cost: MoneyPerEnergy(1.78),
        },
        ConsumptionTier {
            start_kwh: Energy(120.0),
            end_kwh: None,
            summer_cost: MoneyPerEnergy(2.55),
            non_summer_cost: MoneyPerEnergy(2.26),
        },
    ]);
    TariffPlan::new(profile, rates)
}
