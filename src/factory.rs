//! Code for building tariff plans from the bundled rate-table data.
//!
//! The rate tables ship with the crate as JSON; [`PlanStore`] parses and indexes them and
//! [`TariffFactory`] wires plan data to a holiday calendar to produce ready-to-use
//! [`TariffPlan`]s. Callers with their own rate tables can load them through
//! [`PlanStore::from_json_str`] as long as the shapes match.
use crate::billing_cycle::BillingCycleType;
use crate::calendar::HolidayCalendar;
use crate::day_type::TaiwanDayTypeStrategy;
use crate::plan::TariffPlan;
use crate::profile::{ScheduleMap, TariffProfile};
use crate::rate::{ConsumptionTier, TariffRate};
use crate::schedule::{DaySchedule, RatePeriod, TimeSlot};
use crate::season::{SeasonType, TaiwanSeasonStrategy};
use crate::units::{Energy, MoneyPerEnergy};
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use itertools::Itertools;
use log::info;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::collections::HashMap;
use std::rc::Rc;

/// The bundled Taipower rate tables
const BUILTIN_PLANS: &str = include_str!("data/plans.json");

/// The parsed contents of a rate-table file
#[derive(PartialEq, Debug, Deserialize)]
struct PlansFile {
    #[serde(default)]
    definitions: Definitions,
    plans: Vec<PlanData>,
}

/// Shared definitions referenced by plans
#[derive(PartialEq, Debug, Deserialize, Default)]
pub struct Definitions {
    /// Named season windows; the "summer" entry drives the season strategy
    #[serde(default)]
    pub seasons: Vec<SeasonDef>,
    /// Named minimum-usage rulesets, referenced by plans via `minimum_usage_rules_ref`
    #[serde(default)]
    pub minimum_usage_rules: HashMap<String, Vec<MinimumUsageRule>>,
}

/// A season window definition with "MM-DD" bounds
#[derive(PartialEq, Debug, Deserialize)]
pub struct SeasonDef {
    /// The season's name
    pub name: String,
    /// First day of the window, inclusive
    pub start: String,
    /// Last day of the window, inclusive
    pub end: String,
}

/// A minimum-usage rule for one meter specification
#[derive(PartialEq, Clone, Debug, Deserialize)]
pub struct MinimumUsageRule {
    /// The meter phase ("single" or "three")
    pub phase: String,
    /// The meter voltage in volts
    pub voltage_v: u32,
    /// Minimum kWh per ampere per month
    pub kwh_per_ampere: f64,
    /// Amperage above which `kwh_per_ampere_over` applies instead
    #[serde(default)]
    pub ampere_threshold: Option<f64>,
    /// Minimum kWh per ampere per month above the threshold
    #[serde(default)]
    pub kwh_per_ampere_over: Option<f64>,
}

/// One plan's raw rate-table data
#[derive(PartialEq, Clone, Debug, Deserialize)]
pub struct PlanData {
    /// The plan identifier
    pub id: String,
    /// The plan's display name
    pub name: String,
    /// The tariff category (e.g. "lighting", "high_voltage")
    #[serde(default)]
    pub category: String,
    /// The default billing cycle, if the plan prescribes one
    #[serde(default)]
    pub billing_cycle: Option<BillingCycleType>,
    /// Time-of-day slot rows
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
    /// Per-period unit costs
    #[serde(default)]
    pub rates: Vec<PeriodCostEntry>,
    /// Consumption tiers
    #[serde(default)]
    pub tiers: Vec<TierEntry>,
    /// Flat per-household basic fee
    #[serde(default)]
    pub basic_fee: Option<f64>,
    /// Labelled basic-fee entries
    #[serde(default)]
    pub basic_fees: Vec<BasicFeeEntry>,
    /// Billing-rule metadata consumed by the billing orchestrator
    #[serde(default)]
    pub billing_rules: BillingRules,
}

/// One time-of-day slot row
#[derive(PartialEq, Clone, Debug, Deserialize)]
pub struct ScheduleEntry {
    /// The season the slot applies to
    pub season: SeasonType,
    /// The day type the slot applies to
    pub day_type: String,
    /// Start of the slot as "HH:MM"
    pub start: String,
    /// End of the slot as "HH:MM"
    pub end: String,
    /// The slot's rate-period label
    pub period: String,
}

/// One (season, period) unit cost row
#[derive(PartialEq, Clone, Debug, Deserialize)]
pub struct PeriodCostEntry {
    /// The season the cost applies to
    pub season: SeasonType,
    /// The rate-period label
    pub period: String,
    /// The unit cost in NTD per kWh
    pub cost: f64,
}

/// One consumption tier row
#[derive(PartialEq, Clone, Debug, Deserialize)]
pub struct TierEntry {
    /// Lower bound of the bracket in kWh
    pub min: f64,
    /// Upper bound of the bracket in kWh, or null for no limit
    pub max: Option<f64>,
    /// Summer unit cost
    pub summer: f64,
    /// Non-summer unit cost
    pub non_summer: f64,
}

/// A labelled basic-fee entry
#[derive(PartialEq, Clone, Debug, Deserialize)]
pub struct BasicFeeEntry {
    /// The fee's label, referenced from billing inputs and formulas
    pub label: String,
    /// The fee's unit ("per_household_month" or "per_kw_month")
    #[serde(default)]
    pub unit: Option<String>,
    /// Season-independent rate
    #[serde(default)]
    pub cost: Option<f64>,
    /// Summer rate, for season-dependent fees
    #[serde(default)]
    pub summer: Option<f64>,
    /// Non-summer rate, for season-dependent fees
    #[serde(default)]
    pub non_summer: Option<f64>,
}

/// Billing-rule metadata for a plan
#[derive(PartialEq, Clone, Debug, Deserialize, Default)]
pub struct BillingRules {
    /// Surcharge applied to usage above a threshold
    #[serde(default)]
    pub over_2000_kwh_surcharge: Option<SurchargeRule>,
    /// Contract-capacity basic-fee formula
    #[serde(default)]
    pub basic_fee_formula: Option<BasicFeeFormula>,
    /// Name of the minimum-usage ruleset that applies to the plan
    #[serde(default)]
    pub minimum_usage_rules_ref: Option<String>,
    /// Floor for the monthly total
    #[serde(default)]
    pub min_monthly_fee: Option<f64>,
    /// Power-factor adjustment rule
    #[serde(default)]
    pub power_factor_adjustment: Option<PowerFactorRule>,
}

/// A usage surcharge above a threshold
#[derive(PartialEq, Clone, Copy, Debug, Deserialize)]
pub struct SurchargeRule {
    /// Usage above this many kWh per billing period is surcharged
    pub threshold_kwh: f64,
    /// Surcharge per kWh above the threshold
    pub cost_per_kwh: f64,
}

/// The shape of a contract-capacity basic-fee formula
#[derive(
    PartialEq, Clone, Copy, Debug, DeserializeLabeledStringEnum,
)]
pub enum FormulaType {
    /// Regular capacity only
    #[string = "regular_only"]
    RegularOnly,
    /// Regular + non-summer + weekend capacities
    #[string = "two_stage"]
    TwoStage,
    /// Regular + semi-peak + weekend capacities
    #[string = "three_stage"]
    ThreeStage,
}

/// A contract-capacity basic-fee formula
#[derive(PartialEq, Clone, Debug, Deserialize)]
pub struct BasicFeeFormula {
    /// The formula's shape
    #[serde(rename = "type")]
    pub kind: FormulaType,
    /// Label of the regular-capacity fee entry
    pub regular_label: String,
    /// Label of the non-summer-capacity fee entry (two-stage formulas)
    #[serde(default)]
    pub non_summer_label: Option<String>,
    /// Label of the semi-peak-capacity fee entry (three-stage formulas)
    #[serde(default)]
    pub semi_peak_label: Option<String>,
    /// Label of the Saturday semi-peak fee entry
    pub saturday_label: String,
    /// Label of an additional per-household fee entry
    #[serde(default)]
    pub household_label: Option<String>,
    /// Fraction of weekday capacity already covering weekend demand
    #[serde(default = "default_weekend_ratio")]
    pub weekend_ratio: f64,
}

fn default_weekend_ratio() -> f64 {
    0.5
}

/// A power-factor adjustment rule
#[derive(PartialEq, Clone, Debug, Deserialize)]
pub struct PowerFactorRule {
    /// The power-factor percentage around which adjustments pivot
    #[serde(default = "default_pf_base")]
    pub base_percent: f64,
    /// The highest power factor that still earns a discount
    #[serde(default = "default_pf_max")]
    pub max_discount_percent: f64,
    /// Adjustment percentage per power-factor percentage point
    #[serde(default = "default_pf_step")]
    pub step_percent: f64,
    /// Which cost the adjustment applies to ("basic", "energy" or "total")
    #[serde(default = "default_pf_target")]
    pub apply_to: String,
}

fn default_pf_base() -> f64 {
    80.0
}

fn default_pf_max() -> f64 {
    95.0
}

fn default_pf_step() -> f64 {
    0.1
}

fn default_pf_target() -> String {
    "basic".to_string()
}

/// Parsed and indexed rate-table data.
pub struct PlanStore {
    file: PlansFile,
}

impl PlanStore {
    /// Parse the bundled rate tables
    pub fn new() -> Result<Self> {
        Self::from_json_str(BUILTIN_PLANS).context("Bundled plan data is invalid")
    }

    /// Parse rate tables from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file = serde_json::from_str(json)?;
        Ok(Self { file })
    }

    /// The shared definitions
    pub fn definitions(&self) -> &Definitions {
        &self.file.definitions
    }

    /// Look up a plan by its identifier
    pub fn plan(&self, plan_id: &str) -> Result<&PlanData> {
        match self.file.plans.iter().find(|plan| plan.id == plan_id) {
            Some(plan) => Ok(plan),
            None => bail!("Plan not found: {plan_id}"),
        }
    }

    /// All available plan identifiers
    pub fn plan_ids(&self) -> Vec<&str> {
        self.file.plans.iter().map(|plan| plan.id.as_str()).collect()
    }

    /// The season strategy defined by the "summer" season window
    pub fn season_strategy(&self) -> Result<TaiwanSeasonStrategy> {
        let Some(summer) = self
            .file
            .definitions
            .seasons
            .iter()
            .find(|def| def.name == "summer")
        else {
            return Ok(TaiwanSeasonStrategy::default());
        };
        Ok(TaiwanSeasonStrategy::new(
            parse_month_day(&summer.start)?,
            parse_month_day(&summer.end)?,
        ))
    }

    /// The minimum-usage rules with the given name, or an empty slice if absent
    pub fn minimum_usage_rules(&self, name: &str) -> &[MinimumUsageRule] {
        self.file
            .definitions
            .minimum_usage_rules
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Parse a "MM-DD" month-day pair
fn parse_month_day(value: &str) -> Result<(u32, u32)> {
    let (month, day) = value
        .split('-')
        .collect_tuple()
        .with_context(|| format!("Invalid month-day value: {value}"))?;
    let month = month
        .parse()
        .with_context(|| format!("Invalid month-day value: {value}"))?;
    let day = day
        .parse()
        .with_context(|| format!("Invalid month-day value: {value}"))?;
    Ok((month, day))
}

/// Builds [`TariffPlan`]s from rate-table data and a holiday calendar.
pub struct TariffFactory {
    calendar: Rc<dyn HolidayCalendar>,
    store: Rc<PlanStore>,
}

impl TariffFactory {
    /// Create a factory over the bundled rate tables
    pub fn new(calendar: Rc<dyn HolidayCalendar>) -> Result<Self> {
        Ok(Self {
            calendar,
            store: Rc::new(PlanStore::new()?),
        })
    }

    /// Create a factory over an explicit plan store
    pub fn with_store(calendar: Rc<dyn HolidayCalendar>, store: Rc<PlanStore>) -> Self {
        Self { calendar, store }
    }

    /// The factory's plan store
    pub fn store(&self) -> &PlanStore {
        &self.store
    }

    /// All available plan identifiers
    pub fn plan_ids(&self) -> Vec<&str> {
        self.store.plan_ids()
    }

    /// Build the plan with the given identifier.
    ///
    /// # Arguments
    ///
    /// * `plan_id` - The plan identifier in the rate tables
    ///
    /// # Returns
    ///
    /// A ready-to-use [`TariffPlan`], or an error if the plan is unknown or its data is
    /// malformed.
    pub fn create_plan(&self, plan_id: &str) -> Result<TariffPlan> {
        let data = self.store.plan(plan_id)?;
        info!("Building tariff plan {}", data.id);

        let season_strategy = self.store.season_strategy()?;
        let day_type_strategy = TaiwanDayTypeStrategy::new(Rc::clone(&self.calendar));

        let mut slots_by_key: IndexMap<(SeasonType, String), Vec<TimeSlot>> = IndexMap::new();
        for entry in &data.schedules {
            let slot = TimeSlot::from_labels(&entry.start, &entry.end, &entry.period)
                .with_context(|| format!("Invalid schedule entry in plan {}", data.id))?;
            slots_by_key
                .entry((entry.season, entry.day_type.clone()))
                .or_default()
                .push(slot);
        }
        let mut schedules: ScheduleMap = slots_by_key
            .into_iter()
            .map(|((season, day_type), slots)| {
                ((season, day_type.as_str().into()), DaySchedule::new(slots))
            })
            .collect();
        if schedules.is_empty() {
            // Tiered plans carry no slots; a full-day off-peak schedule keeps the profile
            // well-formed
            schedules.insert(
                (SeasonType::Summer, "weekday".into()),
                [TimeSlot::from_labels("00:00", "24:00", "off_peak")?]
                    .into_iter()
                    .collect(),
            );
        }

        let profile = TariffProfile::new(
            &data.id,
            Box::new(season_strategy),
            Box::new(day_type_strategy),
            schedules,
            RatePeriod::OffPeak,
        );

        let rates = if data.tiers.is_empty() {
            TariffRate::from_period_costs(data.rates.iter().map(|entry| {
                (
                    (entry.season, entry.period.as_str().into()),
                    MoneyPerEnergy(entry.cost),
                )
            }))
        } else {
            TariffRate::from_tiers(
                data.tiers
                    .iter()
                    .map(|tier| ConsumptionTier {
                        start_kwh: Energy(tier.min),
                        end_kwh: tier.max.map(Energy),
                        summer_cost: MoneyPerEnergy(tier.summer),
                        non_summer_cost: MoneyPerEnergy(tier.non_summer),
                    })
                    .collect(),
            )
        };

        Ok(TariffPlan::new(profile, rates)
            .with_billing_cycle(data.billing_cycle.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::TaiwanCalendar;
    use crate::fixture::{assert_error, timestamp};
    use crate::rate::RateStructure;
    use rstest::{fixture, rstest};

    #[fixture]
    fn factory() -> TariffFactory {
        TariffFactory::new(Rc::new(TaiwanCalendar::new())).unwrap()
    }

    #[rstest]
    fn test_all_bundled_plans_build(factory: TariffFactory) {
        let ids = factory.plan_ids();
        assert!(ids.contains(&"residential_non_tou"));
        assert!(ids.contains(&"residential_simple_2_tier"));
        for id in ids {
            let plan = factory.create_plan(id).unwrap();
            assert_eq!(plan.name(), id);
            let description = plan.describe();
            assert!(!description.profile.seasons.is_empty());
        }
    }

    #[rstest]
    fn test_unknown_plan_id(factory: TariffFactory) {
        assert_error!(factory.create_plan("no_such_plan"), "Plan not found: no_such_plan");
    }

    #[rstest]
    fn test_schedule_rows_grouped_in_order(factory: TariffFactory) {
        let plan = factory.create_plan("residential_simple_2_tier").unwrap();
        // Non-summer weekday has two peak windows declared as separate rows
        let (_, _, period) = plan.profile().context_at(timestamp(2025, 1, 6, 8, 0));
        assert_eq!(period, RatePeriod::Peak);
        let (_, _, period) = plan.profile().context_at(timestamp(2025, 1, 6, 12, 0));
        assert_eq!(period, RatePeriod::OffPeak);
        let (_, _, period) = plan.profile().context_at(timestamp(2025, 1, 6, 15, 0));
        assert_eq!(period, RatePeriod::Peak);
    }

    #[rstest]
    fn test_tiered_plan_structure(factory: TariffFactory) {
        let plan = factory.create_plan("residential_non_tou").unwrap();
        assert_eq!(plan.rates().structure(), RateStructure::Tiered);
        assert_eq!(plan.rates().tiers().len(), 6);
        // The open-ended tier has no upper bound
        assert!(plan.rates().tiers().last().unwrap().end_kwh.is_none());
    }

    #[rstest]
    fn test_season_strategy_from_definitions(factory: TariffFactory) {
        use crate::season::SeasonStrategy;
        let strategy = factory.store().season_strategy().unwrap();
        let summer_day = timestamp(2025, 6, 1, 0, 0).date();
        let non_summer_day = timestamp(2025, 10, 1, 0, 0).date();
        assert_eq!(strategy.season_of(summer_day), SeasonType::Summer);
        assert_eq!(strategy.season_of(non_summer_day), SeasonType::NonSummer);
    }

    #[test]
    fn test_custom_store_from_json() {
        let store = PlanStore::from_json_str(
            r#"{"plans": [{"id": "flat", "name": "Flat", "rates": [
                {"season": "summer", "period": "off_peak", "cost": 2.0},
                {"season": "non_summer", "period": "off_peak", "cost": 2.0}
            ]}]}"#,
        )
        .unwrap();
        let factory =
            TariffFactory::with_store(Rc::new(TaiwanCalendar::new()), Rc::new(store));
        let plan = factory.create_plan("flat").unwrap();
        assert_eq!(plan.rates().structure(), RateStructure::TimeOfUse);
    }

    #[test]
    fn test_invalid_store_json() {
        assert!(PlanStore::from_json_str("not json").is_err());
    }

    #[rstest]
    #[case("06-01", (6, 1))]
    #[case("12-31", (12, 31))]
    fn test_parse_month_day(#[case] input: &str, #[case] expected: (u32, u32)) {
        assert_eq!(parse_month_day(input).unwrap(), expected);
    }

    #[rstest]
    #[case("0601")]
    #[case("6")]
    #[case("ab-cd")]
    fn test_parse_month_day_invalid(#[case] input: &str) {
        assert!(parse_month_day(input).is_err());
    }
}
