//! Code for producing full bills on top of energy costs.
//!
//! The billing orchestrator composes a plan's energy cost with minimum-usage floors, basic
//! fees, surcharges and adjustments from the plan's billing rules. Demand-based
//! over-contract penalties are not modelled; callers with demand data should settle those
//! separately.
use crate::billing_cycle::{BillingCycleType, BillingPeriod, group_by_billing_period};
use crate::factory::{
    BasicFeeEntry, BasicFeeFormula, FormulaType, PlanData, PlanStore, PowerFactorRule,
    TariffFactory,
};
use crate::season::{SeasonStrategy, SeasonType};
use crate::series::UsageSeries;
use crate::units::{Dimensionless, Energy, Money, Power};
use anyhow::{Result, bail};
use chrono::NaiveDate;
use log::warn;
use std::collections::{HashMap, HashSet};

/// Caller-supplied inputs for bill calculation.
#[derive(Debug, Default, Clone)]
pub struct BillingInputs {
    /// Quantities for labelled basic fees, keyed by fee label
    pub basic_fee_inputs: HashMap<String, f64>,
    /// Average power factor as a percentage, for plans with a power-factor rule
    pub power_factor: Option<f64>,
    /// Single contract capacity, for plans billed on one capacity
    pub contract_capacity_kw: Option<Power>,
    /// Named contract capacities, for formula-based plans
    pub contract_capacities: HashMap<String, Power>,
    /// The meter phase ("single" or "three"), for minimum-usage rules
    pub meter_phase: Option<String>,
    /// The meter voltage in volts, for minimum-usage rules
    pub meter_voltage_v: Option<u32>,
    /// The meter amperage, for minimum-usage rules
    pub meter_ampere: Option<f64>,
    /// Overrides the plan's billing cycle
    pub billing_cycle: Option<BillingCycleType>,
}

impl BillingInputs {
    /// Inputs for residential plans with a meter specification.
    ///
    /// # Arguments
    ///
    /// * `phase` - Meter phase ("single" or "three")
    /// * `voltage` - Voltage level in volts
    /// * `ampere` - Amperage rating
    pub fn for_residential(phase: &str, voltage: u32, ampere: f64) -> Self {
        Self {
            meter_phase: Some(phase.to_string()),
            meter_voltage_v: Some(voltage),
            meter_ampere: Some(ampere),
            basic_fee_inputs: [("basic_fee".to_string(), 1.0)].into_iter().collect(),
            ..Self::default()
        }
    }

    /// Inputs for standard lighting TOU plans with a contract capacity.
    ///
    /// # Arguments
    ///
    /// * `phase` - Meter phase for the per-household fee ("single" or "three")
    /// * `contract_kw` - Contract capacity
    /// * `household_count` - Number of households sharing the meter
    pub fn for_lighting_standard(phase: &str, contract_kw: Power, household_count: f64) -> Self {
        let (label, other) = if phase == "single" {
            ("按戶計收-單相", "按戶計收-三相")
        } else {
            ("按戶計收-三相", "按戶計收-單相")
        };
        Self {
            contract_capacity_kw: Some(contract_kw),
            basic_fee_inputs: [
                (label.to_string(), household_count),
                (other.to_string(), 0.0),
                ("經常契約".to_string(), contract_kw.value()),
            ]
            .into_iter()
            .collect(),
            ..Self::default()
        }
    }

    /// Inputs for high-voltage two-stage TOU plans.
    ///
    /// # Arguments
    ///
    /// * `regular` - Regular contract capacity
    /// * `non_summer` - Non-summer contract capacity
    /// * `saturday_semi_peak` - Saturday semi-peak contract capacity
    /// * `off_peak` - Off-peak contract capacity
    /// * `power_factor` - Optional average power factor percentage
    pub fn for_high_voltage(
        regular: Power,
        non_summer: Power,
        saturday_semi_peak: Power,
        off_peak: Power,
        power_factor: Option<f64>,
    ) -> Self {
        Self {
            contract_capacities: [
                ("regular".to_string(), regular),
                ("non_summer".to_string(), non_summer),
                ("saturday_semi_peak".to_string(), saturday_semi_peak),
                ("off_peak".to_string(), off_peak),
            ]
            .into_iter()
            .collect(),
            power_factor,
            ..Self::default()
        }
    }

    /// Inputs for high-voltage three-stage TOU plans.
    ///
    /// # Arguments
    ///
    /// * `regular` - Regular contract capacity
    /// * `semi_peak` - Semi-peak contract capacity
    /// * `saturday_semi_peak` - Saturday semi-peak contract capacity
    /// * `off_peak` - Off-peak contract capacity
    /// * `power_factor` - Optional average power factor percentage
    pub fn for_high_voltage_three_stage(
        regular: Power,
        semi_peak: Power,
        saturday_semi_peak: Power,
        off_peak: Power,
        power_factor: Option<f64>,
    ) -> Self {
        Self {
            contract_capacities: [
                ("regular".to_string(), regular),
                ("semi_peak".to_string(), semi_peak),
                ("saturday_semi_peak".to_string(), saturday_semi_peak),
                ("off_peak".to_string(), off_peak),
            ]
            .into_iter()
            .collect(),
            power_factor,
            ..Self::default()
        }
    }
}

/// What a plan requires from billing inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequirements {
    /// Whether the plan requires contract capacity input
    pub requires_contract_capacity: bool,
    /// Whether the plan uses meter specifications for minimum-usage rules
    pub requires_meter_spec: bool,
    /// The labels accepted in `basic_fee_inputs`
    pub valid_basic_fee_labels: HashSet<String>,
    /// Whether the plan's basic fee is formula-based
    pub uses_basic_fee_formula: bool,
}

impl PlanRequirements {
    /// Derive the requirements from a plan's rate-table data
    pub fn from_plan_data(data: &PlanData) -> Self {
        let requires_contract_capacity =
            matches!(data.category.as_str(), "high_voltage" | "extra_high_voltage");
        let mut valid_basic_fee_labels: HashSet<String> =
            data.basic_fees.iter().map(|fee| fee.label.clone()).collect();
        if data.basic_fee.is_some() {
            valid_basic_fee_labels.insert("basic_fee".to_string());
        }
        Self {
            requires_contract_capacity,
            requires_meter_spec: data.billing_rules.minimum_usage_rules_ref.is_some(),
            valid_basic_fee_labels,
            uses_basic_fee_formula: data.billing_rules.basic_fee_formula.is_some(),
        }
    }
}

/// One billing period's charges
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BillRow {
    /// The billing period
    pub period: BillingPeriod,
    /// Energy cost from the plan's rate
    pub energy_cost: Money,
    /// Basic fees
    pub basic_cost: Money,
    /// Usage surcharges
    pub surcharge: Money,
    /// Power-factor and other adjustments
    pub adjustment: Money,
    /// The period's total after any minimum-fee floor
    pub total: Money,
}

/// A bill: one row per billing period, in chronological order
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Bill {
    /// The per-period rows
    pub rows: Vec<BillRow>,
}

impl Bill {
    /// The bill's grand total
    pub fn total(&self) -> Money {
        self.rows.iter().map(|row| row.total).sum()
    }

    /// The row for the given period, if present
    pub fn row(&self, period: BillingPeriod) -> Option<&BillRow> {
        self.rows.iter().find(|row| row.period == period)
    }
}

/// Calculate a full bill for the given usage under the given plan.
///
/// Applies the plan's minimum-usage floor (producing a fresh adjusted series; the caller's
/// series is never mutated), computes energy cost through the plan, then layers basic fees,
/// usage surcharges, power-factor adjustments and the minimum monthly fee from the plan's
/// billing rules.
///
/// # Arguments
///
/// * `usage` - The metered usage series
/// * `plan_id` - The plan identifier in the factory's rate tables
/// * `inputs` - Caller-supplied billing inputs
/// * `factory` - The factory providing plan data and a holiday calendar
pub fn calculate_bill(
    usage: &UsageSeries,
    plan_id: &str,
    inputs: &BillingInputs,
    factory: &TariffFactory,
) -> Result<Bill> {
    usage.validate()?;
    let data = factory.store().plan(plan_id)?.clone();
    validate_billing_inputs(&data, inputs)?;

    let cycle = inputs
        .billing_cycle
        .or(data.billing_cycle)
        .unwrap_or_default();
    let plan = factory.create_plan(plan_id)?.with_billing_cycle(cycle);

    // Tiered plans settle by the billing cycle; TOU plans by plain calendar month
    let grouping = if plan.rates().is_tiered() {
        cycle
    } else {
        BillingCycleType::Monthly
    };
    let months_per_period = f64::from(grouping.months_per_period());

    let usage_for_billing =
        apply_minimum_usage(&data, factory.store(), usage, inputs, grouping)?;
    let energy_costs = plan.calculate_costs(&usage_for_billing)?;

    let usage_by_period: HashMap<BillingPeriod, Energy> =
        group_by_billing_period(&usage_for_billing, grouping)
            .into_iter()
            .map(|(period, rows)| {
                let total = rows
                    .iter()
                    .map(|&row| usage_for_billing.values()[row])
                    .sum();
                (period, total)
            })
            .collect();

    let season_strategy = factory.store().season_strategy()?;
    let mut rows = Vec::with_capacity(energy_costs.len());
    for (&period, &energy_cost) in &energy_costs {
        let season = season_of_period(&season_strategy, period);
        let basic_cost =
            basic_fee_for_period(&data, inputs, season) * Dimensionless(months_per_period);

        let period_usage = usage_by_period
            .get(&period)
            .copied()
            .unwrap_or(Energy(0.0));
        let surcharge = match &data.billing_rules.over_2000_kwh_surcharge {
            Some(rule) => {
                let over = (period_usage.value() - rule.threshold_kwh).max(0.0);
                Money(over * rule.cost_per_kwh)
            }
            None => Money(0.0),
        };

        let adjustment = match (&data.billing_rules.power_factor_adjustment, inputs.power_factor)
        {
            (Some(rule), Some(pf)) => {
                power_factor_adjustment(rule, pf, basic_cost, energy_cost, surcharge)
            }
            _ => Money(0.0),
        };

        let mut total = energy_cost + basic_cost + surcharge + adjustment;
        if let Some(min_fee) = data.billing_rules.min_monthly_fee {
            let floor = min_fee * months_per_period;
            if total.value() < floor {
                total = Money(floor);
            }
        }

        rows.push(BillRow {
            period,
            energy_cost,
            basic_cost,
            surcharge,
            adjustment,
            total,
        });
    }

    Ok(Bill { rows })
}

/// Check the inputs against the plan's requirements.
///
/// Missing contract capacity on a plan that bills by capacity is an error; lesser issues
/// are logged as warnings.
fn validate_billing_inputs(data: &PlanData, inputs: &BillingInputs) -> Result<()> {
    let requirements = PlanRequirements::from_plan_data(data);

    if requirements.requires_contract_capacity
        && inputs.contract_capacity_kw.is_none()
        && inputs.contract_capacities.is_empty()
    {
        bail!(
            "Plan '{}' requires contract capacity; provide contract_capacity_kw or \
            contract_capacities",
            data.id
        );
    }

    let unknown: Vec<_> = inputs
        .basic_fee_inputs
        .keys()
        .filter(|key| !requirements.valid_basic_fee_labels.contains(*key))
        .collect();
    if !unknown.is_empty() {
        warn!("Unknown keys in basic_fee_inputs (ignored): {unknown:?}");
    }

    if requirements.requires_meter_spec
        && (inputs.meter_phase.is_none()
            || inputs.meter_voltage_v.is_none()
            || inputs.meter_ampere.is_none())
    {
        warn!(
            "Plan '{}' has minimum usage rules; providing meter specifications is recommended",
            data.id
        );
    }

    Ok(())
}

/// The season of a billing period, taken from the first day of its anchor month
fn season_of_period(strategy: &impl SeasonStrategy, period: BillingPeriod) -> SeasonType {
    let first_day = NaiveDate::from_ymd_opt(period.year, period.month, 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(period.year, 1, 1).unwrap());
    strategy.season_of(first_day)
}

/// One month's basic fee for the given season
fn basic_fee_for_period(data: &PlanData, inputs: &BillingInputs, season: SeasonType) -> Money {
    if let Some(formula) = &data.billing_rules.basic_fee_formula {
        if !inputs.contract_capacities.is_empty() {
            return basic_fee_from_formula(data, inputs, season, formula);
        }
    }

    let mut total = 0.0;
    if let Some(fee) = data.basic_fee {
        let count = inputs
            .basic_fee_inputs
            .get("basic_fee")
            .copied()
            .unwrap_or(1.0);
        total += fee * count;
    }

    for entry in &data.basic_fees {
        let quantity = if entry.unit.as_deref() == Some("per_household_month") {
            inputs
                .basic_fee_inputs
                .get(&entry.label)
                .copied()
                .unwrap_or(1.0)
        } else {
            inputs
                .basic_fee_inputs
                .get(&entry.label)
                .copied()
                .unwrap_or(0.0)
        };
        if quantity == 0.0 {
            continue;
        }
        if let Some(rate) = season_rate(entry, season) {
            total += rate * quantity;
        }
    }
    Money(total)
}

/// One month's formula-based basic fee for the given season
fn basic_fee_from_formula(
    data: &PlanData,
    inputs: &BillingInputs,
    season: SeasonType,
    formula: &BasicFeeFormula,
) -> Money {
    let rates: HashMap<&str, &BasicFeeEntry> = data
        .basic_fees
        .iter()
        .map(|entry| (entry.label.as_str(), entry))
        .collect();
    let rate_for = |label: &str| -> f64 {
        rates
            .get(label)
            .and_then(|entry| season_rate(entry, season))
            .unwrap_or(0.0)
    };
    let capacity = |name: &str| -> f64 {
        inputs
            .contract_capacities
            .get(name)
            .copied()
            .unwrap_or(Power(0.0))
            .value()
    };

    let mut total = 0.0;
    if let Some(label) = &formula.household_label {
        let count = inputs.basic_fee_inputs.get(label).copied().unwrap_or(1.0);
        total += rate_for(label) * count;
    }

    let regular = capacity("regular");
    let saturday = capacity("saturday_semi_peak");
    let off_peak = capacity("off_peak");
    match formula.kind {
        FormulaType::RegularOnly => {
            total += rate_for(&formula.regular_label) * regular;
        }
        FormulaType::TwoStage => {
            let non_summer = capacity("non_summer");
            let weekend_base =
                ((saturday + off_peak) - (regular + non_summer) * formula.weekend_ratio).max(0.0);
            total += rate_for(&formula.regular_label) * regular;
            if season == SeasonType::NonSummer {
                if let Some(label) = &formula.non_summer_label {
                    total += rate_for(label) * non_summer;
                }
            }
            total += rate_for(&formula.saturday_label) * weekend_base;
        }
        FormulaType::ThreeStage => {
            let semi_peak = capacity("semi_peak");
            let weekend_base =
                ((saturday + off_peak) - (regular + semi_peak) * formula.weekend_ratio).max(0.0);
            total += rate_for(&formula.regular_label) * regular;
            if let Some(label) = &formula.semi_peak_label {
                total += rate_for(label) * semi_peak;
            }
            total += rate_for(&formula.saturday_label) * weekend_base;
        }
    }
    Money(total)
}

/// The seasonal rate of a basic-fee entry, if it defines one
fn season_rate(entry: &BasicFeeEntry, season: SeasonType) -> Option<f64> {
    if entry.summer.is_some() || entry.non_summer.is_some() {
        match season {
            SeasonType::Summer => entry.summer,
            SeasonType::NonSummer => entry.non_summer,
        }
    } else {
        entry.cost
    }
}

/// The power-factor adjustment: a penalty below the base percentage, a discount above it
fn power_factor_adjustment(
    rule: &PowerFactorRule,
    power_factor: f64,
    basic: Money,
    energy: Money,
    surcharge: Money,
) -> Money {
    let target = match rule.apply_to.as_str() {
        "total" => basic + energy + surcharge,
        "energy" => energy,
        _ => basic,
    };
    if power_factor < rule.base_percent {
        let delta = rule.base_percent - power_factor;
        target * Dimensionless(delta * rule.step_percent / 100.0)
    } else if power_factor > rule.base_percent {
        let capped = power_factor.min(rule.max_discount_percent);
        let delta = capped - rule.base_percent;
        Money(0.0) - target * Dimensionless(delta * rule.step_percent / 100.0)
    } else {
        Money(0.0)
    }
}

/// Apply the plan's minimum-usage floor, returning a fresh series.
///
/// When a billing period's total falls short of the meter's minimum, the period's readings
/// are scaled up pro rata to meet it (or the first reading set to the minimum if the period
/// is empty of usage). The caller's series is never modified.
fn apply_minimum_usage(
    data: &PlanData,
    store: &PlanStore,
    usage: &UsageSeries,
    inputs: &BillingInputs,
    grouping: BillingCycleType,
) -> Result<UsageSeries> {
    let Some(ref_name) = &data.billing_rules.minimum_usage_rules_ref else {
        return Ok(usage.clone());
    };
    let (Some(phase), Some(voltage), Some(ampere)) = (
        inputs.meter_phase.as_deref(),
        inputs.meter_voltage_v,
        inputs.meter_ampere,
    ) else {
        return Ok(usage.clone());
    };

    let rules = store.minimum_usage_rules(ref_name);
    let Some(rule) = rules
        .iter()
        .find(|rule| rule.phase == phase && rule.voltage_v == voltage)
    else {
        return Ok(usage.clone());
    };

    let kwh_per_ampere = match rule.ampere_threshold {
        Some(threshold) if ampere > threshold => {
            rule.kwh_per_ampere_over.unwrap_or(rule.kwh_per_ampere)
        }
        _ => rule.kwh_per_ampere,
    };
    let min_kwh = ampere * kwh_per_ampere;
    if min_kwh <= 0.0 {
        return Ok(usage.clone());
    }
    let required = min_kwh * f64::from(grouping.months_per_period());

    let mut values = usage.values().to_vec();
    for (_, rows) in group_by_billing_period(usage, grouping) {
        let total: f64 = rows.iter().map(|&row| values[row].value()).sum();
        if total >= required {
            continue;
        }
        if total > 0.0 {
            let factor = required / total;
            for &row in &rows {
                values[row] = values[row] * Dimensionless(factor);
            }
        } else {
            values[rows[0]] = Energy(required);
        }
    }
    UsageSeries::from_parts(usage.timestamps().to_vec(), values)
}
