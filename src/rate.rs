//! Code for tariff rates: per-period unit costs and consumption tiers.
use crate::schedule::RatePeriod;
use crate::season::SeasonType;
use crate::units::{Energy, Money, MoneyPerEnergy};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

/// A cumulative consumption bracket with season-specific unit costs.
///
/// Tiers apply to a billing period's total usage, not to individual readings. An `end_kwh`
/// of `None` means the tier has no upper limit.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ConsumptionTier {
    /// Lower bound of the bracket (exclusive, except for the first tier)
    pub start_kwh: Energy,
    /// Inclusive upper bound of the bracket, or `None` for no limit
    pub end_kwh: Option<Energy>,
    /// Unit cost in the summer season
    pub summer_cost: MoneyPerEnergy,
    /// Unit cost outside the summer season
    pub non_summer_cost: MoneyPerEnergy,
}

impl ConsumptionTier {
    /// The unit cost for the given season
    pub fn cost_for(&self, season: SeasonType) -> MoneyPerEnergy {
        match season {
            SeasonType::Summer => self.summer_cost,
            SeasonType::NonSummer => self.non_summer_cost,
        }
    }
}

/// How a rate prices energy
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RateStructure {
    /// Per-period unit costs only
    TimeOfUse,
    /// Consumption tiers only
    Tiered,
    /// Both period costs and tiers are present
    Mixed,
    /// Neither is present
    Unknown,
}

impl RateStructure {
    /// The stable string label for this structure
    pub fn label(&self) -> &'static str {
        match self {
            RateStructure::TimeOfUse => "tou",
            RateStructure::Tiered => "tiered",
            RateStructure::Mixed => "mixed",
            RateStructure::Unknown => "unknown",
        }
    }
}

/// The monetary side of a tariff plan.
///
/// Either a (season, period) → unit-cost table for time-of-use plans or a list of
/// consumption tiers for tiered plans. Period labels are canonicalised when parsed (see
/// [`RatePeriod`]), so lookups need no further normalisation.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct TariffRate {
    period_costs: IndexMap<(SeasonType, RatePeriod), MoneyPerEnergy>,
    tiers: Vec<ConsumptionTier>,
    strict: bool,
}

impl TariffRate {
    /// Create a time-of-use rate from (season, period) unit costs
    pub fn from_period_costs<I>(costs: I) -> Self
    where
        I: IntoIterator<Item = ((SeasonType, RatePeriod), MoneyPerEnergy)>,
    {
        Self {
            period_costs: costs.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Create a tiered rate from consumption tiers
    pub fn from_tiers(tiers: Vec<ConsumptionTier>) -> Self {
        Self {
            tiers,
            ..Self::default()
        }
    }

    /// Turn missing (season, period) lookups into errors instead of a zero unit cost.
    ///
    /// By default a missing combination prices at zero, which lets plans define partial rate
    /// tables for the periods they actually use but makes a misconfigured table
    /// indistinguishable from a free period.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Whether missing lookups are treated as errors
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Whether this rate prices by consumption tiers
    pub fn is_tiered(&self) -> bool {
        !self.tiers.is_empty()
    }

    /// The consumption tiers, if any
    pub fn tiers(&self) -> &[ConsumptionTier] {
        &self.tiers
    }

    /// How this rate prices energy
    pub fn structure(&self) -> RateStructure {
        match (!self.period_costs.is_empty(), !self.tiers.is_empty()) {
            (true, true) => RateStructure::Mixed,
            (false, true) => RateStructure::Tiered,
            (true, false) => RateStructure::TimeOfUse,
            (false, false) => RateStructure::Unknown,
        }
    }

    /// The unit cost for the given (season, period), if configured
    pub fn lookup_cost(&self, season: SeasonType, period: &RatePeriod) -> Option<MoneyPerEnergy> {
        self.period_costs.get(&(season, period.clone())).copied()
    }

    /// The unit cost for the given (season, period), or zero if the combination is absent
    pub fn get_cost(&self, season: SeasonType, period: &RatePeriod) -> MoneyPerEnergy {
        self.lookup_cost(season, period)
            .unwrap_or(MoneyPerEnergy(0.0))
    }

    /// A serializable description of the rate
    pub fn describe(&self) -> RateDescription {
        RateDescription {
            rate_structure: self.structure().label().to_string(),
            period_costs: self
                .period_costs
                .iter()
                .sorted_by(|a, b| {
                    (a.0.0.label(), a.0.1.label()).cmp(&(b.0.0.label(), b.0.1.label()))
                })
                .map(|((season, period), cost)| PeriodCostDescription {
                    season: season.label().to_string(),
                    period: period.label().to_string(),
                    cost: cost.value(),
                })
                .collect(),
            tiered_rates: self
                .tiers
                .iter()
                .map(|tier| TierDescription {
                    start_kwh: tier.start_kwh.value(),
                    end_kwh: tier.end_kwh.map(Energy::value),
                    summer_cost: tier.summer_cost.value(),
                    non_summer_cost: tier.non_summer_cost.value(),
                })
                .collect(),
        }
    }
}

/// Total cost for a billing period's usage under a progressive tier schedule.
///
/// Walks the tiers in ascending order, consuming usage from each bracket at that bracket's
/// season-specific unit cost. Usage landing exactly on a boundary is consumed as the end of
/// the lower bracket. `tier_multiplier` scales every finite bracket boundary; bimonthly
/// billing passes 2 because Taipower doubles the tier limits rather than halving usage,
/// which keeps the brackets progressive even when usage is lumpy across the two months.
///
/// # Arguments
///
/// * `total_kwh` - Total usage for the billing period
/// * `season` - The season whose rate column applies
/// * `tiers` - The tier schedule
/// * `tier_multiplier` - Factor applied to every finite tier boundary
pub fn tiered_cost(
    total_kwh: Energy,
    season: SeasonType,
    tiers: &[ConsumptionTier],
    tier_multiplier: f64,
) -> Money {
    if total_kwh.value() <= 0.0 {
        return Money(0.0);
    }

    let sorted_tiers = tiers
        .iter()
        .sorted_by(|a, b| a.start_kwh.value().total_cmp(&b.start_kwh.value()));

    let mut total_cost = 0.0;
    let mut remaining_kwh = total_kwh.value();
    let mut last_limit_kwh = 0.0;
    for tier in sorted_tiers {
        if remaining_kwh <= 0.0 {
            break;
        }

        let tier_limit_kwh = match tier.end_kwh {
            Some(end) => (end.value() * tier_multiplier - last_limit_kwh).max(0.0),
            None => f64::INFINITY,
        };
        let usage_in_tier_kwh = remaining_kwh.min(tier_limit_kwh);

        total_cost += usage_in_tier_kwh * tier.cost_for(season).value();
        remaining_kwh -= usage_in_tier_kwh;
        if let Some(end) = tier.end_kwh {
            last_limit_kwh = end.value() * tier_multiplier;
        }
    }

    Money(total_cost)
}

/// A serializable description of one (season, period) unit cost
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct PeriodCostDescription {
    /// The season label
    pub season: String,
    /// The period label
    pub period: String,
    /// The unit cost
    pub cost: f64,
}

/// A serializable description of one consumption tier
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct TierDescription {
    /// Lower bound of the bracket
    pub start_kwh: f64,
    /// Upper bound of the bracket, absent for the open-ended tier
    pub end_kwh: Option<f64>,
    /// Summer unit cost
    pub summer_cost: f64,
    /// Non-summer unit cost
    pub non_summer_cost: f64,
}

/// A serializable description of a tariff rate
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct RateDescription {
    /// How the rate prices energy
    pub rate_structure: String,
    /// All (season, period) unit costs
    pub period_costs: Vec<PeriodCostDescription>,
    /// All consumption tiers
    pub tiered_rates: Vec<TierDescription>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn two_tiers() -> Vec<ConsumptionTier> {
        vec![
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
        ]
    }

    #[rstest]
    fn test_tier_walk_exactness(two_tiers: Vec<ConsumptionTier>) {
        // 120 x 1.78 + 180 x 2.26
        let cost = tiered_cost(Energy(300.0), SeasonType::NonSummer, &two_tiers, 1.0);
        assert_approx_eq!(f64, cost.value(), 620.4);
    }

    #[rstest]
    fn test_tier_boundary_belongs_to_lower_tier(two_tiers: Vec<ConsumptionTier>) {
        // Exactly at the boundary: all consumed from the first bracket
        let cost = tiered_cost(Energy(120.0), SeasonType::NonSummer, &two_tiers, 1.0);
        assert_approx_eq!(f64, cost.value(), 120.0 * 1.78);
        // One kWh past the boundary spills into the second bracket
        let cost = tiered_cost(Energy(121.0), SeasonType::NonSummer, &two_tiers, 1.0);
        assert_approx_eq!(f64, cost.value(), 120.0 * 1.78 + 2.26);
    }

    #[rstest]
    fn test_tier_doubling(two_tiers: Vec<ConsumptionTier>) {
        // With doubled boundaries the first bracket runs to 240 kWh
        let cost = tiered_cost(Energy(250.0), SeasonType::NonSummer, &two_tiers, 2.0);
        assert_approx_eq!(f64, cost.value(), 240.0 * 1.78 + 10.0 * 2.26);
        assert_approx_eq!(f64, cost.value(), 449.8);
        // 200 kWh fits entirely in the doubled first bracket
        let cost = tiered_cost(Energy(200.0), SeasonType::NonSummer, &two_tiers, 2.0);
        assert_approx_eq!(f64, cost.value(), 356.0);
    }

    #[rstest]
    fn test_tier_season_column(two_tiers: Vec<ConsumptionTier>) {
        let cost = tiered_cost(Energy(100.0), SeasonType::Summer, &two_tiers, 1.0);
        assert_approx_eq!(f64, cost.value(), 100.0 * 1.96);
    }

    #[rstest]
    fn test_zero_usage_skips_tier_walk(two_tiers: Vec<ConsumptionTier>) {
        assert_eq!(
            tiered_cost(Energy(0.0), SeasonType::Summer, &two_tiers, 1.0),
            Money(0.0)
        );
    }

    #[rstest]
    fn test_tiers_sorted_before_walking(mut two_tiers: Vec<ConsumptionTier>) {
        two_tiers.reverse();
        let cost = tiered_cost(Energy(300.0), SeasonType::NonSummer, &two_tiers, 1.0);
        assert_approx_eq!(f64, cost.value(), 620.4);
    }

    #[test]
    fn test_lookup_cost_and_zero_fallback() {
        let rate = TariffRate::from_period_costs([
            (
                (SeasonType::Summer, RatePeriod::Peak),
                MoneyPerEnergy(5.01),
            ),
            (
                (SeasonType::Summer, RatePeriod::OffPeak),
                MoneyPerEnergy(1.96),
            ),
        ]);
        assert_eq!(
            rate.lookup_cost(SeasonType::Summer, &RatePeriod::Peak),
            Some(MoneyPerEnergy(5.01))
        );
        // Labels parsed from strings hit the same entries as built-in variants
        assert_eq!(
            rate.lookup_cost(SeasonType::Summer, &"peak".into()),
            Some(MoneyPerEnergy(5.01))
        );
        // Missing combinations price at zero unless strict
        assert_eq!(rate.lookup_cost(SeasonType::NonSummer, &RatePeriod::Peak), None);
        assert_eq!(
            rate.get_cost(SeasonType::NonSummer, &RatePeriod::Peak),
            MoneyPerEnergy(0.0)
        );
    }

    #[test]
    fn test_structure() {
        assert_eq!(TariffRate::default().structure(), RateStructure::Unknown);
        let tou = TariffRate::from_period_costs([(
            (SeasonType::Summer, RatePeriod::Peak),
            MoneyPerEnergy(5.01),
        )]);
        assert_eq!(tou.structure(), RateStructure::TimeOfUse);
        let tiered = TariffRate::from_tiers(vec![ConsumptionTier {
            start_kwh: Energy(0.0),
            end_kwh: None,
            summer_cost: MoneyPerEnergy(1.0),
            non_summer_cost: MoneyPerEnergy(1.0),
        }]);
        assert_eq!(tiered.structure(), RateStructure::Tiered);
    }
}
