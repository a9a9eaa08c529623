//! Code for tariff plans: the profile + rate façade that prices usage.
use crate::billing_cycle::{BillingCycleType, BillingPeriod, group_by_billing_period, month_key};
use crate::day_type::DayType;
use crate::profile::{ProfileDescription, TariffContext, TariffProfile};
use crate::rate::{RateDescription, TariffRate, tiered_cost};
use crate::schedule::RatePeriod;
use crate::season::SeasonType;
use crate::series::UsageSeries;
use crate::units::{Dimensionless, Energy, Money, MoneyPerEnergy};
use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;

/// Costs per billing period, in chronological order
pub type CostSeries = IndexMap<BillingPeriod, Money>;

/// A tariff plan: a profile, a rate and a billing cycle.
///
/// Plans are stateless computation objects; they hold no per-customer state and can be
/// reused across many billing calculations. The only cached state is the profile's period
/// lookup table, which does not affect results.
#[derive(Debug)]
pub struct TariffPlan {
    profile: TariffProfile,
    rates: TariffRate,
    billing_cycle: BillingCycleType,
}

impl TariffPlan {
    /// Create a plan billed monthly
    pub fn new(profile: TariffProfile, rates: TariffRate) -> Self {
        Self {
            profile,
            rates,
            billing_cycle: BillingCycleType::Monthly,
        }
    }

    /// Set the plan's billing cycle.
    ///
    /// The cycle governs billing-period grouping and tier doubling for tiered rates;
    /// time-of-use rates always settle by plain calendar month.
    pub fn with_billing_cycle(mut self, cycle: BillingCycleType) -> Self {
        self.billing_cycle = cycle;
        self
    }

    /// The plan's name (the profile's name)
    pub fn name(&self) -> &str {
        self.profile.name()
    }

    /// The plan's profile
    pub fn profile(&self) -> &TariffProfile {
        &self.profile
    }

    /// The plan's rate
    pub fn rates(&self) -> &TariffRate {
        &self.rates
    }

    /// The plan's billing cycle
    pub fn billing_cycle(&self) -> BillingCycleType {
        self.billing_cycle
    }

    /// A serializable description of the plan
    pub fn describe(&self) -> PlanDescription {
        PlanDescription {
            profile: self.profile.describe(),
            rates: self.rates.describe(),
        }
    }

    /// Energy cost per billing period for the given usage.
    ///
    /// Tiered rates group usage by the plan's billing cycle and walk the (possibly doubled)
    /// tier brackets against each period's total; time-of-use rates price every reading at
    /// its period's unit cost and settle by plain calendar month regardless of the
    /// configured cycle. The usage series is validated first and rejected whole if invalid.
    pub fn calculate_costs(&self, usage: &UsageSeries) -> Result<CostSeries> {
        usage.validate()?;
        if self.rates.is_tiered() {
            self.tiered_costs(usage)
        } else {
            self.tou_costs(usage)
        }
    }

    fn tou_costs(&self, usage: &UsageSeries) -> Result<CostSeries> {
        let context = self.profile.evaluate(usage.timestamps())?;
        let mut costs: CostSeries = IndexMap::new();
        for (row, (ts, kwh)) in usage.iter().enumerate() {
            let unit_cost = self.unit_cost(context.seasons[row], &context.periods[row])?;
            let entry = costs.entry(month_key(ts)).or_insert(Money(0.0));
            *entry = *entry + unit_cost * kwh;
        }
        costs.sort_unstable_keys();
        Ok(costs)
    }

    fn tiered_costs(&self, usage: &UsageSeries) -> Result<CostSeries> {
        let context = self.profile.evaluate(usage.timestamps())?;
        let multiplier = self.billing_cycle.tier_multiplier();

        let mut costs: CostSeries = IndexMap::new();
        for (period, rows) in group_by_billing_period(usage, self.billing_cycle) {
            let total: Energy = rows.iter().map(|&row| usage.values()[row]).sum();
            if total.value() == 0.0 {
                costs.insert(period, Money(0.0));
                continue;
            }
            let season = mode_season(&context, &rows);
            costs.insert(
                period,
                tiered_cost(total, season, self.rates.tiers(), multiplier),
            );
        }
        Ok(costs)
    }

    /// Per-month (season, period) breakdown of usage and cost.
    ///
    /// Time-of-use plans get one row per (month, season, period) combination; tiered plans
    /// get one row per billing period with the period column set to "tiered". With
    /// `include_shares`, usage and cost shares are normalised so each month's shares sum
    /// to 1.
    pub fn monthly_breakdown(
        &self,
        usage: &UsageSeries,
        include_shares: bool,
    ) -> Result<Vec<BreakdownRow>> {
        usage.validate()?;
        if self.rates.is_tiered() {
            return self.tiered_breakdown(usage, include_shares);
        }

        let context = self.profile.evaluate(usage.timestamps())?;
        let mut grouped: IndexMap<(BillingPeriod, SeasonType, RatePeriod), (Energy, Money)> =
            IndexMap::new();
        for (row, (ts, kwh)) in usage.iter().enumerate() {
            let season = context.seasons[row];
            let period = context.periods[row].clone();
            let cost = self.unit_cost(season, &period)? * kwh;
            let entry = grouped
                .entry((month_key(ts), season, period))
                .or_insert((Energy(0.0), Money(0.0)));
            *entry = (entry.0 + kwh, entry.1 + cost);
        }

        let month_totals: IndexMap<BillingPeriod, (Energy, Money)> = grouped.iter().fold(
            IndexMap::new(),
            |mut totals, (&(month, _, _), &(kwh, cost))| {
                let entry = totals.entry(month).or_insert((Energy(0.0), Money(0.0)));
                *entry = (entry.0 + kwh, entry.1 + cost);
                totals
            },
        );

        let rows = grouped
            .into_iter()
            .map(|((month, season, period), (kwh, cost))| {
                let (usage_share, cost_share) = if include_shares {
                    let (month_kwh, month_cost) = month_totals[&month];
                    (Some(kwh / month_kwh), Some(cost / month_cost))
                } else {
                    (None, None)
                };
                BreakdownRow {
                    month,
                    season,
                    period: period.label().to_string(),
                    usage_kwh: kwh,
                    cost,
                    usage_share,
                    cost_share,
                }
            })
            .collect();
        Ok(rows)
    }

    fn tiered_breakdown(
        &self,
        usage: &UsageSeries,
        include_shares: bool,
    ) -> Result<Vec<BreakdownRow>> {
        let context = self.profile.evaluate(usage.timestamps())?;
        let costs = self.tiered_costs(usage)?;

        let rows = group_by_billing_period(usage, self.billing_cycle)
            .into_iter()
            .map(|(period, rows)| {
                let total: Energy = rows.iter().map(|&row| usage.values()[row]).sum();
                BreakdownRow {
                    month: period,
                    season: mode_season(&context, &rows),
                    period: "tiered".to_string(),
                    usage_kwh: total,
                    cost: costs[&period],
                    usage_share: include_shares.then_some(Dimensionless(1.0)),
                    cost_share: include_shares.then_some(Dimensionless(1.0)),
                }
            })
            .collect();
        Ok(rows)
    }

    /// The pricing context at a single instant.
    ///
    /// For time-of-use rates the context includes the unit rate, and the cost when
    /// `usage_kwh` is given. Tiered rates cannot price an instant (the cost of a kWh
    /// depends on the whole billing period's total), so their rate and cost are always
    /// `None` and supplying `usage_kwh` is an error.
    pub fn pricing_at(
        &self,
        at: NaiveDateTime,
        usage_kwh: Option<Energy>,
    ) -> Result<PricingContext> {
        if usage_kwh.is_some() && self.rates.is_tiered() {
            bail!(
                "Usage-based pricing is not supported for tiered plans; \
                use calculate_costs for billing period totals"
            );
        }

        let (season, day_type, period) = self.profile.context_at(at);
        let (rate, cost) = if self.rates.is_tiered() {
            (None, None)
        } else {
            let unit_cost = self.unit_cost(season, &period)?;
            (Some(unit_cost), usage_kwh.map(|kwh| unit_cost * kwh))
        };

        Ok(PricingContext {
            at,
            season,
            day_type,
            period,
            rate,
            cost,
        })
    }

    /// The pricing context for each timestamp in a batch, aligned with the input.
    ///
    /// `usage_kwh`, when given, must have one value per timestamp; it is rejected for
    /// tiered plans just as in [`TariffPlan::pricing_at`].
    pub fn pricing_table(
        &self,
        timestamps: &[NaiveDateTime],
        usage_kwh: Option<&[Energy]>,
    ) -> Result<Vec<PricingContext>> {
        if usage_kwh.is_some() && self.rates.is_tiered() {
            bail!(
                "Usage-based pricing is not supported for tiered plans; \
                use calculate_costs for billing period totals"
            );
        }
        if let Some(values) = usage_kwh {
            if values.len() != timestamps.len() {
                bail!("Usage values must have one entry per timestamp");
            }
        }

        let context = self.profile.evaluate(timestamps)?;
        let mut rows = Vec::with_capacity(timestamps.len());
        for (row, &at) in timestamps.iter().enumerate() {
            let season = context.seasons[row];
            let period = context.periods[row].clone();
            let (rate, cost) = if self.rates.is_tiered() {
                (None, None)
            } else {
                let unit_cost = self.unit_cost(season, &period)?;
                let cost = usage_kwh.map(|values| unit_cost * values[row]);
                (Some(unit_cost), cost)
            };
            rows.push(PricingContext {
                at,
                season,
                day_type: context.day_types[row].clone(),
                period,
                rate,
                cost,
            });
        }
        Ok(rows)
    }

    /// The unit cost for a (season, period), honouring the rate's strict flag
    fn unit_cost(&self, season: SeasonType, period: &RatePeriod) -> Result<MoneyPerEnergy> {
        match self.rates.lookup_cost(season, period) {
            Some(cost) => Ok(cost),
            None if self.rates.strict() => {
                bail!("No rate configured for season {season}, period {period}")
            }
            None => {
                log::debug!(
                    "No rate configured for season {season}, period {period}; pricing at zero"
                );
                Ok(MoneyPerEnergy(0.0))
            }
        }
    }
}

/// The season appearing on the most timestamps among the given rows.
///
/// Ties go to the season encountered first. This is a count over timestamps, not a
/// usage-weighted blend, so a billing period straddling a season boundary takes whichever
/// season covers more readings.
fn mode_season(context: &TariffContext, rows: &[usize]) -> SeasonType {
    let mut counts: IndexMap<SeasonType, usize> = IndexMap::new();
    for &row in rows {
        *counts.entry(context.seasons[row]).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .map(|(season, _)| season)
        .unwrap_or(SeasonType::NonSummer)
}

/// The pricing context of a single timestamp
#[derive(Clone, PartialEq, Debug)]
pub struct PricingContext {
    /// The instant the context applies to
    pub at: NaiveDateTime,
    /// The season at that instant
    pub season: SeasonType,
    /// The day type at that instant
    pub day_type: DayType,
    /// The rate period at that instant
    pub period: RatePeriod,
    /// The unit rate, absent for tiered plans
    pub rate: Option<MoneyPerEnergy>,
    /// The cost of the supplied usage, when given and priceable
    pub cost: Option<Money>,
}

/// One row of a monthly breakdown
#[derive(Clone, PartialEq, Debug)]
pub struct BreakdownRow {
    /// The billing period (the calendar month for time-of-use plans)
    pub month: BillingPeriod,
    /// The season the row's usage fell in
    pub season: SeasonType,
    /// The rate-period label, or "tiered" for tiered plans
    pub period: String,
    /// Usage attributed to the row
    pub usage_kwh: Energy,
    /// Cost attributed to the row
    pub cost: Money,
    /// The row's share of its month's usage, when shares were requested
    pub usage_share: Option<Dimensionless>,
    /// The row's share of its month's cost, when shares were requested
    pub cost_share: Option<Dimensionless>,
}

/// A serializable description of a plan
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct PlanDescription {
    /// The profile description
    pub profile: ProfileDescription,
    /// The rate description
    pub rates: RateDescription,
}
