//! Compare what the same usage costs under each bundled plan.
use anyhow::Result;
use chrono::NaiveDate;
use log::info;
use std::rc::Rc;
use taipower_tariff::calendar::TaiwanCalendar;
use taipower_tariff::factory::TariffFactory;
use taipower_tariff::series::UsageSeries;
use taipower_tariff::units::Money;

fn main() -> Result<()> {
    taipower_tariff::log::init(None)?;

    let factory = TariffFactory::new(Rc::new(TaiwanCalendar::new()))?;

    // Two months of hourly readings with an evening-heavy profile
    let mut pairs = Vec::new();
    let mut day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    while day < NaiveDate::from_ymd_opt(2025, 8, 1).unwrap() {
        for hour in 0..24 {
            let kwh = match hour {
                18..=23 => 2.0,
                8..=17 => 1.0,
                _ => 0.4,
            };
            pairs.push((day.and_hms_opt(hour, 0, 0).unwrap(), kwh));
        }
        day = day.succ_opt().unwrap();
    }
    let usage = UsageSeries::from_pairs(pairs);
    info!("Comparing plans for {:.1} kWh of usage", usage.total().value());

    let mut totals: Vec<(String, Money)> = Vec::new();
    for id in factory.plan_ids() {
        let plan = factory.create_plan(id)?;
        let energy: Money = plan.calculate_costs(&usage)?.values().copied().sum();
        totals.push((id.to_string(), energy));
    }
    totals.sort_by(|a, b| a.1.value().total_cmp(&b.1.value()));

    for (id, energy) in &totals {
        info!("{id}: {:.2} NTD energy cost", energy.value());
    }
    if let Some((best, cost)) = totals.first() {
        info!("Cheapest for this profile: {best} at {:.2} NTD", cost.value());
    }

    Ok(())
}
