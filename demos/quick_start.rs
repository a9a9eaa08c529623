//! A short tour: build a plan, price a usage series, print the bill.
use anyhow::Result;
use chrono::NaiveDate;
use log::info;
use std::rc::Rc;
use taipower_tariff::billing::{BillingInputs, calculate_bill};
use taipower_tariff::calendar::TaiwanCalendar;
use taipower_tariff::factory::TariffFactory;
use taipower_tariff::series::UsageSeries;

fn main() -> Result<()> {
    taipower_tariff::log::init(None)?;

    let factory = TariffFactory::new(Rc::new(TaiwanCalendar::new()))?;
    info!("Available plans: {}", factory.plan_ids().join(", "));

    // A week of hourly readings: 0.8 kWh overnight, 1.5 kWh during the day
    let mut pairs = Vec::new();
    let mut day = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
    for _ in 0..7 {
        for hour in 0..24 {
            let kwh = if (8..22).contains(&hour) { 1.5 } else { 0.8 };
            pairs.push((day.and_hms_opt(hour, 0, 0).unwrap(), kwh));
        }
        day = day.succ_opt().unwrap();
    }
    let usage = UsageSeries::from_pairs(pairs);
    info!("Total usage: {:.1} kWh", usage.total().value());

    let plan = factory.create_plan("residential_simple_2_tier")?;
    for (month, cost) in &plan.calculate_costs(&usage)? {
        info!("{month}: energy cost {:.2} NTD", cost.value());
    }

    let inputs = BillingInputs::for_residential("single", 110, 20.0);
    let bill = calculate_bill(&usage, "residential_simple_2_tier", &inputs, &factory)?;
    for row in &bill.rows {
        info!(
            "{}: energy {:.2} + basic {:.2} + surcharge {:.2} + adjustment {:.2} = {:.2} NTD",
            row.period,
            row.energy_cost.value(),
            row.basic_cost.value(),
            row.surcharge.value(),
            row.adjustment.value(),
            row.total.value()
        );
    }

    Ok(())
}
