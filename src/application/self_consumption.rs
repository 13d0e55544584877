// Self-consumption service - Use case for the share of production used on site
use chrono::TimeDelta;
use futures::try_join;

use crate::application::meter_service::MeterAggregator;
use crate::domain::query::{Reducer, TimeRange, WindowAggregate};
use crate::error::Result;

#[derive(Clone)]
pub struct SelfConsumptionCalculator {
    meters: MeterAggregator,
}

impl SelfConsumptionCalculator {
    pub fn new(meters: MeterAggregator) -> Self {
        Self { meters }
    }

    /// Percentage of production consumed on site over the range, in [0, 100].
    pub async fn ratio(&self, range: &TimeRange) -> Result<f64> {
        let window = WindowAggregate::new(TimeDelta::hours(1), Reducer::Mean);
        let (production, consumption) = try_join!(
            self.meters.production(range, Some(window)),
            self.meters.net_consumption(range, Some(window)),
        )?;
        let total_production: f64 = production.iter().map(|p| p.value).sum();
        let total_consumption: f64 = consumption.iter().map(|s| s.watts).sum();
        Ok(ratio_from_totals(total_production, total_consumption))
    }
}

/// `min(production, consumption) / production`, as a percentage.
pub fn ratio_from_totals(total_production: f64, total_consumption: f64) -> f64 {
    if total_production <= 0.0 {
        return 0.0;
    }
    let self_consumed = total_production.min(total_consumption).max(0.0);
    (self_consumed / total_production) * 100.0
}
