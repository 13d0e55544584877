// Analytics service - Use cases for consumption trends and composed insights
use chrono::{TimeDelta, Timelike};
use futures::try_join;
use serde::Serialize;

use crate::application::capacity_service::CapacityTariffCalculator;
use crate::application::cost_service::CostEngine;
use crate::application::meter_service::MeterAggregator;
use crate::application::self_consumption::SelfConsumptionCalculator;
use crate::domain::query::{RangeBound, Reducer, TimeRange, WindowAggregate};
use crate::domain::sample::NetSample;
use crate::domain::tariff::CostBreakdown;
use crate::error::{AppError, Result};

const PEAK_HOUR_COUNT: usize = 5;

/// Net consumption of the running period against the one before it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub current: f64,
    pub previous: f64,
    pub change: f64,
    pub percentage_change: f64,
    pub trend: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakHour {
    pub hour: u32,
    pub average: f64,
}

/// Average net consumption per hour of day, with the heaviest hours called out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakTimeProfile {
    pub hourly_averages: Vec<f64>,
    pub peak_hours: Vec<PeakHour>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FluviusInsight {
    pub average_peak: f64,
    pub monthly_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfConsumptionInsight {
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostsInsight {
    pub monthly: f64,
    pub breakdown: CostBreakdown,
}

/// Capacity, self-consumption and monthly costs in one payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub fluvius_tariff: FluviusInsight,
    pub self_consumption: SelfConsumptionInsight,
    pub costs: CostsInsight,
}

#[derive(Clone)]
pub struct AnalyticsService {
    meters: MeterAggregator,
    capacity: CapacityTariffCalculator,
    self_consumption: SelfConsumptionCalculator,
    costs: CostEngine,
}

impl AnalyticsService {
    pub fn new(
        meters: MeterAggregator,
        capacity: CapacityTariffCalculator,
        self_consumption: SelfConsumptionCalculator,
        costs: CostEngine,
    ) -> Self {
        Self {
            meters,
            capacity,
            self_consumption,
            costs,
        }
    }

    /// Net consumption totals of a period against the period before it.
    pub async fn comparison(&self, period: &str) -> Result<PeriodComparison> {
        let (current_range, previous_range) = comparison_ranges(period)?;
        let window = WindowAggregate::new(TimeDelta::hours(1), Reducer::Mean);
        let (current, previous) = try_join!(
            self.meters.net_consumption(&current_range, Some(window)),
            self.meters.net_consumption(&previous_range, Some(window)),
        )?;
        Ok(compare_totals(
            absolute_total(&current),
            absolute_total(&previous),
        ))
    }

    /// Hour-of-day consumption profile over the trailing `days` days (UTC).
    pub async fn peak_times(&self, days: u32) -> Result<PeakTimeProfile> {
        let range = TimeRange::last(TimeDelta::days(i64::from(days)));
        let window = WindowAggregate::new(TimeDelta::hours(1), Reducer::Mean);
        let samples = self.meters.net_consumption(&range, Some(window)).await?;
        let hourly_averages = hourly_profile(&samples);
        let peak_hours = top_hours(&hourly_averages, PEAK_HOUR_COUNT);
        Ok(PeakTimeProfile {
            hourly_averages,
            peak_hours,
        })
    }

    /// The month-at-a-glance metrics, fetched concurrently.
    pub async fn insights(&self) -> Result<Insights> {
        let month = TimeRange::last(TimeDelta::days(30));
        let (capacity, ratio, breakdown) = try_join!(
            self.capacity.calculate(12),
            self.self_consumption.ratio(&month),
            self.costs.costs_for_period("month"),
        )?;
        Ok(Insights {
            fluvius_tariff: FluviusInsight {
                average_peak: capacity.average_peak,
                monthly_cost: capacity.monthly_cost,
            },
            self_consumption: SelfConsumptionInsight { ratio },
            costs: CostsInsight {
                monthly: breakdown.net_cost,
                breakdown,
            },
        })
    }
}

/// Current and previous trailing ranges for a period name.
fn comparison_ranges(period: &str) -> Result<(TimeRange, TimeRange)> {
    let days = match period {
        "day" => 1,
        "week" => 7,
        "month" => 30,
        "year" => 365,
        _ => {
            return Err(AppError::Validation(format!(
                "unknown period {period:?}, expected day, week, month or year"
            )))
        }
    };
    let current = TimeRange::last(TimeDelta::days(days));
    let previous = TimeRange::new(
        RangeBound::Relative(TimeDelta::days(-2 * days)),
        RangeBound::Relative(TimeDelta::days(-days)),
    );
    Ok((current, previous))
}

fn absolute_total(samples: &[NetSample]) -> f64 {
    samples.iter().map(|s| s.watts.abs()).sum()
}

fn compare_totals(current: f64, previous: f64) -> PeriodComparison {
    let change = current - previous;
    let percentage_change = if previous == 0.0 {
        0.0
    } else {
        change / previous * 100.0
    };
    let trend = if change > 0.0 {
        "up"
    } else if change < 0.0 {
        "down"
    } else {
        "flat"
    };
    PeriodComparison {
        current,
        previous,
        change,
        percentage_change,
        trend,
    }
}

fn hourly_profile(samples: &[NetSample]) -> Vec<f64> {
    let mut sums = vec![0.0; 24];
    let mut counts = vec![0u32; 24];
    for sample in samples {
        let hour = sample.time.hour() as usize;
        sums[hour] += sample.watts.abs();
        counts[hour] += 1;
    }
    sums.iter()
        .zip(&counts)
        .map(|(sum, &count)| if count > 0 { sum / f64::from(count) } else { 0.0 })
        .collect()
}

fn top_hours(hourly_averages: &[f64], count: usize) -> Vec<PeakHour> {
    let mut hours: Vec<PeakHour> = hourly_averages
        .iter()
        .enumerate()
        .map(|(hour, &average)| PeakHour {
            hour: hour as u32,
            average,
        })
        .collect();
    hours.sort_by(|a, b| b.average.total_cmp(&a.average));
    hours.truncate(count);
    hours
}
