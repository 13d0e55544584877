// Capacity tariff service - Use case for the Fluvius capacity charge
//
// Flanders bills capacity on the average of the monthly peaks, where a peak
// is the highest 15-minute mean grid import within a calendar month.
use std::collections::BTreeMap;

use chrono::{Datelike, Months, TimeDelta, Utc};

use crate::application::meter_service::MeterAggregator;
use crate::domain::query::{RangeBound, Reducer, TimeRange, WindowAggregate};
use crate::domain::sample::SamplePoint;
use crate::domain::tariff::{CapacityTariff, TariffParameters};
use crate::error::{AppError, Result};

const PEAK_WINDOW_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct CapacityTariffCalculator {
    meters: MeterAggregator,
    tariff: TariffParameters,
}

impl CapacityTariffCalculator {
    pub fn new(meters: MeterAggregator, tariff: TariffParameters) -> Self {
        Self { meters, tariff }
    }

    /// Capacity tariff over the trailing `lookback_months` calendar months.
    pub async fn calculate(&self, lookback_months: u32) -> Result<CapacityTariff> {
        let start = Utc::now()
            .checked_sub_months(Months::new(lookback_months))
            .ok_or_else(|| {
                AppError::Validation(format!("lookback of {lookback_months} months is out of range"))
            })?;
        let range = TimeRange::new(RangeBound::Absolute(start), RangeBound::Now);
        let window = WindowAggregate::new(TimeDelta::minutes(PEAK_WINDOW_MINUTES), Reducer::Mean);
        let samples = self.meters.grid_import(&range, Some(window)).await?;
        Ok(CapacityTariff::from_monthly_peaks(
            monthly_peaks(&samples),
            self.tariff.capacity_rate_eur_per_kw_year,
        ))
    }
}

/// Highest sample per calendar month, in chronological order.
fn monthly_peaks(samples: &[SamplePoint]) -> Vec<f64> {
    let mut peaks: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for sample in samples {
        let key = (sample.time.year(), sample.time.month());
        let peak = peaks.entry(key).or_insert(sample.value);
        if sample.value > *peak {
            *peak = sample.value;
        }
    }
    peaks.into_values().collect()
}
