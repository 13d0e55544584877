// Dashboard service - Use case for composing the home energy dashboard
use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use futures::try_join;
use serde::Serialize;

use crate::application::capacity_service::CapacityTariffCalculator;
use crate::application::charging_service::ChargingService;
use crate::application::cost_service::CostEngine;
use crate::application::meter_service::MeterAggregator;
use crate::application::price_service::{CurrentPrice, PriceService};
use crate::application::self_consumption::SelfConsumptionCalculator;
use crate::domain::charging::ChargingState;
use crate::domain::query::{Reducer, TimeRange, WindowAggregate};
use crate::domain::sample::{NetSample, SamplePoint};
use crate::domain::tariff::CostBreakdown;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentBlock {
    /// Net consumption right now, in watts.
    pub consumption: f64,
    pub production: f64,
    pub grid_import: f64,
    pub grid_export: f64,
    pub price: CurrentPrice,
    pub timestamp: DateTime<Utc>,
}

/// Today's energy flows in kWh, derived from hourly means.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayBlock {
    pub consumption: f64,
    pub production: f64,
    pub self_consumption: f64,
    pub grid_import: f64,
    pub grid_export: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBlock {
    pub costs: CostBreakdown,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FluviusBlock {
    /// Average monthly peak in kW.
    pub average_peak: f64,
    pub monthly_cost: f64,
    pub yearly_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub current: CurrentBlock,
    pub today: TodayBlock,
    pub month: MonthBlock,
    pub fluvius: FluviusBlock,
    pub charging: ChargingState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub period: String,
    /// Net consumption over the period, in kWh.
    pub consumption: f64,
    pub production: f64,
    pub self_consumption_ratio: f64,
    pub costs: CostBreakdown,
    /// Production minus consumption, in kWh.
    pub net_balance: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    /// Net consumption in kW.
    pub consumption: f64,
    /// Production in kW.
    pub production: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakChart {
    /// Monthly peaks in kW.
    pub monthly_peaks: Vec<f64>,
    pub average_peak: f64,
}

/// Payload of `chart/{type}`; the shape depends on the chart type.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChartData {
    Series(Vec<ChartPoint>),
    Costs(CostBreakdown),
    Peaks(PeakChart),
}

#[derive(Clone)]
pub struct DashboardService {
    meters: MeterAggregator,
    prices: PriceService,
    costs: CostEngine,
    capacity: CapacityTariffCalculator,
    self_consumption: SelfConsumptionCalculator,
    charging: ChargingService,
}

impl DashboardService {
    pub fn new(
        meters: MeterAggregator,
        prices: PriceService,
        costs: CostEngine,
        capacity: CapacityTariffCalculator,
        self_consumption: SelfConsumptionCalculator,
        charging: ChargingService,
    ) -> Self {
        Self {
            meters,
            prices,
            costs,
            capacity,
            self_consumption,
            charging,
        }
    }

    /// Everything the dashboard landing page needs, fetched concurrently.
    /// One failing upstream fetch fails the whole overview.
    pub async fn overview(&self) -> Result<DashboardOverview> {
        let day = TimeRange::last(TimeDelta::hours(24));
        let hourly = WindowAggregate::new(TimeDelta::hours(1), Reducer::Mean);
        let (current, price, capacity, charging, consumption, production, month_costs) = try_join!(
            self.meters.current(),
            self.prices.current_price(),
            self.capacity.calculate(12),
            self.charging.status(),
            self.meters.net_consumption(&day, Some(hourly)),
            self.meters.production(&day, Some(hourly)),
            self.costs.costs_for_period("month"),
        )?;

        // Hourly mean watts summed over a day approximate watt-hours.
        let today_consumption = consumption.iter().map(|s| s.watts).sum::<f64>() / 1000.0;
        let today_production = production.iter().map(|p| p.value).sum::<f64>() / 1000.0;

        Ok(DashboardOverview {
            current: CurrentBlock {
                consumption: current.net_consumption,
                production: current.production,
                grid_import: current.grid_import,
                grid_export: (current.production - current.grid_import).max(0.0),
                price,
                timestamp: Utc::now(),
            },
            today: TodayBlock {
                consumption: today_consumption,
                production: today_production,
                self_consumption: today_consumption.min(today_production),
                grid_import: (today_consumption - today_production).max(0.0),
                grid_export: (today_production - today_consumption).max(0.0),
            },
            month: MonthBlock { costs: month_costs },
            fluvius: FluviusBlock {
                average_peak: capacity.average_peak / 1000.0,
                monthly_cost: capacity.monthly_cost,
                yearly_cost: capacity.yearly_cost,
            },
            charging,
        })
    }

    /// Consumption, production, costs and self-consumption for one period.
    pub async fn summary(&self, period: &str) -> Result<PeriodSummary> {
        let range = CostEngine::period_range(period)?;
        let hourly = WindowAggregate::new(TimeDelta::hours(1), Reducer::Mean);
        let (consumption, production, costs, ratio) = try_join!(
            self.meters.net_consumption(&range, Some(hourly)),
            self.meters.production(&range, Some(hourly)),
            self.costs.costs(&range),
            self.self_consumption.ratio(&range),
        )?;
        let total_consumption = consumption.iter().map(|s| s.watts).sum::<f64>() / 1000.0;
        let total_production = production.iter().map(|p| p.value).sum::<f64>() / 1000.0;
        Ok(PeriodSummary {
            period: period.to_string(),
            consumption: total_consumption,
            production: total_production,
            self_consumption_ratio: ratio,
            costs,
            net_balance: total_production - total_consumption,
        })
    }

    /// Data behind one dashboard chart.
    pub async fn chart(
        &self,
        chart_type: &str,
        range: &TimeRange,
        window: WindowAggregate,
    ) -> Result<ChartData> {
        match chart_type {
            "consumption-production" => {
                let (consumption, production) = try_join!(
                    self.meters.net_consumption(range, Some(window)),
                    self.meters.production(range, Some(window)),
                )?;
                Ok(ChartData::Series(merge_chart(&consumption, &production)))
            }
            "costs" => Ok(ChartData::Costs(self.costs.costs(range).await?)),
            "fluvius-peaks" => {
                let capacity = self.capacity.calculate(12).await?;
                Ok(ChartData::Peaks(PeakChart {
                    monthly_peaks: capacity
                        .monthly_peaks
                        .iter()
                        .map(|peak| peak / 1000.0)
                        .collect(),
                    average_peak: capacity.average_peak / 1000.0,
                }))
            }
            _ => Err(AppError::Validation(format!(
                "unknown chart type {chart_type:?}"
            ))),
        }
    }
}

/// Union of both series on timestamp, missing sides filled with zero, in kW.
fn merge_chart(consumption: &[NetSample], production: &[SamplePoint]) -> Vec<ChartPoint> {
    let mut merged: BTreeMap<DateTime<Utc>, (f64, f64)> = BTreeMap::new();
    for sample in consumption {
        merged.entry(sample.time).or_default().0 = sample.watts / 1000.0;
    }
    for sample in production {
        merged.entry(sample.time).or_default().1 = sample.value / 1000.0;
    }
    merged
        .into_iter()
        .map(|(timestamp, (consumption, production))| ChartPoint {
            timestamp,
            consumption,
            production,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::charging_service::ChargingProvider;
    use crate::application::telemetry_repository::TelemetryRepository;
    use crate::domain::charging::{ChargingSession, RoleCatalog};
    use crate::domain::query::SeriesQuery;
    use crate::domain::sample::{PowerUnit, TaggedSeries};
    use crate::domain::tariff::TariffParameters;
    use crate::infrastructure::config::{MeterBinding, MeterSettings, PriceSettings};
    use approx::assert_abs_diff_eq;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap()
    }

    #[test]
    fn merge_unions_timestamps_and_fills_gaps_with_zero() {
        let consumption = vec![
            NetSample::new(at(10), 1500.0),
            NetSample::new(at(12), 800.0),
        ];
        let production = vec![
            SamplePoint::new(at(12), 2000.0),
            SamplePoint::new(at(11), 500.0),
        ];
        let merged = merge_chart(&consumption, &production);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].timestamp, at(10));
        assert_abs_diff_eq!(merged[0].consumption, 1.5, epsilon = 1e-9);
        assert_eq!(merged[0].production, 0.0);
        assert_eq!(merged[1].timestamp, at(11));
        assert_eq!(merged[1].consumption, 0.0);
        assert_abs_diff_eq!(merged[1].production, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(merged[2].consumption, 0.8, epsilon = 1e-9);
        assert_abs_diff_eq!(merged[2].production, 2.0, epsilon = 1e-9);
    }

    struct StubRepository {
        series: HashMap<String, Vec<SamplePoint>>,
    }

    fn series_key(query: &SeriesQuery) -> String {
        let tags: Vec<String> = query
            .tag_filters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}[{}]", query.field, tags.join(","))
    }

    #[async_trait]
    impl TelemetryRepository for StubRepository {
        async fn query_series(&self, query: &SeriesQuery) -> anyhow::Result<Vec<SamplePoint>> {
            Ok(self.series.get(&series_key(query)).cloned().unwrap_or_default())
        }

        async fn query_series_grouped(
            &self,
            _query: &SeriesQuery,
        ) -> anyhow::Result<Vec<TaggedSeries>> {
            Ok(Vec::new())
        }

        async fn tag_values(
            &self,
            _measurement: &str,
            _tag_key: &str,
            _range: &TimeRange,
        ) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct OfflineProvider;

    #[async_trait]
    impl ChargingProvider for OfflineProvider {
        async fn state(&self) -> anyhow::Result<ChargingState> {
            Ok(ChargingState::disabled())
        }

        async fn sessions(&self, _since_days: u32) -> anyhow::Result<Vec<ChargingSession>> {
            Ok(Vec::new())
        }
    }

    fn tariff() -> TariffParameters {
        TariffParameters {
            fixed_monthly_fees: vec![4.92],
            consumption_coefficient: 0.00102,
            consumption_fixed: 0.004,
            injection_coefficient: 0.00095,
            injection_fixed: -0.005,
            distribution_rate: 0.0538,
            injection_rate: 0.0031,
            green_cert_rate: 0.0142,
            chp_rate: 0.0041,
            capacity_rate_eur_per_kw_year: 56.93,
        }
    }

    fn service(series: HashMap<String, Vec<SamplePoint>>) -> DashboardService {
        let repository: Arc<dyn TelemetryRepository> = Arc::new(StubRepository { series });
        let settings = MeterSettings {
            measurement: "power".to_string(),
            device_tag: "device".to_string(),
            device_field: "value".to_string(),
            grid_import: MeterBinding {
                field: "PowerDelivered".to_string(),
                tags: Default::default(),
                unit: PowerUnit::Watts,
            },
            production: MeterBinding {
                field: "pv".to_string(),
                tags: Default::default(),
                unit: PowerUnit::Watts,
            },
        };
        let meters = MeterAggregator::new(repository.clone(), settings);
        let prices = PriceService::new(
            repository,
            PriceSettings {
                measurement: "electricity_price".to_string(),
                field: "price".to_string(),
                tags: Default::default(),
                default_eur_per_mwh: 100.0,
                match_tolerance_minutes: 60,
            },
            tariff(),
        );
        let costs = CostEngine::new(meters.clone(), prices.clone(), tariff());
        let capacity = CapacityTariffCalculator::new(meters.clone(), tariff());
        let self_consumption = SelfConsumptionCalculator::new(meters.clone());
        let charging = ChargingService::new(Arc::new(OfflineProvider), RoleCatalog::default());
        DashboardService::new(meters, prices, costs, capacity, self_consumption, charging)
    }

    #[tokio::test]
    async fn overview_composes_all_sections() {
        let mut series = HashMap::new();
        series.insert(
            "PowerDelivered[]".to_string(),
            vec![
                SamplePoint::new(at(10), 2000.0),
                SamplePoint::new(at(11), 1000.0),
            ],
        );
        series.insert(
            "pv[]".to_string(),
            vec![
                SamplePoint::new(at(10), 500.0),
                SamplePoint::new(at(11), 500.0),
            ],
        );
        let overview = service(series).overview().await.unwrap();
        // Net hourly means: 1500 W + 500 W makes 2 kWh of consumption.
        assert_abs_diff_eq!(overview.today.consumption, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(overview.today.production, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(overview.today.self_consumption, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(overview.today.grid_import, 1.0, epsilon = 1e-9);
        assert_eq!(overview.today.grid_export, 0.0);
        // Both samples share a month, so one monthly peak of 2000 W.
        assert_abs_diff_eq!(overview.fluvius.average_peak, 2.0, epsilon = 1e-9);
        assert!(!overview.charging.enabled);
        assert_eq!(overview.current.price.market_price_eur_per_mwh, 100.0);
    }

    #[tokio::test]
    async fn unknown_chart_types_are_rejected() {
        let service = service(HashMap::new());
        let range = TimeRange::last(TimeDelta::hours(24));
        let window = WindowAggregate::new(TimeDelta::hours(1), Reducer::Mean);
        let result = service.chart("sparkline", &range, window).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
