// Cost engine - Use case for itemized electricity cost calculation
//
// Samples are fetched as 15-minute mean power, matched to the day-ahead price
// at their timestamp and priced per kWh. Flat levies scale with delivered and
// returned energy; the capacity component charges the highest 15-minute peak
// seen in the range.
use chrono::TimeDelta;
use futures::try_join;

use crate::application::meter_service::MeterAggregator;
use crate::application::price_service::PriceService;
use crate::domain::price::PriceSeries;
use crate::domain::query::{Reducer, TimeRange, WindowAggregate};
use crate::domain::sample::{NetSample, SamplePoint};
use crate::domain::tariff::{CostBreakdown, TariffParameters};
use crate::error::{AppError, Result};

const COST_WINDOW_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct CostEngine {
    meters: MeterAggregator,
    prices: PriceService,
    tariff: TariffParameters,
}

impl CostEngine {
    pub fn new(meters: MeterAggregator, prices: PriceService, tariff: TariffParameters) -> Self {
        Self {
            meters,
            prices,
            tariff,
        }
    }

    /// Itemized costs over an arbitrary range.
    pub async fn costs(&self, range: &TimeRange) -> Result<CostBreakdown> {
        let window = WindowAggregate::new(
            TimeDelta::minutes(COST_WINDOW_MINUTES),
            Reducer::Mean,
        );
        let (consumption, production, prices) = try_join!(
            self.meters.net_consumption(range, Some(window)),
            self.meters.production(range, Some(window)),
            self.prices.series(range),
        )?;
        Ok(self.accumulate(&consumption, &production, &prices))
    }

    /// Itemized costs for a named period ending now.
    pub async fn costs_for_period(&self, period: &str) -> Result<CostBreakdown> {
        self.costs(&Self::period_range(period)?).await
    }

    /// Map `day`/`week`/`month`/`year` onto a trailing range.
    pub fn period_range(period: &str) -> Result<TimeRange> {
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
        Ok(TimeRange::last(TimeDelta::days(days)))
    }

    fn accumulate(
        &self,
        consumption: &[NetSample],
        production: &[SamplePoint],
        prices: &PriceSeries,
    ) -> CostBreakdown {
        let interval_hours = COST_WINDOW_MINUTES as f64 / 60.0;
        let default_price = self.prices.default_price_eur_per_mwh();

        let mut energy_cost = 0.0;
        let mut delivered_kwh = 0.0;
        let mut peak_kw: f64 = 0.0;
        for sample in consumption {
            let market = prices.price_at(sample.time).unwrap_or(default_price);
            let kw = sample.watts / 1000.0;
            let kwh = kw * interval_hours;
            energy_cost += self.tariff.consumption_cost_per_kwh(market) * kwh;
            delivered_kwh += kwh;
            peak_kw = peak_kw.max(kw);
        }

        let mut energy_revenue = 0.0;
        let mut returned_kwh = 0.0;
        for sample in production {
            let market = prices.price_at(sample.time).unwrap_or(default_price);
            let kwh = (sample.value / 1000.0) * interval_hours;
            energy_revenue += self.tariff.injection_revenue_per_kwh(market) * kwh;
            returned_kwh += kwh;
        }

        // Subscription fees apply in full whenever the range saw any energy;
        // a range with no samples at all stays at zero.
        let fixed_cost = if consumption.is_empty() && production.is_empty() {
            0.0
        } else {
            self.tariff.fixed_monthly_total()
        };

        CostBreakdown {
            fixed_cost,
            energy_cost,
            energy_revenue,
            distribution_cost: delivered_kwh * self.tariff.distribution_rate,
            injection_cost: returned_kwh * self.tariff.injection_rate,
            green_cert_cost: delivered_kwh * self.tariff.green_cert_rate,
            chp_cost: delivered_kwh * self.tariff.chp_rate,
            capacity_cost: self.tariff.capacity_cost_per_month(peak_kw),
            total_kwh_delivered: delivered_kwh,
            total_kwh_returned: returned_kwh,
            peak_power_kw: peak_kw,
            ..CostBreakdown::default()
        }
        .with_totals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::telemetry_repository::TelemetryRepository;
    use crate::domain::price::PricePoint;
    use crate::domain::query::SeriesQuery;
    use crate::domain::sample::{PowerUnit, TaggedSeries};
    use crate::infrastructure::config::{MeterBinding, MeterSettings, PriceSettings};
    use approx::assert_abs_diff_eq;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

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

    fn meter_settings() -> MeterSettings {
        MeterSettings {
            measurement: "power".to_string(),
            device_tag: "device".to_string(),
            device_field: "value".to_string(),
            grid_import: MeterBinding {
                field: "PowerDelivered".to_string(),
                tags: BTreeMap::from([("source".to_string(), "p1".to_string())]),
                unit: PowerUnit::Kilowatts,
            },
            production: MeterBinding {
                field: "value".to_string(),
                tags: BTreeMap::from([("source".to_string(), "sdm".to_string())]),
                unit: PowerUnit::Watts,
            },
        }
    }

    fn price_settings() -> PriceSettings {
        PriceSettings {
            measurement: "electricity_price".to_string(),
            field: "price".to_string(),
            tags: Default::default(),
            default_eur_per_mwh: 100.0,
            match_tolerance_minutes: 60,
        }
    }

    fn engine(series: HashMap<String, Vec<SamplePoint>>) -> CostEngine {
        let repository: Arc<dyn TelemetryRepository> = Arc::new(StubRepository { series });
        let meters = MeterAggregator::new(repository.clone(), meter_settings());
        let prices = PriceService::new(repository, price_settings(), tariff());
        CostEngine::new(meters, prices, tariff())
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, minute, 0).unwrap()
    }

    fn price_series(points: &[(DateTime<Utc>, f64)]) -> PriceSeries {
        PriceSeries::new(
            points.iter().map(|&(t, p)| PricePoint::new(t, p)).collect(),
            TimeDelta::hours(1),
        )
    }

    #[test]
    fn one_quarter_hour_at_four_kilowatts_costs_ten_point_six_cents() {
        let engine = engine(HashMap::new());
        let breakdown = engine.accumulate(
            &[NetSample::new(at(0), 4000.0)],
            &[],
            &price_series(&[(at(0), 100.0)]),
        );
        assert_abs_diff_eq!(breakdown.energy_cost, 0.106, epsilon = 1e-9);
        assert_abs_diff_eq!(breakdown.total_kwh_delivered, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(breakdown.peak_power_kw, 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            breakdown.capacity_cost,
            4.0 * 56.93 / 12.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn any_covered_range_carries_the_full_monthly_subscription() {
        let engine = engine(HashMap::new());
        let breakdown = engine.accumulate(
            &[NetSample::new(at(0), 4000.0)],
            &[],
            &price_series(&[(at(0), 100.0)]),
        );
        assert_abs_diff_eq!(breakdown.fixed_cost, 4.92, epsilon = 1e-9);

        // A production-only range pays the subscription too.
        let breakdown = engine.accumulate(
            &[],
            &[SamplePoint::new(at(0), 2000.0)],
            &price_series(&[(at(0), 100.0)]),
        );
        assert_abs_diff_eq!(breakdown.fixed_cost, 4.92, epsilon = 1e-9);
    }

    #[test]
    fn unmatched_samples_fall_back_to_the_default_price() {
        let engine = engine(HashMap::new());
        let far_away = at(0) + TimeDelta::hours(6);
        let breakdown = engine.accumulate(
            &[NetSample::new(far_away, 4000.0)],
            &[],
            &price_series(&[(at(0), 500.0)]),
        );
        // Default is 100 EUR/MWh, so the 500 EUR/MWh sample must not be used.
        assert_abs_diff_eq!(breakdown.energy_cost, 0.106, epsilon = 1e-9);
    }

    #[test]
    fn production_earns_injection_revenue_and_pays_the_injection_levy() {
        let engine = engine(HashMap::new());
        let breakdown = engine.accumulate(
            &[],
            &[SamplePoint::new(at(0), 2000.0)],
            &price_series(&[(at(0), 100.0)]),
        );
        assert_abs_diff_eq!(breakdown.energy_revenue, 0.045, epsilon = 1e-9);
        assert_abs_diff_eq!(breakdown.total_kwh_returned, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(breakdown.injection_cost, 0.00155, epsilon = 1e-9);
        assert_abs_diff_eq!(breakdown.net_cost, breakdown.total_cost - 0.045, epsilon = 1e-9);
    }

    #[test]
    fn totals_cover_every_component_exactly_once() {
        let engine = engine(HashMap::new());
        let breakdown = engine.accumulate(
            &[
                NetSample::new(at(0), 4000.0),
                NetSample::new(at(15), 2000.0),
            ],
            &[SamplePoint::new(at(0), 1000.0)],
            &price_series(&[(at(0), 100.0), (at(15), 120.0)]),
        );
        let component_sum = breakdown.fixed_cost
            + breakdown.energy_cost
            + breakdown.distribution_cost
            + breakdown.injection_cost
            + breakdown.green_cert_cost
            + breakdown.chp_cost
            + breakdown.capacity_cost;
        assert_abs_diff_eq!(breakdown.total_cost, component_sum, epsilon = 1e-12);
        assert_abs_diff_eq!(
            breakdown.net_cost,
            component_sum - breakdown.energy_revenue,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(breakdown.peak_power_kw, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_ranges_cost_nothing() {
        let engine = engine(HashMap::new());
        let breakdown = engine.accumulate(&[], &[], &price_series(&[]));
        assert_eq!(breakdown.total_cost, 0.0);
        assert_eq!(breakdown.net_cost, 0.0);
        assert_eq!(breakdown.fixed_cost, 0.0);
        assert_eq!(breakdown.total_kwh_delivered, 0.0);
        assert_eq!(breakdown.peak_power_kw, 0.0);
    }

    #[test]
    fn period_names_map_to_trailing_ranges() {
        assert_eq!(
            CostEngine::period_range("day").unwrap(),
            TimeRange::last(TimeDelta::days(1))
        );
        assert_eq!(
            CostEngine::period_range("year").unwrap(),
            TimeRange::last(TimeDelta::days(365))
        );
        assert!(matches!(
            CostEngine::period_range("fortnight"),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn costs_join_meters_and_prices_end_to_end() {
        let mut series = HashMap::new();
        series.insert(
            "PowerDelivered[source=p1]".to_string(),
            vec![SamplePoint::new(at(0), 4.5)],
        );
        series.insert(
            "value[source=sdm]".to_string(),
            vec![SamplePoint::new(at(0), 500.0)],
        );
        series.insert(
            "price[]".to_string(),
            vec![SamplePoint::new(at(0), 100.0)],
        );
        let engine = engine(series);
        let range = TimeRange::last(TimeDelta::hours(24));
        let breakdown = engine.costs(&range).await.unwrap();
        // Net consumption is 4500 W - 500 W = 4 kW for one quarter hour.
        assert_abs_diff_eq!(breakdown.energy_cost, 0.106, epsilon = 1e-9);
        assert_abs_diff_eq!(breakdown.total_kwh_delivered, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(breakdown.total_kwh_returned, 0.125, epsilon = 1e-9);
    }
}
