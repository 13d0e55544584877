// Price service - Use case for EPEX day-ahead market prices
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::domain::query::{RangeBound, SeriesQuery, TimeRange};
use crate::domain::tariff::TariffParameters;
use crate::error::Result;
use crate::infrastructure::config::PriceSettings;

/// Current market price broken down into the consumer's per-kWh components.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPrice {
    /// Timestamp of the matched market sample; absent when the configured
    /// default price was substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    pub market_price_eur_per_mwh: f64,
    pub consumption_eur_per_kwh: f64,
    pub injection_eur_per_kwh: f64,
    pub distribution_eur_per_kwh: f64,
    pub green_cert_eur_per_kwh: f64,
    pub chp_eur_per_kwh: f64,
    pub total_eur_per_kwh: f64,
    pub currency: &'static str,
    pub unit: &'static str,
}

#[derive(Clone)]
pub struct PriceService {
    repository: Arc<dyn TelemetryRepository>,
    settings: PriceSettings,
    tariff: TariffParameters,
}

impl PriceService {
    pub fn new(
        repository: Arc<dyn TelemetryRepository>,
        settings: PriceSettings,
        tariff: TariffParameters,
    ) -> Self {
        Self {
            repository,
            settings,
            tariff,
        }
    }

    pub fn default_price_eur_per_mwh(&self) -> f64 {
        self.settings.default_eur_per_mwh
    }

    fn price_query(&self, range: &TimeRange) -> SeriesQuery {
        let mut query = SeriesQuery::new(&self.settings.measurement, &self.settings.field, *range);
        for (key, value) in &self.settings.tags {
            query = query.with_tag(key, value);
        }
        query
    }

    /// Market prices over a range, ready for timestamp matching.
    pub async fn series(&self, range: &TimeRange) -> Result<PriceSeries> {
        let points = self.repository.query_series(&self.price_query(range)).await?;
        let points = points
            .into_iter()
            .map(|p| PricePoint::new(p.time, p.value))
            .collect();
        Ok(PriceSeries::new(
            points,
            TimeDelta::minutes(self.settings.match_tolerance_minutes),
        ))
    }

    /// Latest market sample within the last hour, if the feed is current.
    pub async fn latest(&self) -> Result<Option<PricePoint>> {
        let series = self.series(&TimeRange::last(TimeDelta::hours(1))).await?;
        Ok(series.latest())
    }

    /// Published prices from one hour ago through the day-ahead horizon.
    pub async fn forecast(&self) -> Result<Vec<PricePoint>> {
        let range = TimeRange::new(
            RangeBound::Relative(TimeDelta::hours(-1)),
            RangeBound::Relative(TimeDelta::hours(24)),
        );
        let points = self.repository.query_series(&self.price_query(&range)).await?;
        Ok(points
            .into_iter()
            .map(|p| PricePoint::new(p.time, p.value))
            .collect())
    }

    /// Current price with the full per-kWh component breakdown.
    ///
    /// Falls back to the configured default market price when the feed has no
    /// sample in the last hour.
    pub async fn current_price(&self) -> Result<CurrentPrice> {
        let latest = self.latest().await?;
        let (time, market) = match latest {
            Some(point) => (Some(point.time), point.eur_per_mwh),
            None => (None, self.settings.default_eur_per_mwh),
        };
        Ok(self.breakdown_at(time, market))
    }

    fn breakdown_at(&self, time: Option<DateTime<Utc>>, market_eur_per_mwh: f64) -> CurrentPrice {
        let consumption = self.tariff.consumption_cost_per_kwh(market_eur_per_mwh);
        let distribution = self.tariff.distribution_rate;
        let green_cert = self.tariff.green_cert_rate;
        let chp = self.tariff.chp_rate;
        CurrentPrice {
            time,
            market_price_eur_per_mwh: market_eur_per_mwh,
            consumption_eur_per_kwh: consumption,
            injection_eur_per_kwh: self.tariff.injection_revenue_per_kwh(market_eur_per_mwh),
            distribution_eur_per_kwh: distribution,
            green_cert_eur_per_kwh: green_cert,
            chp_eur_per_kwh: chp,
            total_eur_per_kwh: consumption + distribution + green_cert + chp,
            currency: "EUR",
            unit: "kWh",
        }
    }

    /// The configured tariff rates, for the rates endpoint.
    pub fn rates(&self) -> &TariffParameters {
        &self.tariff
    }
}
