// HTTP request handlers
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::application::analytics_service::{PeakTimeProfile, PeriodComparison};
use crate::application::charging_service::ChargingCosts;
use crate::application::dashboard_service::{ChartData, PeriodSummary};
use crate::application::meter_service::CurrentPower;
use crate::application::price_service::CurrentPrice;
use crate::domain::charging::{ChargingSession, ChargingState, Loadpoint};
use crate::domain::price::PricePoint;
use crate::domain::query::{parse_duration, Reducer, TimeRange, WindowAggregate};
use crate::domain::sample::{NetSample, SamplePoint};
use crate::domain::tariff::{CapacityTariff, CostBreakdown, TariffParameters};
use crate::error::{AppError, Result};
use crate::presentation::app_state::AppState;

#[derive(Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub stop: Option<String>,
    pub window: Option<String>,
}

#[derive(Deserialize)]
pub struct MonthsQuery {
    pub months: Option<u32>,
}

#[derive(Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingCostsQuery {
    pub days: Option<u32>,
    pub average_price: Option<f64>,
}

fn parse_range(query: &RangeQuery, default_start: &str) -> Result<TimeRange> {
    let start = query.start.as_deref().unwrap_or(default_start);
    let stop = query.stop.as_deref().unwrap_or("now()");
    TimeRange::parse(start, stop).map_err(|e| AppError::Validation(e.to_string()))
}

fn parse_window(query: &RangeQuery, default_every: &str) -> Result<WindowAggregate> {
    let every = parse_duration(query.window.as_deref().unwrap_or(default_every))
        .map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(WindowAggregate::new(every, Reducer::Mean))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

// -- Telemetry --

pub async fn current_power(State(state): State<Arc<AppState>>) -> Result<Json<CurrentPower>> {
    Ok(Json(state.meters.current().await?))
}

pub async fn consumption_series(
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<NetSample>>> {
    let range = parse_range(&query, "-24h")?;
    let window = parse_window(&query, "1h")?;
    Ok(Json(
        state.meters.net_consumption(&range, Some(window)).await?,
    ))
}

pub async fn production_series(
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SamplePoint>>> {
    let range = parse_range(&query, "-24h")?;
    let window = parse_window(&query, "1h")?;
    Ok(Json(state.meters.production(&range, Some(window)).await?))
}

pub async fn price_series(
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PricePoint>>> {
    let range = parse_range(&query, "-24h")?;
    Ok(Json(state.prices.series(&range).await?.points().to_vec()))
}

pub async fn list_meters(
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>> {
    let range = parse_range(&query, "-24h")?;
    Ok(Json(state.meters.meters(&range).await?))
}

// -- Tariff --

pub async fn fluvius_tariff(
    Query(query): Query<MonthsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CapacityTariff>> {
    let months = query.months.unwrap_or(12);
    Ok(Json(state.capacity.calculate(months).await?))
}

pub async fn costs(
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CostBreakdown>> {
    let range = parse_range(&query, "-30d")?;
    Ok(Json(state.costs.costs(&range).await?))
}

pub async fn cost_breakdown(
    Path(period): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CostBreakdown>> {
    Ok(Json(state.costs.costs_for_period(&period).await?))
}

pub async fn self_consumption(
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>> {
    let range = parse_range(&query, "-30d")?;
    let ratio = state.self_consumption.ratio(&range).await?;
    Ok(Json(serde_json::json!({ "selfConsumptionRatio": ratio })))
}

pub async fn current_price(State(state): State<Arc<AppState>>) -> Result<Json<CurrentPrice>> {
    Ok(Json(state.prices.current_price().await?))
}

pub async fn price_forecast(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PricePoint>>> {
    Ok(Json(state.prices.forecast().await?))
}

pub async fn tariff_rates(State(state): State<Arc<AppState>>) -> Result<Json<TariffParameters>> {
    Ok(Json(state.prices.rates().clone()))
}

// -- Dashboard --

pub async fn dashboard_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>> {
    if let Some(cached) = state.cache.get("dashboard-overview").await {
        return Ok(Json(cached));
    }

    let overview = state.dashboard.overview().await?;
    let value = serde_json::to_value(&overview).map_err(anyhow::Error::from)?;
    state
        .cache
        .put(
            "dashboard-overview",
            value.clone(),
            Duration::from_secs(state.cache_settings.overview_ttl_secs),
        )
        .await;
    Ok(Json(value))
}

pub async fn dashboard_summary(
    Path(period): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PeriodSummary>> {
    Ok(Json(state.dashboard.summary(&period).await?))
}

pub async fn dashboard_chart(
    Path(chart_type): Path<String>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ChartData>> {
    let range = parse_range(&query, "-24h")?;
    let window = parse_window(&query, "1h")?;
    Ok(Json(
        state.dashboard.chart(&chart_type, &range, window).await?,
    ))
}

// -- Charging --

pub async fn charging_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ChargingState>> {
    Ok(Json(state.charging.status().await?))
}

pub async fn charging_loadpoint(
    Path(id): Path<u32>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Loadpoint>> {
    Ok(Json(state.charging.loadpoint(id).await?))
}

pub async fn charging_sessions(
    Query(query): Query<DaysQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChargingSession>>> {
    Ok(Json(state.charging.sessions(query.days.unwrap_or(30)).await?))
}

pub async fn heat_pump(State(state): State<Arc<AppState>>) -> Result<Json<Loadpoint>> {
    Ok(Json(state.charging.heat_pump().await?))
}

pub async fn vehicles(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Loadpoint>>> {
    Ok(Json(state.charging.vehicles().await?))
}

pub async fn charging_costs(
    Query(query): Query<ChargingCostsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ChargingCosts>> {
    let days = query.days.unwrap_or(30);
    let price = query.average_price.unwrap_or(0.30);
    Ok(Json(state.charging.costs(days, price).await?))
}

// -- Analytics --

pub async fn analytics_insights(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>> {
    if let Some(cached) = state.cache.get("analytics-insights").await {
        return Ok(Json(cached));
    }

    let insights = state.analytics.insights().await?;
    let value = serde_json::to_value(&insights).map_err(anyhow::Error::from)?;
    state
        .cache
        .put(
            "analytics-insights",
            value.clone(),
            Duration::from_secs(state.cache_settings.analytics_ttl_secs),
        )
        .await;
    Ok(Json(value))
}

pub async fn analytics_comparison(
    Query(query): Query<PeriodQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PeriodComparison>> {
    let period = query.period.as_deref().unwrap_or("day");
    Ok(Json(state.analytics.comparison(period).await?))
}

pub async fn peak_times(
    Query(query): Query<DaysQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PeakTimeProfile>> {
    Ok(Json(state.analytics.peak_times(query.days.unwrap_or(30)).await?))
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::domain::query::RangeBound;

    fn query(start: Option<&str>, stop: Option<&str>, window: Option<&str>) -> RangeQuery {
        RangeQuery {
            start: start.map(String::from),
            stop: stop.map(String::from),
            window: window.map(String::from),
        }
    }

    #[test]
    fn range_defaults_apply_when_params_are_missing() {
        let range = parse_range(&query(None, None, None), "-24h").unwrap();
        assert_eq!(range.start, RangeBound::Relative(TimeDelta::hours(-24)));
        assert_eq!(range.stop, RangeBound::Now);
    }

    #[test]
    fn bad_range_params_are_validation_errors() {
        let err = parse_range(&query(Some("yesterday"), None, None), "-24h").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = parse_range(&query(Some("now()"), Some("-24h"), None), "-24h").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn window_parses_with_a_mean_reducer() {
        let window = parse_window(&query(None, None, Some("15m")), "1h").unwrap();
        assert_eq!(window.every, TimeDelta::minutes(15));
        assert_eq!(window.reducer, Reducer::Mean);

        let err = parse_window(&query(None, None, Some("soon")), "1h").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
