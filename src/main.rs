// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;
mod error;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::analytics_service::AnalyticsService;
use crate::application::capacity_service::CapacityTariffCalculator;
use crate::application::charging_service::{ChargingProvider, ChargingService};
use crate::application::cost_service::CostEngine;
use crate::application::dashboard_service::DashboardService;
use crate::application::meter_service::MeterAggregator;
use crate::application::price_service::PriceService;
use crate::application::self_consumption::SelfConsumptionCalculator;
use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::charging::RoleCatalog;
use crate::infrastructure::cache::ResponseCache;
use crate::infrastructure::config::Settings;
use crate::infrastructure::evcc_client::EvccClient;
use crate::infrastructure::influx_repository::InfluxRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let settings = Settings::load()?;

    // Create adapters (infrastructure layer)
    let repository: Arc<dyn TelemetryRepository> =
        Arc::new(InfluxRepository::new(&settings.influx)?);
    let provider: Arc<dyn ChargingProvider> = Arc::new(EvccClient::new(&settings.charging)?);

    // Create services (application layer)
    let meters = MeterAggregator::new(repository.clone(), settings.meters.clone());
    let prices = PriceService::new(
        repository.clone(),
        settings.prices.clone(),
        settings.tariff.clone(),
    );
    let costs = CostEngine::new(meters.clone(), prices.clone(), settings.tariff.clone());
    let capacity = CapacityTariffCalculator::new(meters.clone(), settings.tariff.clone());
    let self_consumption = SelfConsumptionCalculator::new(meters.clone());
    let roles = RoleCatalog::new(settings.charging.heat_pump_titles.clone());
    let charging = ChargingService::new(provider, roles);
    let analytics = AnalyticsService::new(
        meters.clone(),
        capacity.clone(),
        self_consumption.clone(),
        costs.clone(),
    );
    let dashboard = DashboardService::new(
        meters.clone(),
        prices.clone(),
        costs.clone(),
        capacity.clone(),
        self_consumption.clone(),
        charging.clone(),
    );

    // Create application state
    let state = Arc::new(AppState {
        meters,
        prices,
        costs,
        capacity,
        self_consumption,
        charging,
        analytics,
        dashboard,
        cache: ResponseCache::new(),
        cache_settings: settings.cache.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/api/telemetry/current", get(handlers::current_power))
        .route("/api/telemetry/consumption", get(handlers::consumption_series))
        .route("/api/telemetry/production", get(handlers::production_series))
        .route("/api/telemetry/prices", get(handlers::price_series))
        .route("/api/telemetry/meters", get(handlers::list_meters))
        .route("/api/tariff/fluvius", get(handlers::fluvius_tariff))
        .route("/api/tariff/costs", get(handlers::costs))
        .route("/api/tariff/breakdown/:period", get(handlers::cost_breakdown))
        .route("/api/tariff/self-consumption", get(handlers::self_consumption))
        .route("/api/tariff/current-price", get(handlers::current_price))
        .route("/api/tariff/forecast", get(handlers::price_forecast))
        .route("/api/tariff/rates", get(handlers::tariff_rates))
        .route("/api/dashboard/overview", get(handlers::dashboard_overview))
        .route("/api/dashboard/summary/:period", get(handlers::dashboard_summary))
        .route("/api/dashboard/chart/:type", get(handlers::dashboard_chart))
        .route("/api/charging/status", get(handlers::charging_status))
        .route("/api/charging/loadpoint/:id", get(handlers::charging_loadpoint))
        .route("/api/charging/sessions", get(handlers::charging_sessions))
        .route("/api/charging/heat-pump", get(handlers::heat_pump))
        .route("/api/charging/vehicles", get(handlers::vehicles))
        .route("/api/charging/costs", get(handlers::charging_costs))
        .route("/api/analytics/insights", get(handlers::analytics_insights))
        .route("/api/analytics/comparison", get(handlers::analytics_comparison))
        .route("/api/analytics/peak-times", get(handlers::peak_times))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting energy-tariff service on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
