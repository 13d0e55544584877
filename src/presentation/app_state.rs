// Application state for HTTP handlers
use crate::application::analytics_service::AnalyticsService;
use crate::application::capacity_service::CapacityTariffCalculator;
use crate::application::charging_service::ChargingService;
use crate::application::cost_service::CostEngine;
use crate::application::dashboard_service::DashboardService;
use crate::application::meter_service::MeterAggregator;
use crate::application::price_service::PriceService;
use crate::application::self_consumption::SelfConsumptionCalculator;
use crate::infrastructure::cache::ResponseCache;
use crate::infrastructure::config::CacheSettings;

#[derive(Clone)]
pub struct AppState {
    pub meters: MeterAggregator,
    pub prices: PriceService,
    pub costs: CostEngine,
    pub capacity: CapacityTariffCalculator,
    pub self_consumption: SelfConsumptionCalculator,
    pub charging: ChargingService,
    pub analytics: AnalyticsService,
    pub dashboard: DashboardService,
    pub cache: ResponseCache,
    pub cache_settings: CacheSettings,
}
