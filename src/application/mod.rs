// Application layer - Use cases and the repository contract
pub mod analytics_service;
pub mod capacity_service;
pub mod charging_service;
pub mod cost_service;
pub mod dashboard_service;
pub mod meter_service;
pub mod price_service;
pub mod self_consumption;
pub mod telemetry_repository;
