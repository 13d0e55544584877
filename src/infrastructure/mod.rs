// Infrastructure layer - External dependencies and adapters
pub mod cache;
pub mod config;
pub mod evcc_client;
pub mod influx_repository;
