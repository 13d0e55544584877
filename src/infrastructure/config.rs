// Service configuration
//
// Settings are read from config/default.toml and can be overridden with
// ENERGY_TARIFF__* environment variables (double underscore separates levels,
// e.g. ENERGY_TARIFF__INFLUX__TOKEN).
use std::collections::BTreeMap;

use serde::Deserialize;

use crate::domain::sample::PowerUnit;
use crate::domain::tariff::TariffParameters;
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub influx: InfluxSettings,
    pub meters: MeterSettings,
    pub prices: PriceSettings,
    pub tariff: TariffParameters,
    #[serde(default)]
    pub charging: ChargingSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    #[serde(default = "default_retention_policy")]
    pub retention_policy: String,
}

/// Where the power readings live and which series feed the two meters.
#[derive(Debug, Deserialize, Clone)]
pub struct MeterSettings {
    pub measurement: String,
    /// Tag that identifies individual devices for per-device breakdowns.
    #[serde(default = "default_device_tag")]
    pub device_tag: String,
    /// Field queried for per-device breakdowns.
    #[serde(default = "default_device_field")]
    pub device_field: String,
    pub grid_import: MeterBinding,
    pub production: MeterBinding,
}

/// A single meter series: field, identifying tags and its reporting unit.
#[derive(Debug, Deserialize, Clone)]
pub struct MeterBinding {
    pub field: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub unit: PowerUnit,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceSettings {
    pub measurement: String,
    pub field: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Fallback day-ahead price in EUR/MWh when no stored price matches.
    #[serde(default = "default_price_eur_per_mwh")]
    pub default_eur_per_mwh: f64,
    /// How far a stored price may sit from a consumption sample and still apply.
    #[serde(default = "default_match_tolerance_minutes")]
    pub match_tolerance_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChargingSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_charging_url")]
    pub url: String,
    /// Loadpoint titles that should be classified as heat pumps.
    #[serde(default)]
    pub heat_pump_titles: Vec<String>,
    #[serde(default = "default_charging_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_overview_ttl")]
    pub overview_ttl_secs: u64,
    #[serde(default = "default_analytics_ttl")]
    pub analytics_ttl_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl Default for ChargingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_charging_url(),
            heat_pump_titles: Vec::new(),
            timeout_seconds: default_charging_timeout(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            overview_ttl_secs: default_overview_ttl(),
            analytics_ttl_secs: default_analytics_ttl(),
        }
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_retention_policy() -> String {
    "autogen".to_string()
}

fn default_device_tag() -> String {
    "device".to_string()
}

fn default_device_field() -> String {
    "value".to_string()
}

fn default_price_eur_per_mwh() -> f64 {
    100.0
}

fn default_match_tolerance_minutes() -> i64 {
    60
}

fn default_charging_url() -> String {
    "http://localhost:7070".to_string()
}

fn default_charging_timeout() -> u64 {
    5
}

fn default_overview_ttl() -> u64 {
    60
}

fn default_analytics_ttl() -> u64 {
    300
}

impl Settings {
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::Environment::with_prefix("ENERGY_TARIFF").separator("__"))
            .build()
            .map_err(|e| AppError::Config(format!("failed to read configuration: {e}")))?;

        let settings: Settings = source
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("invalid configuration: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.influx.host.is_empty() {
            return Err(AppError::Config("influx.host must not be empty".to_string()));
        }
        if self.influx.token.is_empty() {
            return Err(AppError::Config("influx.token must not be empty".to_string()));
        }
        if self.influx.database.is_empty() {
            return Err(AppError::Config(
                "influx.database must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [influx]
        host = "http://influx:8086"
        token = "secret"
        database = "energy"

        [meters]
        measurement = "power"

        [meters.grid_import]
        field = "PowerDelivered"
        tags = { source = "p1" }
        unit = "kilowatts"

        [meters.production]
        field = "value"
        tags = { source = "sdm" }

        [prices]
        measurement = "electricity_price"
        field = "price"

        [tariff]
        fixed_monthly_fees = [4.92]
        consumption_coefficient = 0.00102
        consumption_fixed = 0.004
        injection_coefficient = 0.00095
        injection_fixed = -0.005
        distribution_rate = 0.0538
        injection_rate = 0.0031
        green_cert_rate = 0.0142
        chp_rate = 0.0041
        capacity_rate_eur_per_kw_year = 56.93
    "#;

    fn parse(toml: &str) -> Settings {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let settings = parse(MINIMAL);

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.influx.retention_policy, "autogen");
        assert_eq!(settings.meters.device_tag, "device");
        assert_eq!(settings.meters.device_field, "value");
        assert_eq!(settings.meters.grid_import.unit, PowerUnit::Kilowatts);
        assert_eq!(settings.meters.production.unit, PowerUnit::Watts);
        assert_eq!(settings.prices.default_eur_per_mwh, 100.0);
        assert_eq!(settings.prices.match_tolerance_minutes, 60);
        assert!(!settings.charging.enabled);
        assert_eq!(settings.charging.timeout_seconds, 5);
        assert_eq!(settings.cache.overview_ttl_secs, 60);
        assert_eq!(settings.cache.analytics_ttl_secs, 300);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn empty_token_fails_validation() {
        let toml = MINIMAL.replace("token = \"secret\"", "token = \"\"");
        let settings = parse(&toml);

        let err = settings.validate().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
