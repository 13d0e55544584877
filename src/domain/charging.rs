// Vehicle charging domain models
//
// Mirrors the EVCC collaborator's state payloads. Loadpoint roles come from
// static configuration: any title listed as a heat pump is one, everything
// else charges a vehicle.
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loadpoint {
    /// State payloads may omit ids; the client falls back to 1-based position.
    #[serde(default)]
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub charging: bool,
    #[serde(default)]
    pub connected: bool,
    /// Instantaneous charge power in watts.
    #[serde(default)]
    pub power: f64,
    /// Energy charged in the running session, in kWh.
    #[serde(default)]
    pub energy: f64,
    #[serde(default, alias = "soc")]
    pub state_of_charge: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingState {
    pub enabled: bool,
    pub available: bool,
    pub loadpoints: Vec<Loadpoint>,
}

impl ChargingState {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            available: false,
            loadpoints: Vec::new(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            enabled: true,
            available: false,
            loadpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSession {
    /// Energy charged over the session, in kWh.
    #[serde(default)]
    pub charged_energy: f64,
    /// Session length in seconds, when the collaborator reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loadpoint: Option<String>,
}

/// Flat-price cost of a set of sessions, in EUR.
pub fn sessions_cost(sessions: &[ChargingSession], price_per_kwh: f64) -> f64 {
    sessions
        .iter()
        .map(|session| session.charged_energy * price_per_kwh)
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceRole {
    HeatPump,
    Vehicle,
}

/// Loadpoint role lookup backed by configured titles.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    heat_pump_titles: HashSet<String>,
}

impl RoleCatalog {
    pub fn new(heat_pump_titles: impl IntoIterator<Item = String>) -> Self {
        Self {
            heat_pump_titles: heat_pump_titles
                .into_iter()
                .map(|title| title.trim().to_lowercase())
                .collect(),
        }
    }

    pub fn role_of(&self, loadpoint: &Loadpoint) -> DeviceRole {
        let title = loadpoint.title.trim().to_lowercase();
        if self.heat_pump_titles.contains(&title) {
            DeviceRole::HeatPump
        } else {
            DeviceRole::Vehicle
        }
    }
}
