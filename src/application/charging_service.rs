// Charging service - Use case for vehicle charging and heat pump state
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::charging::{
    sessions_cost, ChargingSession, ChargingState, DeviceRole, Loadpoint, RoleCatalog,
};
use crate::error::{AppError, Result};

/// External charging collaborator seam, implemented by the EVCC client.
#[async_trait]
pub trait ChargingProvider: Send + Sync {
    async fn state(&self) -> anyhow::Result<ChargingState>;
    async fn sessions(&self, since_days: u32) -> anyhow::Result<Vec<ChargingSession>>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingCosts {
    pub total_cost: f64,
    /// Number of sessions the cost covers.
    pub sessions: usize,
}

#[derive(Clone)]
pub struct ChargingService {
    provider: Arc<dyn ChargingProvider>,
    roles: RoleCatalog,
}

impl ChargingService {
    pub fn new(provider: Arc<dyn ChargingProvider>, roles: RoleCatalog) -> Self {
        Self { provider, roles }
    }

    pub async fn status(&self) -> Result<ChargingState> {
        Ok(self.provider.state().await?)
    }

    pub async fn loadpoint(&self, id: u32) -> Result<Loadpoint> {
        let state = self.provider.state().await?;
        state
            .loadpoints
            .into_iter()
            .find(|lp| lp.id == id)
            .ok_or_else(|| AppError::NotFound(format!("loadpoint {id} does not exist")))
    }

    pub async fn sessions(&self, days: u32) -> Result<Vec<ChargingSession>> {
        Ok(self.provider.sessions(days).await?)
    }

    /// The loadpoint configured as a heat pump, when there is one.
    pub async fn heat_pump(&self) -> Result<Loadpoint> {
        let state = self.provider.state().await?;
        state
            .loadpoints
            .into_iter()
            .find(|lp| self.roles.role_of(lp) == DeviceRole::HeatPump)
            .ok_or_else(|| AppError::NotFound("no heat pump loadpoint configured".to_string()))
    }

    /// Every loadpoint that charges a vehicle.
    pub async fn vehicles(&self) -> Result<Vec<Loadpoint>> {
        let state = self.provider.state().await?;
        Ok(state
            .loadpoints
            .into_iter()
            .filter(|lp| self.roles.role_of(lp) == DeviceRole::Vehicle)
            .collect())
    }

    /// Flat-price cost of the sessions in the trailing `days` days.
    pub async fn costs(&self, days: u32, price_per_kwh: f64) -> Result<ChargingCosts> {
        let sessions = self.provider.sessions(days).await?;
        Ok(ChargingCosts {
            total_cost: sessions_cost(&sessions, price_per_kwh),
            sessions: sessions.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    struct StubProvider {
        loadpoints: Vec<Loadpoint>,
        sessions: Vec<ChargingSession>,
    }

    #[async_trait]
    impl ChargingProvider for StubProvider {
        async fn state(&self) -> anyhow::Result<ChargingState> {
            Ok(ChargingState {
                enabled: true,
                available: true,
                loadpoints: self.loadpoints.clone(),
            })
        }

        async fn sessions(&self, _since_days: u32) -> anyhow::Result<Vec<ChargingSession>> {
            Ok(self.sessions.clone())
        }
    }

    fn loadpoint(id: u32, title: &str) -> Loadpoint {
        Loadpoint {
            id,
            title: title.to_string(),
            mode: "pv".to_string(),
            charging: false,
            connected: true,
            power: 0.0,
            energy: 0.0,
            state_of_charge: 0.0,
            vehicle: None,
        }
    }

    fn service() -> ChargingService {
        let provider = StubProvider {
            loadpoints: vec![loadpoint(1, "Garage"), loadpoint(2, "Warmtepomp")],
            sessions: vec![
                ChargingSession {
                    charged_energy: 10.0,
                    duration: Some(7200),
                    created_at: None,
                    loadpoint: Some("Garage".to_string()),
                },
                ChargingSession {
                    charged_energy: 2.5,
                    duration: None,
                    created_at: None,
                    loadpoint: Some("Garage".to_string()),
                },
            ],
        };
        ChargingService::new(
            Arc::new(provider),
            RoleCatalog::new(vec!["Warmtepomp".to_string()]),
        )
    }

    #[tokio::test]
    async fn unknown_loadpoints_are_not_found() {
        let service = service();
        assert_eq!(service.loadpoint(1).await.unwrap().title, "Garage");
        assert!(matches!(
            service.loadpoint(9).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn heat_pump_and_vehicles_split_by_configured_role() {
        let service = service();
        assert_eq!(service.heat_pump().await.unwrap().title, "Warmtepomp");
        let vehicles = service.vehicles().await.unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].title, "Garage");
    }

    #[tokio::test]
    async fn costs_price_all_sessions_at_the_flat_rate() {
        let costs = service().costs(30, 0.30).await.unwrap();
        assert_abs_diff_eq!(costs.total_cost, 3.75, epsilon = 1e-9);
        assert_eq!(costs.sessions, 2);
    }
}
