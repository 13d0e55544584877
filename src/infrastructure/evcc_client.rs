// EVCC client - HTTP adapter for the charging collaborator
//
// The collaborator is optional. When it is disabled in configuration the
// client answers without touching the network, and when it is unreachable it
// degrades to an unavailable state instead of failing the caller.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::application::charging_service::ChargingProvider;
use crate::domain::charging::{ChargingSession, ChargingState, Loadpoint};
use crate::infrastructure::config::ChargingSettings;

#[derive(Debug, Clone)]
pub struct EvccClient {
    client: reqwest::Client,
    base_url: String,
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    #[serde(default)]
    loadpoints: Vec<Loadpoint>,
}

impl EvccClient {
    pub fn new(settings: &ChargingSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("Failed to build the EVCC HTTP client")?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            enabled: settings.enabled,
        })
    }

    async fn fetch_state(&self) -> Result<ChargingState> {
        let response = self
            .client
            .get(format!("{}/api/state", self.base_url))
            .send()
            .await
            .context("Failed to reach EVCC")?
            .error_for_status()
            .context("EVCC state request failed")?;
        let state: StateResponse = response
            .json()
            .await
            .context("Failed to parse EVCC state")?;

        Ok(ChargingState {
            enabled: true,
            available: true,
            loadpoints: assign_fallback_ids(state.loadpoints),
        })
    }

    async fn fetch_sessions(&self, since_days: u32) -> Result<Vec<ChargingSession>> {
        let response = self
            .client
            .get(format!("{}/api/sessions", self.base_url))
            .query(&[("since", format!("{since_days}d"))])
            .send()
            .await
            .context("Failed to reach EVCC")?
            .error_for_status()
            .context("EVCC sessions request failed")?;
        response
            .json()
            .await
            .context("Failed to parse EVCC sessions")
    }
}

#[async_trait]
impl ChargingProvider for EvccClient {
    async fn state(&self) -> Result<ChargingState> {
        if !self.enabled {
            return Ok(ChargingState::disabled());
        }
        match self.fetch_state().await {
            Ok(state) => Ok(state),
            Err(error) => {
                tracing::warn!("EVCC is unreachable, reporting unavailable: {:#}", error);
                Ok(ChargingState::unavailable())
            }
        }
    }

    async fn sessions(&self, since_days: u32) -> Result<Vec<ChargingSession>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        match self.fetch_sessions(since_days).await {
            Ok(sessions) => Ok(sessions),
            Err(error) => {
                tracing::warn!("EVCC sessions are unavailable: {:#}", error);
                Ok(Vec::new())
            }
        }
    }
}

/// Older EVCC payloads omit loadpoint ids; number them by position.
fn assign_fallback_ids(loadpoints: Vec<Loadpoint>) -> Vec<Loadpoint> {
    loadpoints
        .into_iter()
        .enumerate()
        .map(|(idx, mut loadpoint)| {
            if loadpoint.id == 0 {
                loadpoint.id = idx as u32 + 1;
            }
            loadpoint
        })
        .collect()
}
