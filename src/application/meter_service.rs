// Meter aggregation service - Use case for net consumption and production series
//
// Grid import and local production come from different meters with different
// fields and units; this service queries both, scales everything to watts and
// joins them on timestamp.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use futures::try_join;
use serde::Serialize;

use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::query::{Reducer, SeriesQuery, TimeRange, WindowAggregate};
use crate::domain::sample::{NetSample, SamplePoint, TaggedSeries};
use crate::error::Result;
use crate::infrastructure::config::{MeterBinding, MeterSettings};

/// Most recent power readings, all in watts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPower {
    pub grid_import: f64,
    pub production: f64,
    /// Grid import minus production; negative while exporting.
    pub net_consumption: f64,
    pub devices: BTreeMap<String, f64>,
}

#[derive(Clone)]
pub struct MeterAggregator {
    repository: Arc<dyn TelemetryRepository>,
    settings: MeterSettings,
}

impl MeterAggregator {
    pub fn new(repository: Arc<dyn TelemetryRepository>, settings: MeterSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    fn binding_query(
        &self,
        binding: &MeterBinding,
        range: &TimeRange,
        window: Option<WindowAggregate>,
    ) -> SeriesQuery {
        let mut query = SeriesQuery::new(&self.settings.measurement, &binding.field, *range);
        for (key, value) in &binding.tags {
            query = query.with_tag(key, value);
        }
        if let Some(window) = window {
            query = query.with_window(window);
        }
        query
    }

    async fn binding_series(
        &self,
        binding: &MeterBinding,
        range: &TimeRange,
        window: Option<WindowAggregate>,
    ) -> Result<Vec<SamplePoint>> {
        let query = self.binding_query(binding, range, window);
        let points = self.repository.query_series(&query).await?;
        Ok(points
            .into_iter()
            .map(|p| SamplePoint::new(p.time, binding.unit.to_watts(p.value)))
            .collect())
    }

    /// Power drawn from the grid, in watts.
    pub async fn grid_import(
        &self,
        range: &TimeRange,
        window: Option<WindowAggregate>,
    ) -> Result<Vec<SamplePoint>> {
        self.binding_series(&self.settings.grid_import, range, window)
            .await
    }

    /// Local production, in watts.
    pub async fn production(
        &self,
        range: &TimeRange,
        window: Option<WindowAggregate>,
    ) -> Result<Vec<SamplePoint>> {
        self.binding_series(&self.settings.production, range, window)
            .await
    }

    /// Grid import minus production, joined on timestamp.
    ///
    /// Only instants present in both series are kept, so the result carries a
    /// subset of the grid-import timestamps in their original order.
    pub async fn net_consumption(
        &self,
        range: &TimeRange,
        window: Option<WindowAggregate>,
    ) -> Result<Vec<NetSample>> {
        let (grid, production) = try_join!(
            self.grid_import(range, window),
            self.production(range, window)
        )?;
        Ok(join_net(&grid, &production))
    }

    /// One power series per reporting device.
    pub async fn consumption_by_device(
        &self,
        range: &TimeRange,
        window: Option<WindowAggregate>,
    ) -> Result<Vec<TaggedSeries>> {
        let mut query = SeriesQuery::new(
            &self.settings.measurement,
            &self.settings.device_field,
            *range,
        )
        .group_by_tag(&self.settings.device_tag);
        if let Some(window) = window {
            query = query.with_window(window);
        }
        Ok(self.repository.query_series_grouped(&query).await?)
    }

    /// Devices that reported within the range.
    pub async fn meters(&self, range: &TimeRange) -> Result<Vec<String>> {
        Ok(self
            .repository
            .tag_values(&self.settings.measurement, &self.settings.device_tag, range)
            .await?)
    }

    /// Latest readings over the last five minutes.
    pub async fn current(&self) -> Result<CurrentPower> {
        let range = TimeRange::last(TimeDelta::minutes(5));
        let grid_query = self
            .binding_query(&self.settings.grid_import, &range, None)
            .with_reduce(Reducer::Last);
        let production_query = self
            .binding_query(&self.settings.production, &range, None)
            .with_reduce(Reducer::Last);
        let device_query = SeriesQuery::new(
            &self.settings.measurement,
            &self.settings.device_field,
            range,
        )
        .with_reduce(Reducer::Last)
        .group_by_tag(&self.settings.device_tag);

        let (grid, production, device_series) = try_join!(
            self.repository.query_series(&grid_query),
            self.repository.query_series(&production_query),
            self.repository.query_series_grouped(&device_query),
        )?;

        let grid_import = grid
            .last()
            .map(|p| self.settings.grid_import.unit.to_watts(p.value))
            .unwrap_or(0.0);
        let production = production
            .last()
            .map(|p| self.settings.production.unit.to_watts(p.value))
            .unwrap_or(0.0);
        let devices = device_series
            .iter()
            .filter_map(|series| {
                let name = series.tag(&self.settings.device_tag)?;
                Some((name.to_string(), series.last_value()?))
            })
            .collect();

        Ok(CurrentPower {
            grid_import,
            production,
            net_consumption: grid_import - production,
            devices,
        })
    }
}

/// Equality join of grid import and production on timestamp.
pub fn join_net(grid: &[SamplePoint], production: &[SamplePoint]) -> Vec<NetSample> {
    let produced: HashMap<DateTime<Utc>, f64> =
        production.iter().map(|p| (p.time, p.value)).collect();
    grid.iter()
        .filter_map(|g| {
            produced
                .get(&g.time)
                .map(|p| NetSample::new(g.time, g.value - p))
        })
        .collect()
}
