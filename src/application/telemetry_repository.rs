// Repository trait for telemetry data access
use async_trait::async_trait;

use crate::domain::query::{SeriesQuery, TimeRange};
use crate::domain::sample::{SamplePoint, TaggedSeries};

#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Run a query and flatten every result series into one time-ordered sequence
    async fn query_series(&self, query: &SeriesQuery) -> anyhow::Result<Vec<SamplePoint>>;

    /// Run a query keeping one series per distinct tag set
    async fn query_series_grouped(&self, query: &SeriesQuery) -> anyhow::Result<Vec<TaggedSeries>>;

    /// Distinct values of a tag key within a time range (device discovery)
    async fn tag_values(
        &self,
        measurement: &str,
        tag_key: &str,
        range: &TimeRange,
    ) -> anyhow::Result<Vec<String>>;
}
