// InfluxDB repository implementation
//
// Renders typed series queries into InfluxQL and runs them against the v1
// compatibility /query endpoint.
use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Deserialize;

use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::query::{check_identifier, RangeBound, SeriesQuery, TimeRange};
use crate::domain::sample::{SamplePoint, TaggedSeries};
use crate::infrastructure::config::InfluxSettings;

#[derive(Debug, Clone)]
pub struct InfluxRepository {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    #[allow(dead_code)]
    name: String,
    columns: Vec<String>,
    values: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    tags: Option<BTreeMap<String, String>>,
}

impl InfluxRepository {
    pub fn new(settings: &InfluxSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build the InfluxDB HTTP client")?;
        Ok(Self {
            client,
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            database: settings.database.clone(),
            retention_policy: settings.retention_policy.clone(),
        })
    }

    fn build_query_url(&self, query: &str) -> String {
        let encoded_query = urlencoding::encode(query);
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host, self.database, self.retention_policy, encoded_query
        )
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        let url = self.build_query_url(query);
        tracing::debug!("Executing InfluxQL query: {}", query);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        // Check for errors in the response
        if let Some(result) = data.results.first() {
            if let Some(error) = &result.error {
                anyhow::bail!("InfluxDB query error: {}", error);
            }
        }

        Ok(data)
    }
}

#[async_trait]
impl TelemetryRepository for InfluxRepository {
    async fn query_series(&self, query: &SeriesQuery) -> Result<Vec<SamplePoint>> {
        query.validate()?;
        let response = self.execute_query(&render_select(query)).await?;

        let mut points: Vec<SamplePoint> = parse_series(&response, value_column(query))
            .into_iter()
            .flat_map(|series| series.points)
            .collect();
        points.sort_by_key(|point| point.time);
        Ok(points)
    }

    async fn query_series_grouped(&self, query: &SeriesQuery) -> Result<Vec<TaggedSeries>> {
        query.validate()?;
        let response = self.execute_query(&render_select(query)).await?;
        Ok(parse_series(&response, value_column(query)))
    }

    async fn tag_values(
        &self,
        measurement: &str,
        tag_key: &str,
        range: &TimeRange,
    ) -> Result<Vec<String>> {
        check_identifier("measurement", measurement)?;
        check_identifier("tag key", tag_key)?;
        let query = render_tag_discovery(measurement, tag_key, range);
        let response = self.execute_query(&query).await?;

        // SHOW TAG VALUES cannot be scoped to a time range, so we select a
        // field grouped by the tag instead. The tag values come back on the
        // series, not in the rows.
        let mut values = Vec::new();
        if let Some(result) = response.results.first() {
            if let Some(series_list) = &result.series {
                for series in series_list {
                    if let Some(value) = series.tags.as_ref().and_then(|tags| tags.get(tag_key)) {
                        if !value.is_empty() {
                            values.push(value.clone());
                        }
                    }
                }
            }
        }
        values.sort();
        values.dedup();
        Ok(values)
    }
}

/// Column the requested value lands in: the aggregator name for reduced
/// queries, the field name for raw ones.
fn value_column(query: &SeriesQuery) -> &str {
    if let Some(window) = &query.window {
        window.reducer.name()
    } else if let Some(reducer) = query.reduce {
        reducer.name()
    } else {
        &query.field
    }
}

fn render_select(query: &SeriesQuery) -> String {
    let selection = if let Some(window) = &query.window {
        format!("{}(\"{}\")", window.reducer.name(), query.field)
    } else if let Some(reducer) = query.reduce {
        format!("{}(\"{}\")", reducer.name(), query.field)
    } else {
        format!("\"{}\"", query.field)
    };

    let mut sql = format!(
        "SELECT {} FROM \"{}\" WHERE {}",
        selection,
        query.measurement,
        render_time_clause(&query.range)
    );
    for (key, value) in &query.tag_filters {
        sql.push_str(&format!(" AND \"{}\" = '{}'", key, value));
    }

    let mut groups = Vec::new();
    if let Some(window) = &query.window {
        groups.push(format!("time({})", format_duration(window.every)));
    }
    for tag in &query.group_by {
        groups.push(format!("\"{}\"", tag));
    }
    if !groups.is_empty() {
        sql.push_str(&format!(" GROUP BY {}", groups.join(", ")));
    }
    if query.window.is_some() {
        sql.push_str(" fill(none)");
    }
    sql
}

fn render_tag_discovery(measurement: &str, tag_key: &str, range: &TimeRange) -> String {
    format!(
        "SELECT last(*) FROM \"{}\" WHERE {} GROUP BY \"{}\"",
        measurement,
        render_time_clause(range),
        tag_key
    )
}

fn render_time_clause(range: &TimeRange) -> String {
    let mut clause = format!("time >= {}", render_bound(&range.start));
    // A stop at "now" is the store's implicit upper bound.
    if range.stop != RangeBound::Now {
        clause.push_str(&format!(" AND time <= {}", render_bound(&range.stop)));
    }
    clause
}

fn render_bound(bound: &RangeBound) -> String {
    match bound {
        RangeBound::Now => "now()".to_string(),
        RangeBound::Relative(delta) if *delta < TimeDelta::zero() => {
            format!("now() - {}", format_duration(-*delta))
        }
        RangeBound::Relative(delta) => format!("now() + {}", format_duration(*delta)),
        RangeBound::Absolute(time) => {
            format!("'{}'", time.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
    }
}

/// Largest whole unit InfluxQL understands, e.g. 900s becomes `15m`.
fn format_duration(delta: TimeDelta) -> String {
    let seconds = delta.num_seconds();
    for (unit, size) in [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60)] {
        if seconds != 0 && seconds % size == 0 {
            return format!("{}{}", seconds / size, unit);
        }
    }
    format!("{}s", seconds)
}

fn parse_series(response: &InfluxQLResponse, value_column: &str) -> Vec<TaggedSeries> {
    let mut out = Vec::new();
    let Some(result) = response.results.first() else {
        return out;
    };
    let Some(series_list) = &result.series else {
        return out;
    };

    for series in series_list {
        let time_idx = series
            .columns
            .iter()
            .position(|c| c == "time")
            .unwrap_or(0);
        let value_idx = series
            .columns
            .iter()
            .position(|c| c == value_column)
            .unwrap_or(1);

        let mut points = Vec::new();
        for row in &series.values {
            let time = row
                .get(time_idx)
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
            let value = row.get(value_idx).and_then(|v| v.as_f64());
            // Rows with null values show up in raw (unfilled) results.
            if let (Some(time), Some(value)) = (time, value) {
                points.push(SamplePoint::new(time.with_timezone(&Utc), value));
            }
        }
        points.sort_by_key(|point| point.time);

        out.push(TaggedSeries::new(
            series.tags.clone().unwrap_or_default(),
            points,
        ));
    }
    out
}
