// Telemetry sample domain models
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplePoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl SamplePoint {
    pub fn new(time: DateTime<Utc>, value: f64) -> Self {
        Self { time, value }
    }
}

/// One result series per distinct tag set, as returned by grouped queries.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedSeries {
    pub tags: BTreeMap<String, String>,
    pub points: Vec<SamplePoint>,
}

impl TaggedSeries {
    pub fn new(tags: BTreeMap<String, String>, points: Vec<SamplePoint>) -> Self {
        Self { tags, points }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }
}

/// Grid import minus local production at one aligned timestamp, in watts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetSample {
    pub time: DateTime<Utc>,
    pub watts: f64,
}

impl NetSample {
    pub fn new(time: DateTime<Utc>, watts: f64) -> Self {
        Self { time, watts }
    }
}

/// Unit a meter reports power in. Everything downstream works in watts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerUnit {
    #[default]
    Watts,
    Kilowatts,
}

impl PowerUnit {
    pub fn to_watts(self, value: f64) -> f64 {
        match self {
            PowerUnit::Watts => value,
            PowerUnit::Kilowatts => value * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kilowatt_values_scale_to_watts() {
        assert_eq!(PowerUnit::Kilowatts.to_watts(1.234), 1234.0);
        assert_eq!(PowerUnit::Watts.to_watts(1234.0), 1234.0);
    }

    #[test]
    fn tagged_series_exposes_tags_and_last_value() {
        let mut tags = BTreeMap::new();
        tags.insert("device".to_string(), "pv-inverter".to_string());
        let series = TaggedSeries::new(
            tags,
            vec![
                SamplePoint::new(Utc::now(), 120.0),
                SamplePoint::new(Utc::now(), 340.0),
            ],
        );
        assert_eq!(series.tag("device"), Some("pv-inverter"));
        assert_eq!(series.tag("missing"), None);
        assert_eq!(series.last_value(), Some(340.0));
    }
}
