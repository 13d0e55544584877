// Day-ahead market price domain models
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// One day-ahead market price sample, in EUR per MWh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub time: DateTime<Utc>,
    pub eur_per_mwh: f64,
}

impl PricePoint {
    pub fn new(time: DateTime<Utc>, eur_per_mwh: f64) -> Self {
        Self { time, eur_per_mwh }
    }
}

/// Price samples plus the tolerance for matching them to telemetry timestamps.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
    tolerance: TimeDelta,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>, tolerance: TimeDelta) -> Self {
        Self { points, tolerance }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn latest(&self) -> Option<PricePoint> {
        self.points.last().copied()
    }

    /// Nearest price to `time`, accepted only when within the tolerance.
    pub fn price_at(&self, time: DateTime<Utc>) -> Option<f64> {
        let mut best: Option<(TimeDelta, f64)> = None;
        for point in &self.points {
            let distance = (point.time - time).abs();
            if distance > self.tolerance {
                continue;
            }
            match best {
                Some((closest, _)) if distance >= closest => {}
                _ => best = Some((distance, point.eur_per_mwh)),
            }
        }
        best.map(|(_, price)| price)
    }
}
