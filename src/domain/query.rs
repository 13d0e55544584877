// Typed time-series query model
//
// Services describe what they need (measurement, tags, range, window) and the
// storage adapter renders that into its own query language. Queries are
// validated before dispatch so malformed input never reaches the store.
use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("invalid duration {0:?}, expected <number><s|m|h|d|w>")]
    InvalidDuration(String),
    #[error("invalid time bound {0:?}, expected now(), a signed duration or an RFC 3339 timestamp")]
    InvalidBound(String),
    #[error("query {0} must not be empty")]
    EmptyIdentifier(&'static str),
    #[error("query {0} {1:?} contains characters that are not allowed")]
    IllegalCharacter(&'static str, String),
    #[error("window length must be positive")]
    EmptyWindow,
    #[error("query cannot both window and reduce over the whole range")]
    ConflictingReduction,
    #[error("range start must precede range stop")]
    InvertedRange,
}

/// Parse a duration like `15m`, `24h` or `7d` into a [`TimeDelta`].
pub fn parse_duration(input: &str) -> Result<TimeDelta, QueryError> {
    let input = input.trim();
    let unit_at = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| QueryError::InvalidDuration(input.to_string()))?;
    let (digits, unit) = input.split_at(unit_at);
    let count: i64 = digits
        .parse()
        .map_err(|_| QueryError::InvalidDuration(input.to_string()))?;
    let delta = match unit {
        "s" => TimeDelta::try_seconds(count),
        "m" => TimeDelta::try_minutes(count),
        "h" => TimeDelta::try_hours(count),
        "d" => TimeDelta::try_days(count),
        "w" => TimeDelta::try_weeks(count),
        _ => None,
    };
    delta.ok_or_else(|| QueryError::InvalidDuration(input.to_string()))
}

/// One edge of a query time range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeBound {
    Now,
    /// Offset from the evaluation instant; negative offsets point into the past.
    Relative(TimeDelta),
    Absolute(DateTime<Utc>),
}

impl RangeBound {
    /// Parse `now()`, a signed duration (`-24h`) or an RFC 3339 timestamp.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let input = input.trim();
        if input == "now()" || input == "now" {
            return Ok(RangeBound::Now);
        }
        if let Some(rest) = input.strip_prefix('-') {
            return Ok(RangeBound::Relative(-parse_duration(rest)?));
        }
        if let Some(rest) = input.strip_prefix('+') {
            return Ok(RangeBound::Relative(parse_duration(rest)?));
        }
        DateTime::parse_from_rfc3339(input)
            .map(|t| RangeBound::Absolute(t.with_timezone(&Utc)))
            .map_err(|_| QueryError::InvalidBound(input.to_string()))
    }

    /// Seconds relative to "now", when that is known without a clock.
    fn offset_seconds(&self) -> Option<i64> {
        match self {
            RangeBound::Now => Some(0),
            RangeBound::Relative(delta) => Some(delta.num_seconds()),
            RangeBound::Absolute(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: RangeBound,
    pub stop: RangeBound,
}

impl TimeRange {
    pub fn new(start: RangeBound, stop: RangeBound) -> Self {
        Self { start, stop }
    }

    /// The trailing window ending now, e.g. `last(TimeDelta::hours(24))`.
    pub fn last(delta: TimeDelta) -> Self {
        Self {
            start: RangeBound::Relative(-delta),
            stop: RangeBound::Now,
        }
    }

    pub fn parse(start: &str, stop: &str) -> Result<Self, QueryError> {
        let range = Self::new(RangeBound::parse(start)?, RangeBound::parse(stop)?);
        range.check_order()?;
        Ok(range)
    }

    fn check_order(&self) -> Result<(), QueryError> {
        match (&self.start, &self.stop) {
            (RangeBound::Absolute(start), RangeBound::Absolute(stop)) if start >= stop => {
                Err(QueryError::InvertedRange)
            }
            _ => match (self.start.offset_seconds(), self.stop.offset_seconds()) {
                (Some(start), Some(stop)) if start >= stop => Err(QueryError::InvertedRange),
                _ => Ok(()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Max,
    Min,
    Sum,
    Last,
}

impl Reducer {
    /// Aggregator name as it appears in queries and result columns.
    pub fn name(self) -> &'static str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Max => "max",
            Reducer::Min => "min",
            Reducer::Sum => "sum",
            Reducer::Last => "last",
        }
    }
}

/// Downsampling step: reduce each `every`-sized bucket to a single value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAggregate {
    pub every: TimeDelta,
    pub reducer: Reducer,
}

impl WindowAggregate {
    pub fn new(every: TimeDelta, reducer: Reducer) -> Self {
        Self { every, reducer }
    }
}

#[derive(Debug, Clone)]
pub struct SeriesQuery {
    pub measurement: String,
    pub field: String,
    pub tag_filters: Vec<(String, String)>,
    pub range: TimeRange,
    pub window: Option<WindowAggregate>,
    /// Collapse the whole range to one value per series, e.g. `last`.
    pub reduce: Option<Reducer>,
    pub group_by: Vec<String>,
}

impl SeriesQuery {
    pub fn new(measurement: impl Into<String>, field: impl Into<String>, range: TimeRange) -> Self {
        Self {
            measurement: measurement.into(),
            field: field.into(),
            tag_filters: Vec::new(),
            range,
            window: None,
            reduce: None,
            group_by: Vec::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag_filters.push((key.into(), value.into()));
        self
    }

    pub fn with_window(mut self, window: WindowAggregate) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_reduce(mut self, reducer: Reducer) -> Self {
        self.reduce = Some(reducer);
        self
    }

    pub fn group_by_tag(mut self, key: impl Into<String>) -> Self {
        self.group_by.push(key.into());
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        check_identifier("measurement", &self.measurement)?;
        check_identifier("field", &self.field)?;
        for (key, value) in &self.tag_filters {
            check_identifier("tag key", key)?;
            check_identifier("tag value", value)?;
        }
        for key in &self.group_by {
            check_identifier("group-by tag", key)?;
        }
        if let Some(window) = &self.window {
            if window.every <= TimeDelta::zero() {
                return Err(QueryError::EmptyWindow);
            }
            if self.reduce.is_some() {
                return Err(QueryError::ConflictingReduction);
            }
        }
        self.range.check_order()
    }
}

/// Reject identifiers that could escape a quoted query fragment.
pub fn check_identifier(what: &'static str, value: &str) -> Result<(), QueryError> {
    if value.is_empty() {
        return Err(QueryError::EmptyIdentifier(what));
    }
    let illegal = value
        .chars()
        .any(|c| matches!(c, '\'' | '"' | '\\' | ';' | '\n' | '\r'));
    if illegal {
        return Err(QueryError::IllegalCharacter(what, value.to_string()));
    }
    Ok(())
}
