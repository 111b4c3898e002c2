#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a metric value was rejected during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidKind {
    OutOfRange,
    Unparseable,
}

/// One metric cell with explicit validity.
///
/// `Invalid` and `Missing` are both skipped by every reduction; they stay
/// distinct so the cleaning report can tell data-quality violations apart
/// from fields that were simply absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Valid(f64),
    Invalid(InvalidKind),
    Missing,
}

impl MetricValue {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    #[must_use]
    pub fn as_valid(&self) -> Option<f64> {
        match self {
            Self::Valid(v) => Some(*v),
            Self::Invalid(_) | Self::Missing => None,
        }
    }
}

/// Declared valid range for a metric column. `max` of `None` means
/// unbounded above.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: Option<f64>,
}

impl MetricRange {
    #[must_use]
    pub const fn non_negative() -> Self {
        Self {
            min: 0.0,
            max: None,
        }
    }

    #[must_use]
    pub const fn bounded(min: f64, max: f64) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    /// Classify a parsed number against the range. Non-finite input is
    /// unparseable, not out-of-range.
    #[must_use]
    pub fn check(&self, value: f64) -> MetricValue {
        if !value.is_finite() {
            return MetricValue::Invalid(InvalidKind::Unparseable);
        }
        if value < self.min {
            return MetricValue::Invalid(InvalidKind::OutOfRange);
        }
        if let Some(max) = self.max {
            if value > max {
                return MetricValue::Invalid(InvalidKind::OutOfRange);
            }
        }
        MetricValue::Valid(value)
    }
}

/// Key for every grouped view: a calendar dimension (year, month) or a
/// category label (genre, language).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GroupKey {
    Int64(i64),
    Label(String),
}

impl From<i64> for GroupKey {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<i32> for GroupKey {
    fn from(value: i32) -> Self {
        Self::Int64(i64::from(value))
    }
}

impl From<&str> for GroupKey {
    fn from(value: &str) -> Self {
        Self::Label(value.to_owned())
    }
}

impl From<String> for GroupKey {
    fn from(value: String) -> Self {
        Self::Label(value)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Label(v) => write!(f, "{v}"),
        }
    }
}

// ── Validity-skipping reductions ───────────────────────────────────────

fn collect_valid<'a, I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a MetricValue>,
{
    values
        .into_iter()
        .filter_map(MetricValue::as_valid)
        .collect()
}

/// Sum of valid contributions; 0.0 when there are none (sum identity).
pub fn valid_sum<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a MetricValue>,
{
    values.into_iter().filter_map(MetricValue::as_valid).sum()
}

/// Mean over valid contributions only. `None` when there are none; the
/// undefined sentinel is never coerced to 0.
pub fn valid_mean<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a MetricValue>,
{
    let nums = collect_valid(values);
    if nums.is_empty() {
        return None;
    }
    let sum: f64 = nums.iter().sum();
    Some(sum / nums.len() as f64)
}

pub fn valid_count<'a, I>(values: I) -> u64
where
    I: IntoIterator<Item = &'a MetricValue>,
{
    values.into_iter().filter(|v| v.is_valid()).count() as u64
}

pub fn valid_min<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a MetricValue>,
{
    let nums = collect_valid(values);
    if nums.is_empty() {
        return None;
    }
    Some(nums.iter().copied().fold(f64::INFINITY, f64::min))
}

pub fn valid_max<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a MetricValue>,
{
    let nums = collect_valid(values);
    if nums.is_empty() {
        return None;
    }
    Some(nums.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

// ── Pipeline configuration ─────────────────────────────────────────────

/// Shared configuration threaded through every pipeline stage by
/// reference. Deserializable so callers can supply it as JSON; `Default`
/// reproduces the constants of the original dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records with a derived year beyond this horizon are dropped.
    pub max_year: i32,
    /// Pre-filter: when non-empty, only these years are kept.
    pub analysis_years: BTreeSet<i32>,
    /// Delimiter of multi-valued categorical fields.
    pub category_delimiter: char,
    /// Size of ranked tables.
    pub top_n: usize,
    /// Ascending cut points for the audience distribution histogram.
    pub audience_buckets: Vec<f64>,
    /// Ascending cut points for the rating distribution histogram.
    pub rating_buckets: Vec<f64>,
    /// Cumulative-audience threshold for the blockbuster-rate insight.
    pub blockbuster_audience: f64,
    /// Rating threshold for the high-rating-share insight.
    pub high_rating: f64,
    /// Months counted as the release season (summer in the original).
    pub season_months: BTreeSet<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_year: 2024,
            analysis_years: BTreeSet::from([2022, 2023, 2024]),
            category_delimiter: ',',
            top_n: 10,
            audience_buckets: vec![0.0, 100_000.0, 1_000_000.0, 5_000_000.0, 10_000_000.0],
            rating_buckets: vec![0.0, 2.0, 4.0, 6.0, 8.0],
            blockbuster_audience: 10_000_000.0,
            high_rating: 8.0,
            season_months: BTreeSet::from([6, 7, 8]),
        }
    }
}
