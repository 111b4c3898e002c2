#![forbid(unsafe_code)]

use std::cmp::Ordering;

use mq_record::{CleanRecord, Dataset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RankError {
    #[error("bucket boundaries must be non-empty and strictly ascending")]
    BadBoundaries,
}

/// One ranked row, borrowing its record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedEntry<'a> {
    /// 1-based position.
    pub rank: usize,
    pub record: &'a CleanRecord,
    pub value: f64,
}

impl RankedEntry<'_> {
    /// Owned, serializable projection for the presentation boundary.
    #[must_use]
    pub fn to_row(&self) -> RankedRow {
        RankedRow {
            rank: self.rank,
            title: self.record.title.clone(),
            year: self.record.year,
            value: self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub rank: usize,
    pub title: String,
    pub year: i32,
    pub value: f64,
}

/// The N highest records by one metric, descending.
///
/// The sort is stable, so ties keep their original dataset order and the
/// ranking of equal values is reproducible run to run. Records whose
/// metric is invalid or missing are excluded entirely, not ranked last.
/// Result length is min(n, eligible records).
#[must_use]
pub fn top_n<'a>(dataset: &'a Dataset, metric: &str, n: usize) -> Vec<RankedEntry<'a>> {
    let mut eligible: Vec<(&CleanRecord, f64)> = dataset
        .records()
        .iter()
        .filter_map(|record| record.metric(metric).as_valid().map(|value| (record, value)))
        .collect();

    // Valid values are finite, so partial_cmp cannot fail; Equal keeps the
    // stable order regardless.
    eligible.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    eligible
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(idx, (record, value))| RankedEntry {
            rank: idx + 1,
            record,
            value,
        })
        .collect()
}

// ── Bucketing ──────────────────────────────────────────────────────────

/// One histogram interval. `high` of `None` marks the unbounded top
/// bucket opened by the last cut point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub label: String,
    pub low: f64,
    pub high: Option<f64>,
}

impl Bucket {
    /// Membership: `low ≤ x < high`, or `low ≤ x` for the top bucket.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && self.high.is_none_or(|high| value < high)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketCount {
    pub bucket: Bucket,
    pub count: u64,
}

/// Histogram over one metric. Coverage law: the bucket counts plus
/// `excluded` plus `out_of_range` always add up to the dataset's row
/// count; nothing is silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketingResult {
    buckets: Vec<BucketCount>,
    /// Rows whose metric was invalid or missing.
    excluded: u64,
    /// Rows with a valid metric below the first cut point.
    out_of_range: u64,
}

impl BucketingResult {
    #[must_use]
    pub fn buckets(&self) -> &[BucketCount] {
        &self.buckets
    }

    #[must_use]
    pub fn count(&self, label: &str) -> Option<u64> {
        self.buckets
            .iter()
            .find(|entry| entry.bucket.label == label)
            .map(|entry| entry.count)
    }

    #[must_use]
    pub fn excluded(&self) -> u64 {
        self.excluded
    }

    #[must_use]
    pub fn out_of_range(&self) -> u64 {
        self.out_of_range
    }

    #[must_use]
    pub fn total_counted(&self) -> u64 {
        self.buckets.iter().map(|entry| entry.count).sum()
    }
}

fn build_buckets(boundaries: &[f64]) -> Result<Vec<Bucket>, RankError> {
    if boundaries.is_empty()
        || boundaries.iter().any(|cut| !cut.is_finite())
        || boundaries.windows(2).any(|pair| pair[0] >= pair[1])
    {
        return Err(RankError::BadBoundaries);
    }

    let mut buckets = Vec::with_capacity(boundaries.len());
    for pair in boundaries.windows(2) {
        buckets.push(Bucket {
            label: format!("[{},{})", pair[0], pair[1]),
            low: pair[0],
            high: Some(pair[1]),
        });
    }
    let last = boundaries[boundaries.len() - 1];
    buckets.push(Bucket {
        label: format!("[{},..]", last),
        low: last,
        high: None,
    });
    Ok(buckets)
}

/// Histogram a dataset's metric over ascending cut points.
///
/// Cut points c₀..cₖ produce buckets [c₀,c₁), …, [cₖ₋₁,cₖ), [cₖ,∞); each
/// bucket is inclusive at its own low cut. Every row lands in exactly one
/// of: a bucket, `excluded` (invalid metric), or `out_of_range` (below
/// c₀).
pub fn bucketize(
    dataset: &Dataset,
    metric: &str,
    boundaries: &[f64],
) -> Result<BucketingResult, RankError> {
    let buckets = build_buckets(boundaries)?;
    let mut counts = vec![0u64; buckets.len()];
    let mut excluded = 0u64;
    let mut out_of_range = 0u64;

    for record in dataset.records() {
        let Some(value) = record.metric(metric).as_valid() else {
            excluded += 1;
            continue;
        };
        if value < boundaries[0] {
            out_of_range += 1;
            continue;
        }
        // Last cut point whose value is ≤ x names the bucket.
        let idx = boundaries.partition_point(|cut| *cut <= value) - 1;
        counts[idx] += 1;
    }

    let buckets = buckets
        .into_iter()
        .zip(counts)
        .map(|(bucket, count)| BucketCount { bucket, count })
        .collect();

    Ok(BucketingResult {
        buckets,
        excluded,
        out_of_range,
    })
}
