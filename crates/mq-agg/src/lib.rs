#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use mq_explode::explode;
use mq_record::Dataset;
use mq_types::{GroupKey, MetricValue};
use serde::{Deserialize, Serialize};

/// Per-metric statistics over one group.
///
/// `count` is the number of VALID contributions, and it is the mean's
/// denominator, never the group's row count. A group with zero valid
/// contributions reports sum 0.0 and mean `None` (serialized as null);
/// the undefined mean is never coerced to 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub sum: f64,
    pub mean: Option<f64>,
    pub count: u64,
}

/// All requested statistics for one group key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAggregate {
    /// Rows that fell into the group, valid or not.
    pub rows: u64,
    pub metrics: BTreeMap<String, MetricStats>,
}

impl GroupAggregate {
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&MetricStats> {
        self.metrics.get(name)
    }
}

/// Statistic selector for ordered views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Sum,
    Mean,
    Count,
    Rows,
}

/// Grouped aggregation output. Keyed storage is ordered (BTreeMap) so the
/// result is identical for any input ordering of the same multiset;
/// consumers wanting a ranked view sort explicitly via `sorted_by`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    groups: BTreeMap<GroupKey, GroupAggregate>,
}

impl AggregateResult {
    #[must_use]
    pub fn get(&self, key: &GroupKey) -> Option<&GroupAggregate> {
        self.groups.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &GroupAggregate)> {
        self.groups.iter()
    }

    /// Merge two results computed over disjoint shards. Commutative and
    /// associative, so sharding by group key or dataset needs no locks.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for (key, incoming) in other.groups {
            match self.groups.remove(&key) {
                None => {
                    self.groups.insert(key, incoming);
                }
                Some(existing) => {
                    self.groups.insert(key, merge_groups(existing, incoming));
                }
            }
        }
        self
    }

    /// Groups ordered descending by one statistic of one metric, stable on
    /// key order for equal values. Groups whose statistic is undefined
    /// (zero-valid mean, or an unrequested metric) sort after all defined
    /// values, in key order.
    #[must_use]
    pub fn sorted_by(&self, metric: &str, stat: Stat) -> Vec<(&GroupKey, &GroupAggregate)> {
        let mut defined = Vec::new();
        let mut undefined = Vec::new();
        for (key, group) in &self.groups {
            match stat_value(group, metric, stat) {
                Some(value) => defined.push((value, key, group)),
                None => undefined.push((key, group)),
            }
        }
        defined.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        defined
            .into_iter()
            .map(|(_, key, group)| (key, group))
            .chain(undefined)
            .collect()
    }
}

fn stat_value(group: &GroupAggregate, metric: &str, stat: Stat) -> Option<f64> {
    match stat {
        Stat::Rows => Some(group.rows as f64),
        Stat::Sum => group.metric(metric).map(|stats| stats.sum),
        Stat::Mean => group.metric(metric).and_then(|stats| stats.mean),
        Stat::Count => group.metric(metric).map(|stats| stats.count as f64),
    }
}

fn merge_groups(mut left: GroupAggregate, right: GroupAggregate) -> GroupAggregate {
    left.rows += right.rows;
    for (name, incoming) in right.metrics {
        let entry = left.metrics.entry(name).or_insert(MetricStats {
            sum: 0.0,
            mean: None,
            count: 0,
        });
        entry.sum += incoming.sum;
        entry.count += incoming.count;
        entry.mean = if entry.count == 0 {
            None
        } else {
            Some(entry.sum / entry.count as f64)
        };
    }
    left
}

#[derive(Debug, Default, Clone)]
struct Accumulator {
    rows: u64,
    // (sum, valid count) per metric, in request order.
    sums: Vec<(f64, u64)>,
}

/// Group rows by key and compute sum/mean/count for each requested metric,
/// skipping invalid and missing values.
pub fn aggregate<'a, I>(rows: I, metrics: &[&str]) -> AggregateResult
where
    I: IntoIterator<Item = (GroupKey, &'a BTreeMap<String, MetricValue>)>,
{
    let mut acc: BTreeMap<GroupKey, Accumulator> = BTreeMap::new();

    for (key, record_metrics) in rows {
        let slot = acc.entry(key).or_insert_with(|| Accumulator {
            rows: 0,
            sums: vec![(0.0, 0); metrics.len()],
        });
        slot.rows += 1;

        for (idx, name) in metrics.iter().enumerate() {
            let value = record_metrics
                .get(*name)
                .copied()
                .unwrap_or(MetricValue::Missing);
            if let Some(v) = value.as_valid() {
                slot.sums[idx].0 += v;
                slot.sums[idx].1 += 1;
            }
        }
    }

    let groups = acc
        .into_iter()
        .map(|(key, slot)| {
            let metric_stats = metrics
                .iter()
                .zip(slot.sums)
                .map(|(name, (sum, count))| {
                    let mean = if count == 0 {
                        None
                    } else {
                        Some(sum / count as f64)
                    };
                    ((*name).to_owned(), MetricStats { sum, mean, count })
                })
                .collect();
            (
                key,
                GroupAggregate {
                    rows: slot.rows,
                    metrics: metric_stats,
                },
            )
        })
        .collect();

    AggregateResult { groups }
}

// ── Record-side key builders ───────────────────────────────────────────

type KeyedRow<'a> = (GroupKey, &'a BTreeMap<String, MetricValue>);

/// One keyed row per (record, category) pair, via the explosion engine.
pub fn by_category(dataset: &Dataset) -> impl Iterator<Item = KeyedRow<'_>> {
    explode(dataset).map(|row| (GroupKey::from(row.category), &row.record.metrics))
}

/// One keyed row per record, keyed by its derived year.
pub fn by_year(dataset: &Dataset) -> impl Iterator<Item = KeyedRow<'_>> {
    dataset
        .records()
        .iter()
        .map(|record| (GroupKey::from(record.year), &record.metrics))
}

/// One keyed row per dated record, keyed by calendar month 1–12. Records
/// without a date contribute nothing.
pub fn by_month(dataset: &Dataset) -> impl Iterator<Item = KeyedRow<'_>> {
    dataset.records().iter().filter_map(|record| {
        record
            .month()
            .map(|month| (GroupKey::from(i64::from(month)), &record.metrics))
    })
}
