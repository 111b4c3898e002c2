#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use mq_agg::MetricStats;
use mq_record::Dataset;
use mq_types::{MetricValue, PipelineConfig, valid_count, valid_mean, valid_sum};
use serde::{Deserialize, Serialize};

/// One named ratio in [0,1], keeping its raw counts for auditability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub name: String,
    pub numerator: u64,
    pub denominator: u64,
    pub value: f64,
}

impl Insight {
    #[must_use]
    pub fn new(name: impl Into<String>, numerator: u64, denominator: u64) -> Self {
        Self {
            name: name.into(),
            numerator,
            denominator,
            value: ratio(numerator, denominator),
        }
    }
}

/// Plain ratio with the zero-denominator sentinel: an empty slice yields
/// 0.0, never a division fault. Formatting as a percentage is the
/// presentation layer's business.
#[must_use]
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Fraction of valid-metric records at or above the threshold, over
/// valid-metric records. Invalid and missing cells count in neither side.
#[must_use]
pub fn share_exceeding(dataset: &Dataset, metric: &str, threshold: f64) -> Insight {
    let mut hits = 0u64;
    let mut eligible = 0u64;
    for record in dataset.records() {
        if let Some(value) = record.metric(metric).as_valid() {
            eligible += 1;
            if value >= threshold {
                hits += 1;
            }
        }
    }
    Insight::new(format!("{metric}_at_or_above_threshold"), hits, eligible)
}

/// Fraction of dated records whose release month falls in the given set,
/// over dated records. Dateless rows count in neither side.
#[must_use]
pub fn seasonal_share(dataset: &Dataset, months: &BTreeSet<u32>) -> Insight {
    let mut hits = 0u64;
    let mut dated = 0u64;
    for record in dataset.records() {
        if let Some(month) = record.month() {
            dated += 1;
            if months.contains(&month) {
                hits += 1;
            }
        }
    }
    Insight::new("seasonal_release_share", hits, dated)
}

/// Number of distinct category labels present across the dataset.
#[must_use]
pub fn distinct_categories(dataset: &Dataset) -> u64 {
    let mut seen = BTreeSet::new();
    for record in dataset.records() {
        for category in &record.categories {
            seen.insert(category.as_str());
        }
    }
    seen.len() as u64
}

/// Whole-dataset descriptive summary for a chosen metric list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub source: String,
    pub records: u64,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub metrics: BTreeMap<String, MetricStats>,
}

#[must_use]
pub fn summarize(dataset: &Dataset, metrics: &[&str]) -> DatasetSummary {
    let mut summary = DatasetSummary {
        source: dataset.source().to_owned(),
        records: dataset.len() as u64,
        year_min: dataset.records().iter().map(|r| r.year).min(),
        year_max: dataset.records().iter().map(|r| r.year).max(),
        metrics: BTreeMap::new(),
    };

    for name in metrics {
        let values: Vec<MetricValue> = dataset
            .records()
            .iter()
            .map(|record| record.metric(name))
            .collect();
        summary.metrics.insert(
            (*name).to_owned(),
            MetricStats {
                sum: valid_sum(&values),
                mean: valid_mean(&values),
                count: valid_count(&values),
            },
        );
    }

    summary
}

/// The cross-dataset insight report: domestic blockbuster rate, seasonal
/// release share, global high-rating share, language diversity, and both
/// dataset summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReport {
    pub blockbuster_rate: Insight,
    pub seasonal_release_share: Insight,
    pub high_rating_share: Insight,
    pub distinct_languages: u64,
    pub domestic: DatasetSummary,
    pub global: DatasetSummary,
}

#[must_use]
pub fn cross_report(domestic: &Dataset, global: &Dataset, config: &PipelineConfig) -> CrossReport {
    CrossReport {
        blockbuster_rate: share_exceeding(
            domestic,
            "audience_total",
            config.blockbuster_audience,
        ),
        seasonal_release_share: seasonal_share(domestic, &config.season_months),
        high_rating_share: share_exceeding(global, "rating", config.high_rating),
        distinct_languages: distinct_categories(global),
        domestic: summarize(
            domestic,
            &["audience", "audience_total", "sales", "screens"],
        ),
        global: summarize(global, &["rating", "votes", "popularity"]),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::NaiveDate;
    use mq_record::{CleanRecord, Dataset};
    use mq_types::{InvalidKind, MetricValue, PipelineConfig};

    use super::{
        cross_report, distinct_categories, ratio, seasonal_share, share_exceeding, summarize,
    };

    fn record(title: &str, metric: &str, value: MetricValue) -> CleanRecord {
        CleanRecord {
            title: title.to_owned(),
            date: None,
            year: 2023,
            metrics: BTreeMap::from([(metric.to_owned(), value)]),
            categories: Vec::new(),
        }
    }

    #[test]
    fn ratio_zero_denominator_is_the_sentinel() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(5, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }

    #[test]
    fn share_exceeding_threshold_is_inclusive() {
        let dataset = Dataset::new(
            "global",
            vec![
                record("A", "rating", MetricValue::Valid(8.0)),
                record("B", "rating", MetricValue::Valid(7.9)),
                record("C", "rating", MetricValue::Valid(9.1)),
            ],
        );
        let insight = share_exceeding(&dataset, "rating", 8.0);
        assert_eq!(insight.numerator, 2);
        assert_eq!(insight.denominator, 3);
        assert_eq!(insight.value, 2.0 / 3.0);
    }

    #[test]
    fn share_exceeding_ignores_invalid_rows_on_both_sides() {
        let dataset = Dataset::new(
            "global",
            vec![
                record("A", "rating", MetricValue::Valid(9.0)),
                record("B", "rating", MetricValue::Invalid(InvalidKind::OutOfRange)),
                record("C", "rating", MetricValue::Missing),
            ],
        );
        let insight = share_exceeding(&dataset, "rating", 8.0);
        assert_eq!(insight.numerator, 1);
        assert_eq!(insight.denominator, 1);
        assert_eq!(insight.value, 1.0);
    }

    #[test]
    fn seasonal_share_uses_dated_rows_as_denominator() {
        let mut july = record("July", "audience", MetricValue::Valid(1.0));
        july.date = NaiveDate::from_ymd_opt(2023, 7, 12);
        let mut march = record("March", "audience", MetricValue::Valid(1.0));
        march.date = NaiveDate::from_ymd_opt(2023, 3, 2);
        let dateless = record("Dateless", "audience", MetricValue::Valid(1.0));

        let dataset = Dataset::new("domestic", vec![july, march, dateless]);
        let insight = seasonal_share(&dataset, &BTreeSet::from([6, 7, 8]));
        assert_eq!(insight.numerator, 1);
        assert_eq!(insight.denominator, 2);
        assert_eq!(insight.value, 0.5);
    }

    #[test]
    fn seasonal_share_of_dateless_dataset_is_sentinel_zero() {
        let dataset = Dataset::new(
            "domestic",
            vec![record("A", "audience", MetricValue::Valid(1.0))],
        );
        let insight = seasonal_share(&dataset, &BTreeSet::from([6, 7, 8]));
        assert_eq!(insight.denominator, 0);
        assert_eq!(insight.value, 0.0);
    }

    #[test]
    fn distinct_categories_counts_labels_once() {
        let mut a = record("A", "rating", MetricValue::Valid(1.0));
        a.categories = vec!["en".to_owned()];
        let mut b = record("B", "rating", MetricValue::Valid(1.0));
        b.categories = vec!["ko".to_owned()];
        let mut c = record("C", "rating", MetricValue::Valid(1.0));
        c.categories = vec!["en".to_owned()];

        let dataset = Dataset::new("global", vec![a, b, c]);
        assert_eq!(distinct_categories(&dataset), 2);
    }

    #[test]
    fn summarize_reports_span_and_valid_only_stats() {
        let mut early = record("Early", "rating", MetricValue::Valid(6.0));
        early.year = 2022;
        let late = record("Late", "rating", MetricValue::Valid(8.0));
        let broken = record("Broken", "rating", MetricValue::Invalid(InvalidKind::OutOfRange));

        let dataset = Dataset::new("global", vec![early, late, broken]);
        let summary = summarize(&dataset, &["rating"]);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.year_min, Some(2022));
        assert_eq!(summary.year_max, Some(2023));

        let rating = summary.metrics.get("rating").expect("rating stats");
        assert_eq!(rating.sum, 14.0);
        assert_eq!(rating.mean, Some(7.0));
        assert_eq!(rating.count, 2);
    }

    #[test]
    fn summarize_empty_dataset_has_no_span_and_undefined_means() {
        let dataset = Dataset::new("global", Vec::new());
        let summary = summarize(&dataset, &["rating"]);
        assert_eq!(summary.records, 0);
        assert_eq!(summary.year_min, None);
        let rating = summary.metrics.get("rating").expect("rating stats");
        assert_eq!(rating.sum, 0.0);
        assert_eq!(rating.mean, None);
    }

    #[test]
    fn cross_report_assembles_all_insights() {
        let mut blockbuster = record(
            "Blockbuster",
            "audience_total",
            MetricValue::Valid(12_000_000.0),
        );
        blockbuster.date = NaiveDate::from_ymd_opt(2023, 7, 26);
        let mut modest = record("Modest", "audience_total", MetricValue::Valid(400_000.0));
        modest.date = NaiveDate::from_ymd_opt(2023, 1, 4);
        let domestic = Dataset::new("domestic", vec![blockbuster, modest]);

        let mut hit = record("Hit", "rating", MetricValue::Valid(8.4));
        hit.categories = vec!["en".to_owned()];
        let mut miss = record("Miss", "rating", MetricValue::Valid(6.1));
        miss.categories = vec!["ko".to_owned()];
        let global = Dataset::new("global", vec![hit, miss]);

        let report = cross_report(&domestic, &global, &PipelineConfig::default());
        assert_eq!(report.blockbuster_rate.value, 0.5);
        assert_eq!(report.seasonal_release_share.value, 0.5);
        assert_eq!(report.high_rating_share.value, 0.5);
        assert_eq!(report.distinct_languages, 2);
        assert_eq!(report.domestic.records, 2);
        assert_eq!(report.global.records, 2);
    }
}
