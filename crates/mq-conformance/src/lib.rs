#![forbid(unsafe_code)]

//! Pipeline assembly and conformance fixtures.
//!
//! The library wires every stage into one `run_analysis` pass producing a
//! single serializable report (the structured handoff to an external
//! presentation layer) and ships small CSV corpora shaped like the two
//! real sources for the e2e and property suites.

use mq_agg::{AggregateResult, aggregate, by_category, by_month, by_year};
use mq_insight::{CrossReport, cross_report};
use mq_io::{IoError, read_csv_str};
use mq_rank::{BucketingResult, RankError, RankedRow, bucketize, top_n};
use mq_record::{CleaningReport, Dataset, SchemaError, TableSchema, normalize};
use mq_types::PipelineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Rank(#[from] RankError),
}

/// Every structured output of one full pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub domestic_cleaning: CleaningReport,
    pub global_cleaning: CleaningReport,
    /// Domestic Top-N by cumulative audience.
    pub top_audience: Vec<RankedRow>,
    /// Global Top-N by rating and by popularity.
    pub top_rated: Vec<RankedRow>,
    pub top_popular: Vec<RankedRow>,
    pub audience_distribution: BucketingResult,
    pub rating_distribution: BucketingResult,
    /// Genre-level audience/sales aggregates (full-value fan-out).
    pub genre_totals: AggregateResult,
    /// Language-level rating/popularity aggregates.
    pub language_totals: AggregateResult,
    pub yearly_audience: AggregateResult,
    pub monthly_releases: AggregateResult,
    pub insights: CrossReport,
}

/// Load both sources and run every derived view.
pub fn run_analysis(
    domestic_csv: &str,
    global_csv: &str,
    config: &PipelineConfig,
) -> Result<AnalysisReport, AnalysisError> {
    let domestic_raw = read_csv_str("domestic", domestic_csv)?;
    let global_raw = read_csv_str("global", global_csv)?;

    let (domestic, domestic_cleaning) =
        normalize(&domestic_raw, &TableSchema::domestic(), config)?;
    let (global, global_cleaning) =
        normalize(&global_raw, &TableSchema::global_catalog(), config)?;

    Ok(AnalysisReport {
        top_audience: ranked_rows(&domestic, "audience_total", config.top_n),
        top_rated: ranked_rows(&global, "rating", config.top_n),
        top_popular: ranked_rows(&global, "popularity", config.top_n),
        audience_distribution: bucketize(&domestic, "audience_total", &config.audience_buckets)?,
        rating_distribution: bucketize(&global, "rating", &config.rating_buckets)?,
        genre_totals: aggregate(by_category(&domestic), &["audience", "sales"]),
        language_totals: aggregate(by_category(&global), &["rating", "popularity"]),
        yearly_audience: aggregate(by_year(&domestic), &["audience"]),
        monthly_releases: aggregate(by_month(&domestic), &[]),
        insights: cross_report(&domestic, &global, config),
        domestic_cleaning,
        global_cleaning,
    })
}

fn ranked_rows(dataset: &Dataset, metric: &str, n: usize) -> Vec<RankedRow> {
    top_n(dataset, metric, n)
        .iter()
        .map(mq_rank::RankedEntry::to_row)
        .collect()
}

// ── Fixture corpora ────────────────────────────────────────────────────

/// Domestic weekly series fixture: well-formed rows across 2022–2024 plus
/// one of each dirty case (blank title, bad date, negative metric, future
/// year, empty genre field).
#[must_use]
pub fn domestic_fixture_csv() -> &'static str {
    "\
title,open_date,year,audience,audience_total,sales,screens,genres\n\
The Roundup,2022-05-18,2022,1250000,12690000,130400000000,2300,\"Action,Crime\"\n\
Decision to Leave,2022-06-29,2022,210000,1890000,19300000000,1400,\"Drama, Mystery\"\n\
The Night Owl,2022-11-23,2022,180000,3220000,33500000000,1100,\"Drama,Thriller\"\n\
12.12: The Day,2023-11-22,2023,1310000,13120000,127800000000,2400,\"Drama,History\"\n\
Smugglers,2023-07-26,2023,514000,5140000,49600000000,2000,\"Crime, Action\"\n\
Concrete Utopia,2023/08/09,2023,384000,3840000,37900000000,1900,\"Drama,Disaster\"\n\
Exhuma,2024-02-22,2024,1191000,11910000,114800000000,2400,\"Mystery,Horror\"\n\
The Roundup: Punishment,2024-04-24,2024,1150000,11500000,111300000000,2500,\"Action,Crime\"\n\
Wonderland,opening-soon,2024,62000,620000,6100000000,1300,\"Drama,Fantasy\"\n\
,2024-01-10,2024,9000,90000,880000000,300,Drama\n\
Glitch Reel,2024-03-06,2024,-500,45000,420000000,200,Drama\n\
Festival Cut,2024-10-02,2024,15000,150000,1400000000,150,\n\
Far Future,2031-05-01,2031,1000,10000,90000000,50,Sci-Fi\n\
"
}

/// Global catalog fixture with one out-of-range rating and one dateless
/// row.
#[must_use]
pub fn global_fixture_csv() -> &'static str {
    "\
title,release_date,year,rating,votes,popularity,language\n\
Top Gun: Maverick,2022-05-27,2022,8.2,9200,701.5,en\n\
RRR,2022-03-24,2022,7.9,4900,120.3,te\n\
Everything Everywhere All at Once,2022-03-25,2022,7.8,6800,95.8,en\n\
Oppenheimer,2023-07-21,2023,8.1,28000,312.4,en\n\
Spider-Man: Across the Spider-Verse,2023-06-02,2023,8.4,7100,410.2,en\n\
Suzume,2023-04-14,2023,7.7,3200,88.9,ja\n\
Dune: Part Two,2024-03-01,2024,8.2,11000,520.7,en\n\
Godzilla Minus One,,2024,7.9,2800,77.2,ja\n\
Broken Meter,2024-02-09,2024,11.6,150,9.9,en\n\
"
}

/// Run the fixture corpora through the full pipeline.
pub fn run_fixture_analysis(config: &PipelineConfig) -> Result<AnalysisReport, AnalysisError> {
    run_analysis(domestic_fixture_csv(), global_fixture_csv(), config)
}
