#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use mq_types::{InvalidKind, MetricRange, MetricValue, PipelineConfig};
use serde::{Deserialize, Serialize};
/// Structural load failure. Row-level data-quality issues never take this
/// path; they degrade into `CleaningReport` counts instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    MissingColumn { source: String, column: String },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::MissingColumn { source, column } => write!(
                f,
                "source {source} is missing required column {column}"
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

/// One raw field exactly as the loader handed it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawValue {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view of the field, parsing textual numbers on the fly.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(v) => v.trim().parse::<f64>().ok(),
            Self::Empty => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Text(v) => v.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

/// Untyped tabular snapshot: ordered headers plus rows of raw fields.
/// Immutable once constructed; the normalizer only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    source: String,
    headers: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    #[must_use]
    pub fn new(source: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<RawValue>>) -> Self {
        Self {
            source: source.into(),
            headers,
            rows,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn records(&self) -> impl Iterator<Item = RawRecord<'_>> {
        self.rows.iter().map(|row| RawRecord { table: self, row })
    }
}

/// Field-by-name view over one raw row.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    table: &'a RawTable,
    row: &'a [RawValue],
}

impl<'a> RawRecord<'a> {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'a RawValue> {
        let pos = self.table.position(name)?;
        self.row.get(pos)
    }
}

// ── Source schemas ─────────────────────────────────────────────────────

/// Semantic role of one schema column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum FieldRole {
    /// Record identity; rows without one are dropped.
    Identity,
    /// Calendar date; unparseable values become a null date, row kept.
    Date,
    /// Explicit integer year. Wins over the date when both are present.
    Year,
    /// Numeric metric with a declared valid range.
    Metric { range: MetricRange },
    /// Delimited multi-valued category labels.
    Categories,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub role: FieldRole,
    pub required: bool,
}

impl FieldSpec {
    fn new(name: &str, role: FieldRole, required: bool) -> Self {
        Self {
            name: name.to_owned(),
            role,
            required,
        }
    }
}

/// Declared shape of one tabular source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl TableSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Domestic weekly box-office series: title, open date, explicit year,
    /// audience counters, sales, screens, comma-delimited genres.
    #[must_use]
    pub fn domestic() -> Self {
        Self::new(
            "domestic",
            vec![
                FieldSpec::new("title", FieldRole::Identity, true),
                FieldSpec::new("open_date", FieldRole::Date, false),
                FieldSpec::new("year", FieldRole::Year, true),
                FieldSpec::new(
                    "audience",
                    FieldRole::Metric {
                        range: MetricRange::non_negative(),
                    },
                    true,
                ),
                FieldSpec::new(
                    "audience_total",
                    FieldRole::Metric {
                        range: MetricRange::non_negative(),
                    },
                    true,
                ),
                FieldSpec::new(
                    "sales",
                    FieldRole::Metric {
                        range: MetricRange::non_negative(),
                    },
                    true,
                ),
                FieldSpec::new(
                    "screens",
                    FieldRole::Metric {
                        range: MetricRange::non_negative(),
                    },
                    false,
                ),
                FieldSpec::new("genres", FieldRole::Categories, false),
            ],
        )
    }

    /// Global catalog: title, release date, explicit year, rating in
    /// [0,10], vote count, popularity, original language.
    #[must_use]
    pub fn global_catalog() -> Self {
        Self::new(
            "global",
            vec![
                FieldSpec::new("title", FieldRole::Identity, true),
                FieldSpec::new("release_date", FieldRole::Date, false),
                FieldSpec::new("year", FieldRole::Year, true),
                FieldSpec::new(
                    "rating",
                    FieldRole::Metric {
                        range: MetricRange::bounded(0.0, 10.0),
                    },
                    true,
                ),
                FieldSpec::new(
                    "votes",
                    FieldRole::Metric {
                        range: MetricRange::non_negative(),
                    },
                    false,
                ),
                FieldSpec::new(
                    "popularity",
                    FieldRole::Metric {
                        range: MetricRange::non_negative(),
                    },
                    false,
                ),
                FieldSpec::new("language", FieldRole::Categories, false),
            ],
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn metric_fields(&self) -> impl Iterator<Item = (&str, MetricRange)> {
        self.fields.iter().filter_map(|spec| match &spec.role {
            FieldRole::Metric { range } => Some((spec.name.as_str(), *range)),
            _ => None,
        })
    }

    fn field_of_role(&self, matcher: impl Fn(&FieldRole) -> bool) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| matcher(&spec.role))
    }
}

// ── Clean records ──────────────────────────────────────────────────────

/// Validated, typed representation of one source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub year: i32,
    pub metrics: BTreeMap<String, MetricValue>,
    /// Split, trimmed, deduplicated labels in first-seen order.
    pub categories: Vec<String>,
}

impl CleanRecord {
    /// Metric cell by name; absent fields read as `Missing`.
    #[must_use]
    pub fn metric(&self, name: &str) -> MetricValue {
        self.metrics.get(name).copied().unwrap_or(MetricValue::Missing)
    }

    #[must_use]
    pub fn month(&self) -> Option<u32> {
        self.date.map(|d| d.month())
    }
}

/// Ordered collection of clean records from one source. Read-only after
/// construction, so downstream stages may share it freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    source: String,
    records: Vec<CleanRecord>,
}

impl Dataset {
    #[must_use]
    pub fn new(source: impl Into<String>, records: Vec<CleanRecord>) -> Self {
        Self {
            source: source.into(),
            records,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn records(&self) -> &[CleanRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Counted outcome of one normalization pass. Every dropped row and every
/// invalidated metric cell lands here; nothing is silently discarded.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_in: u64,
    pub rows_kept: u64,
    pub dropped_missing_identity: u64,
    pub dropped_missing_year: u64,
    pub dropped_beyond_horizon: u64,
    pub dropped_outside_years: u64,
    /// Rows kept with a null date after a failed parse of a non-empty field.
    pub date_parse_failures: u64,
    /// Invalidated metric cells, keyed by field name.
    pub invalid_values: BTreeMap<String, u64>,
}

impl CleaningReport {
    fn note_invalid(&mut self, field: &str) {
        *self.invalid_values.entry(field.to_owned()).or_default() += 1;
    }

    #[must_use]
    pub fn rows_dropped(&self) -> u64 {
        self.dropped_missing_identity
            + self.dropped_missing_year
            + self.dropped_beyond_horizon
            + self.dropped_outside_years
    }
}

// ── Normalization ──────────────────────────────────────────────────────

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a calendar date, trying each supported format in order. Returns
/// `None` when no format matches; never panics.
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    None
}

/// Split a delimited categorical field: trim each part, drop empties,
/// deduplicate within the record preserving first-seen order.
#[must_use]
pub fn split_labels(raw: &str, delimiter: char) -> Vec<String> {
    let mut labels = Vec::new();
    for part in raw.split(delimiter) {
        let label = part.trim();
        if label.is_empty() {
            continue;
        }
        if labels.iter().any(|seen| seen == label) {
            continue;
        }
        labels.push(label.to_owned());
    }
    labels
}

/// Validate and type every raw row against the schema.
///
/// The only fatal condition is a required column missing from the header;
/// every row-level problem either drops that row or invalidates that one
/// metric cell, and is counted in the returned report. The input table is
/// never mutated.
pub fn normalize(
    table: &RawTable,
    schema: &TableSchema,
    config: &PipelineConfig,
) -> Result<(Dataset, CleaningReport), SchemaError> {
    for spec in schema.fields() {
        if spec.required && !table.has_column(&spec.name) {
            return Err(SchemaError::MissingColumn {
                source: schema.name().to_owned(),
                column: spec.name.clone(),
            });
        }
    }

    let identity = schema.field_of_role(|role| matches!(role, FieldRole::Identity));
    let date_field = schema.field_of_role(|role| matches!(role, FieldRole::Date));
    let year_field = schema.field_of_role(|role| matches!(role, FieldRole::Year));
    let categories_field = schema.field_of_role(|role| matches!(role, FieldRole::Categories));

    let mut report = CleaningReport {
        rows_in: table.len() as u64,
        ..CleaningReport::default()
    };
    let mut records = Vec::with_capacity(table.len());

    for raw in table.records() {
        let title = identity
            .and_then(|spec| raw.field(&spec.name))
            .and_then(raw_title);
        let Some(title) = title else {
            report.dropped_missing_identity += 1;
            continue;
        };

        let mut date = None;
        if let Some(spec) = date_field {
            match raw.field(&spec.name) {
                Some(RawValue::Text(text)) => {
                    date = parse_date(text);
                    if date.is_none() {
                        report.date_parse_failures += 1;
                    }
                }
                Some(RawValue::Empty) | None => {}
                Some(_) => report.date_parse_failures += 1,
            }
        }

        let explicit_year = year_field
            .and_then(|spec| raw.field(&spec.name))
            .and_then(RawValue::as_i64)
            .and_then(|y| i32::try_from(y).ok());
        let Some(year) = explicit_year.or_else(|| date.map(|d| d.year())) else {
            report.dropped_missing_year += 1;
            continue;
        };

        if year > config.max_year {
            report.dropped_beyond_horizon += 1;
            continue;
        }
        if !config.analysis_years.is_empty() && !config.analysis_years.contains(&year) {
            report.dropped_outside_years += 1;
            continue;
        }

        let mut metrics = BTreeMap::new();
        for (name, range) in schema.metric_fields() {
            let value = match raw.field(name) {
                Some(RawValue::Empty) | None => MetricValue::Missing,
                Some(raw_value) => match raw_value.as_f64() {
                    Some(number) => range.check(number),
                    None => MetricValue::Invalid(InvalidKind::Unparseable),
                },
            };
            if value.is_invalid() {
                report.note_invalid(name);
            }
            metrics.insert(name.to_owned(), value);
        }

        let categories = categories_field
            .and_then(|spec| raw.field(&spec.name))
            .and_then(RawValue::as_text)
            .map(|text| split_labels(text, config.category_delimiter))
            .unwrap_or_default();

        records.push(CleanRecord {
            title,
            date,
            year,
            metrics,
            categories,
        });
    }

    report.rows_kept = records.len() as u64;
    Ok((Dataset::new(schema.name(), records), report))
}

fn raw_title(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        RawValue::Int(v) => Some(v.to_string()),
        RawValue::Float(_) | RawValue::Empty => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::NaiveDate;
    use mq_types::{MetricValue, PipelineConfig};

    use super::{
        CleanRecord, RawTable, RawValue, SchemaError, TableSchema, normalize, parse_date,
        split_labels,
    };

    fn text(value: &str) -> RawValue {
        RawValue::Text(value.to_owned())
    }

    fn open_config() -> PipelineConfig {
        PipelineConfig {
            analysis_years: BTreeSet::new(),
            ..PipelineConfig::default()
        }
    }

    fn domestic_table(rows: Vec<Vec<RawValue>>) -> RawTable {
        RawTable::new(
            "domestic",
            [
                "title",
                "open_date",
                "year",
                "audience",
                "audience_total",
                "sales",
                "screens",
                "genres",
            ]
            .map(str::to_owned)
            .to_vec(),
            rows,
        )
    }

    fn domestic_row(
        title: &str,
        open_date: &str,
        year: i64,
        audience_total: f64,
        genres: &str,
    ) -> Vec<RawValue> {
        vec![
            text(title),
            text(open_date),
            RawValue::Int(year),
            RawValue::Int(1_000),
            RawValue::Float(audience_total),
            RawValue::Float(audience_total * 9_000.0),
            RawValue::Int(300),
            text(genres),
        ]
    }

    #[test]
    fn parse_date_supports_fallback_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 7, 26);
        assert_eq!(parse_date("2023-07-26"), expected);
        assert_eq!(parse_date("2023/07/26"), expected);
        assert_eq!(parse_date("07/26/2023"), expected);
        assert_eq!(parse_date(" 2023-07-26 "), expected);
        assert_eq!(parse_date("26.07.2023"), None);
        assert_eq!(parse_date("not-a-date"), None);
    }

    #[test]
    fn split_labels_trims_dedups_and_drops_empties() {
        assert_eq!(
            split_labels("Action, Drama , ,Action,", ','),
            vec!["Action".to_owned(), "Drama".to_owned()]
        );
        assert_eq!(split_labels("", ','), Vec::<String>::new());
        assert_eq!(split_labels(" , ,", ','), Vec::<String>::new());
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let table = RawTable::new(
            "domestic",
            vec!["title".to_owned(), "year".to_owned()],
            vec![vec![text("Parasite"), RawValue::Int(2019)]],
        );
        let err = normalize(&table, &TableSchema::domestic(), &open_config())
            .expect_err("audience column is required");
        assert_eq!(
            err,
            SchemaError::MissingColumn {
                source: "domestic".to_owned(),
                column: "audience".to_owned(),
            }
        );
    }

    #[test]
    fn rows_without_identity_are_dropped_and_counted() {
        let table = domestic_table(vec![
            domestic_row("Decision to Leave", "2022-06-29", 2022, 1_890_000.0, "Drama"),
            domestic_row("", "2022-05-18", 2022, 500.0, "Drama"),
        ]);
        let (dataset, report) =
            normalize(&table, &TableSchema::domestic(), &open_config()).expect("normalize");
        assert_eq!(dataset.len(), 1);
        assert_eq!(report.dropped_missing_identity, 1);
        assert_eq!(report.rows_in, 2);
        assert_eq!(report.rows_kept, 1);
    }

    #[test]
    fn unparseable_date_keeps_row_with_null_date() {
        let table = domestic_table(vec![domestic_row(
            "The Roundup",
            "soon",
            2022,
            12_690_000.0,
            "Action,Crime",
        )]);
        let (dataset, report) =
            normalize(&table, &TableSchema::domestic(), &open_config()).expect("normalize");
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records()[0].date, None);
        assert_eq!(report.date_parse_failures, 1);
    }

    #[test]
    fn year_beyond_horizon_drops_the_whole_row() {
        let config = open_config();
        let table = domestic_table(vec![
            domestic_row("Future Film", "2031-01-01", 2031, 1.0, "Sci-Fi"),
            domestic_row("The Host", "2006-07-27", 2006, 13_010_000.0, "Drama"),
        ]);
        let (dataset, report) =
            normalize(&table, &TableSchema::domestic(), &config).expect("normalize");
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records()[0].title, "The Host");
        assert_eq!(report.dropped_beyond_horizon, 1);
    }

    #[test]
    fn analysis_year_prefilter_drops_other_years() {
        let config = PipelineConfig::default();
        let table = domestic_table(vec![
            domestic_row("Old Film", "2015-03-01", 2015, 900_000.0, "Drama"),
            domestic_row("Recent Film", "2023-03-01", 2023, 900_000.0, "Drama"),
        ]);
        let (dataset, report) =
            normalize(&table, &TableSchema::domestic(), &config).expect("normalize");
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records()[0].title, "Recent Film");
        assert_eq!(report.dropped_outside_years, 1);
    }

    #[test]
    fn out_of_range_metric_invalidates_cell_but_keeps_row() {
        let mut row = domestic_row("Broken Row", "2023-01-05", 2023, 5_000.0, "Drama");
        row[3] = RawValue::Int(-7); // audience below the declared minimum
        let table = domestic_table(vec![row]);
        let (dataset, report) =
            normalize(&table, &TableSchema::domestic(), &open_config()).expect("normalize");

        let record = &dataset.records()[0];
        assert!(record.metric("audience").is_invalid());
        assert_eq!(record.metric("audience_total"), MetricValue::Valid(5_000.0));
        assert_eq!(report.invalid_values.get("audience"), Some(&1));
        assert_eq!(report.rows_kept, 1);
    }

    #[test]
    fn rating_range_is_enforced_on_global_schema() {
        let table = RawTable::new(
            "global",
            [
                "title",
                "release_date",
                "year",
                "rating",
                "votes",
                "popularity",
                "language",
            ]
            .map(str::to_owned)
            .to_vec(),
            vec![
                vec![
                    text("Oppenheimer"),
                    text("2023-07-21"),
                    RawValue::Int(2023),
                    RawValue::Float(8.1),
                    RawValue::Int(28_000),
                    RawValue::Float(312.4),
                    text("en"),
                ],
                vec![
                    text("Corrupt Row"),
                    text("2023-02-01"),
                    RawValue::Int(2023),
                    RawValue::Float(11.2),
                    RawValue::Int(10),
                    RawValue::Float(1.0),
                    text("en"),
                ],
            ],
        );
        let (dataset, report) =
            normalize(&table, &TableSchema::global_catalog(), &open_config()).expect("normalize");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[0].metric("rating"), MetricValue::Valid(8.1));
        assert!(dataset.records()[1].metric("rating").is_invalid());
        assert_eq!(report.invalid_values.get("rating"), Some(&1));
    }

    #[test]
    fn explicit_year_wins_over_date_year() {
        // Weekly series rows carry the chart year, which can differ from
        // the opening date's year around new year boundaries.
        let table = domestic_table(vec![domestic_row(
            "New Year Film",
            "2022-12-28",
            2023,
            800_000.0,
            "Comedy",
        )]);
        let (dataset, _) =
            normalize(&table, &TableSchema::domestic(), &open_config()).expect("normalize");
        assert_eq!(dataset.records()[0].year, 2023);
    }

    #[test]
    fn categories_are_deduplicated_within_record() {
        let table = domestic_table(vec![domestic_row(
            "Genre Soup",
            "2023-04-01",
            2023,
            100.0,
            "Drama, Action,Drama",
        )]);
        let (dataset, _) =
            normalize(&table, &TableSchema::domestic(), &open_config()).expect("normalize");
        assert_eq!(dataset.records()[0].categories, vec!["Drama", "Action"]);
    }

    #[test]
    fn absent_metric_reads_as_missing() {
        let record = CleanRecord {
            title: "X".to_owned(),
            date: None,
            year: 2023,
            metrics: BTreeMap::new(),
            categories: Vec::new(),
        };
        assert_eq!(record.metric("rating"), MetricValue::Missing);
    }
}
