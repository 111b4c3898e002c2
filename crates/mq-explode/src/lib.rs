#![forbid(unsafe_code)]

use mq_record::{CleanRecord, Dataset};

/// One (category, record) contribution pair.
///
/// The record's metrics are carried whole: a record with three genres
/// contributes its full audience count to each of the three genre
/// aggregates. Category-level totals therefore double-count multi-category
/// records; that is the contract, not an accident, and consumers summing
/// across categories must not expect the dataset total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplodedRow<'a> {
    pub category: &'a str,
    pub record: &'a CleanRecord,
}

/// Fan each record out across its categories, lazily.
///
/// A record with k categories yields k rows; a record with none yields
/// nothing here but stays in the base dataset for non-categorical views.
/// The iterator borrows the dataset and holds no mutable state, so
/// repeated calls are independent.
pub fn explode(dataset: &Dataset) -> impl Iterator<Item = ExplodedRow<'_>> {
    dataset.records().iter().flat_map(|record| {
        record.categories.iter().map(move |category| ExplodedRow {
            category: category.as_str(),
            record,
        })
    })
}

/// Total fan-out size without materializing the rows.
#[must_use]
pub fn exploded_len(dataset: &Dataset) -> usize {
    dataset
        .records()
        .iter()
        .map(|record| record.categories.len())
        .sum()
}
