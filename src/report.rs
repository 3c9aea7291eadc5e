//! Derived views over a user's expenses: totals, category and monthly
//! breakdowns, filtering and the recent list.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Category, CategoryTotal, ExpenseRecord, MonthTotal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    /// Parses the filter selector; blank and `All` match every category.
    pub fn parse(value: &str) -> LedgerResult<Self> {
        match value.trim() {
            "" | "All" => Ok(Self::All),
            other => other
                .parse()
                .map(Self::Only)
                .map_err(|err| LedgerError::InvalidCategory(err.0)),
        }
    }

    pub fn matches(self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == category,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Only(category) => category.as_str(),
        }
    }
}

/// Inclusive filter; a missing bound is open, which is the same as the
/// earliest/latest date in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpenseFilter {
    pub category: CategoryFilter,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ExpenseFilter {
    pub fn matches(&self, record: &ExpenseRecord) -> bool {
        self.category.matches(record.category)
            && self.start.is_none_or(|start| start <= record.date)
            && self.end.is_none_or(|end| record.date <= end)
    }
}

/// Sums saturate at `i64::MAX` rather than overflow.
pub fn total(records: &[ExpenseRecord]) -> i64 {
    records
        .iter()
        .fold(0, |sum: i64, record| sum.saturating_add(record.amount))
}

pub fn by_category(records: &[ExpenseRecord]) -> Vec<CategoryTotal> {
    let mut sums: BTreeMap<Category, i64> = BTreeMap::new();
    for record in records {
        let sum = sums.entry(record.category).or_insert(0);
        *sum = sum.saturating_add(record.amount);
    }
    sums.into_iter()
        .map(|(category, amount)| CategoryTotal { category, amount })
        .collect()
}

/// Highest-spending category. Ties go to the alphabetically first name.
pub fn top_category(records: &[ExpenseRecord]) -> Option<Category> {
    by_category(records)
        .into_iter()
        .max_by(|a, b| {
            a.amount
                .cmp(&b.amount)
                .then_with(|| b.category.as_str().cmp(a.category.as_str()))
        })
        .map(|summary| summary.category)
}

pub fn filter(records: &[ExpenseRecord], filter: &ExpenseFilter) -> Vec<ExpenseRecord> {
    records
        .iter()
        .filter(|record| filter.matches(record))
        .cloned()
        .collect()
}

pub fn date_bounds(records: &[ExpenseRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let min = records.iter().map(|record| record.date).min()?;
    let max = records.iter().map(|record| record.date).max()?;
    Some((min, max))
}

pub fn monthly(records: &[ExpenseRecord]) -> Vec<MonthTotal> {
    let mut sums: BTreeMap<String, i64> = BTreeMap::new();
    for record in records {
        let month = record.date.format("%Y-%m").to_string();
        let sum = sums.entry(month).or_insert(0);
        *sum = sum.saturating_add(record.amount);
    }
    sums.into_iter()
        .map(|(month, amount)| MonthTotal { month, amount })
        .collect()
}

/// The `n` latest expenses, newest first. Same-day entries are ordered by
/// id, most recently added first.
pub fn recent(records: &[ExpenseRecord], n: usize) -> Vec<ExpenseRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
    sorted.truncate(n);
    sorted
}
