use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of the cost/usage export after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub subaccount: String,
    pub subaccount_id: Option<String>,
    pub directory: Option<String>,
    pub service: String,
    pub labels: Vec<String>,
    pub cost: f64,
    pub usage: Option<f64>,
    pub quota_used: Option<f64>,
    pub quota_total: Option<f64>,
}

/// A row of the workbook's quota overview block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaPeriod {
    pub date: NaiveDate,
    pub usage_percent: f64,
    pub kind: String,
}

impl QuotaPeriod {
    pub fn over_quota(&self) -> bool {
        self.usage_percent >= 100.0
    }
}

/// Everything loaded from one file. Never mutated after the loader returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub source: String,
    pub records: Vec<Record>,
    pub quota_periods: Vec<QuotaPeriod>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Latest record date, the anchor for relative date presets.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.date).max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InvalidDate,
    InvalidCost,
    NegativeCost,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidDate => write!(f, "invalid date"),
            SkipReason::InvalidCost => write!(f, "invalid cost"),
            SkipReason::NegativeCost => write!(f, "negative cost"),
        }
    }
}

/// What the loader did with the file: which sheet it used, how many rows it
/// read and why some were dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub source: String,
    pub sheet: String,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub labelled_subaccounts: usize,
    pub quota_periods: usize,
}

impl Diagnostics {
    pub fn record_skip(&mut self, reason: SkipReason) {
        self.rows_skipped += 1;
        *self.skipped.entry(reason).or_default() += 1;
    }

    pub fn rows_kept(&self) -> usize {
        self.rows_read - self.rows_skipped
    }

    /// `Some` when at least one row was dropped during normalization.
    pub fn warning(&self) -> Option<PartialDataWarning> {
        if self.rows_skipped == 0 {
            return None;
        }
        Some(PartialDataWarning {
            rows_read: self.rows_read,
            rows_skipped: self.rows_skipped,
            reasons: self.skipped.clone(),
        })
    }
}

/// Non-fatal: some rows were dropped but the rest of the file is usable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialDataWarning {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub reasons: BTreeMap<SkipReason, usize>,
}

impl fmt::Display for PartialDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "skipped {} of {} rows",
            self.rows_skipped, self.rows_read
        )?;
        let reasons: Vec<String> = self
            .reasons
            .iter()
            .map(|(reason, n)| format!("{n} {reason}"))
            .collect();
        if !reasons.is_empty() {
            write!(f, " ({})", reasons.join(", "))?;
        }
        Ok(())
    }
}

/// Per-key totals for one grouping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: String,
    pub cost: f64,
    pub usage: f64,
    pub count: usize,
}

impl AggregateRow {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn accumulate(&mut self, cost: f64, usage: Option<f64>) {
        self.cost += cost;
        self.usage += usage.unwrap_or(0.0);
        self.count += 1;
    }

    pub fn accumulate_from(&mut self, other: &AggregateRow) {
        self.cost += other.cost;
        self.usage += other.usage;
        self.count += other.count;
    }
}

/// Rows ordered by descending cost, ties broken by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregateResult {
    pub rows: Vec<AggregateRow>,
}

impl AggregateResult {
    /// Sort rows into display order and wrap them.
    pub fn from_rows(mut rows: Vec<AggregateRow>) -> Self {
        rows.sort_by(|a, b| b.cost.total_cmp(&a.cost).then_with(|| a.key.cmp(&b.key)));
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn total(&self) -> AggregateRow {
        let mut total = AggregateRow::new("TOTAL");
        for row in &self.rows {
            total.accumulate_from(row);
        }
        total
    }

    pub fn get(&self, key: &str) -> Option<&AggregateRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    pub fn top(&self, n: usize) -> AggregateResult {
        AggregateResult {
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// First `n` rows plus an `Other` row folding in the remainder.
    /// The `Other` row stays last regardless of its cost.
    pub fn top_with_other(&self, n: usize) -> AggregateResult {
        if self.rows.len() <= n {
            return self.clone();
        }
        let mut rows: Vec<AggregateRow> = self.rows[..n].to_vec();
        let mut other = AggregateRow::new("Other");
        for row in &self.rows[n..] {
            other.accumulate_from(row);
        }
        rows.push(other);
        AggregateResult { rows }
    }
}
