use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{AggregateResult, AggregateRow, Record};

/// How a labelled record's cost is attributed to its labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    /// Every label receives the full record cost. A record with two labels
    /// counts twice, so label totals can exceed the dataset total.
    #[default]
    Full,
    /// The cost is divided equally among the record's labels.
    Split,
}

/// Group records by an arbitrary key, summing cost and usage.
pub fn group_by<F>(records: &[Record], key: F) -> AggregateResult
where
    F: Fn(&Record) -> &str,
{
    let mut groups: HashMap<&str, AggregateRow> = HashMap::new();
    for r in records {
        let k = key(r);
        groups
            .entry(k)
            .or_insert_with(|| AggregateRow::new(k))
            .accumulate(r.cost, r.usage);
    }
    AggregateResult::from_rows(groups.into_values().collect())
}

pub fn by_subaccount(records: &[Record]) -> AggregateResult {
    group_by(records, |r| r.subaccount.as_str())
}

pub fn by_service(records: &[Record]) -> AggregateResult {
    group_by(records, |r| r.service.as_str())
}

/// Explode records into `(label, share)` pairs and group them. Records
/// without labels are left out.
pub fn by_label(records: &[Record], policy: LabelPolicy) -> AggregateResult {
    let mut groups: HashMap<&str, AggregateRow> = HashMap::new();
    for r in records {
        if r.labels.is_empty() {
            continue;
        }
        let divisor = match policy {
            LabelPolicy::Full => 1.0,
            LabelPolicy::Split => r.labels.len() as f64,
        };
        for label in &r.labels {
            groups
                .entry(label.as_str())
                .or_insert_with(|| AggregateRow::new(label.as_str()))
                .accumulate(r.cost / divisor, r.usage.map(|u| u / divisor));
        }
    }
    AggregateResult::from_rows(groups.into_values().collect())
}

/// Service breakdown for the `n` most expensive subaccounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubaccountBreakdown {
    pub subaccount: AggregateRow,
    pub services: AggregateResult,
}

pub fn service_breakdown(records: &[Record], n: usize) -> Vec<SubaccountBreakdown> {
    by_subaccount(records)
        .top(n)
        .rows
        .into_iter()
        .map(|subaccount| {
            let own: Vec<Record> = records
                .iter()
                .filter(|r| r.subaccount == subaccount.key)
                .cloned()
                .collect();
            SubaccountBreakdown {
                services: by_service(&own),
                subaccount,
            }
        })
        .collect()
}

/// Headline numbers for a record set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub records: usize,
    pub total_cost: f64,
    /// Mean over records with a cost above zero.
    pub avg_nonzero_cost: f64,
    pub median_cost: f64,
    pub total_usage: f64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

pub fn summary(records: &[Record]) -> Summary {
    if records.is_empty() {
        return Summary::default();
    }

    let total_cost: f64 = records.iter().map(|r| r.cost).sum();
    let nonzero: Vec<f64> = records.iter().map(|r| r.cost).filter(|c| *c > 0.0).collect();
    let avg_nonzero_cost = if nonzero.is_empty() {
        0.0
    } else {
        nonzero.iter().sum::<f64>() / nonzero.len() as f64
    };

    let mut costs: Vec<f64> = records.iter().map(|r| r.cost).collect();
    costs.sort_by(f64::total_cmp);
    let mid = costs.len() / 2;
    let median_cost = if costs.len() % 2 == 0 {
        (costs[mid - 1] + costs[mid]) / 2.0
    } else {
        costs[mid]
    };

    Summary {
        records: records.len(),
        total_cost,
        avg_nonzero_cost,
        median_cost,
        total_usage: records.iter().filter_map(|r| r.usage).sum(),
        first_date: records.iter().map(|r| r.date).min(),
        last_date: records.iter().map(|r| r.date).max(),
    }
}
