use std::collections::HashMap;

use serde::Serialize;

use crate::types::{QuotaPeriod, Record};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaUtilization {
    pub subaccount: String,
    pub used: f64,
    pub total: f64,
    pub ratio: f64,
    pub over_quota: bool,
}

/// Utilization per subaccount over the records that carry both quota
/// values. Subaccounts whose summed quota is zero have no ratio and are
/// left out. Ordered by descending ratio, ties by name.
pub fn utilization_by_subaccount(records: &[Record]) -> Vec<QuotaUtilization> {
    let mut sums: HashMap<&str, (f64, f64)> = HashMap::new();
    for r in records {
        let (Some(used), Some(total)) = (r.quota_used, r.quota_total) else {
            continue;
        };
        let entry = sums.entry(r.subaccount.as_str()).or_default();
        entry.0 += used;
        entry.1 += total;
    }

    let mut out: Vec<QuotaUtilization> = sums
        .into_iter()
        .filter(|(_, (_, total))| *total > 0.0)
        .map(|(subaccount, (used, total))| {
            let ratio = used / total;
            QuotaUtilization {
                subaccount: subaccount.to_string(),
                used,
                total,
                ratio,
                over_quota: ratio >= 1.0,
            }
        })
        .collect();

    out.sort_by(|a, b| {
        b.ratio
            .total_cmp(&a.ratio)
            .then_with(|| a.subaccount.cmp(&b.subaccount))
    });
    out
}

/// The global account's quota periods, oldest first.
pub fn overview(periods: &[QuotaPeriod]) -> Vec<QuotaPeriod> {
    let mut out = periods.to_vec();
    out.sort_by_key(|p| p.date);
    out
}
