use std::collections::BTreeSet;

use chrono::{Months, NaiveDate};
use clap::ValueEnum;
use serde::Serialize;

use crate::types::{Dataset, Record};

/// Conjunctive constraints over records. `None` / empty means "match all"
/// for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterSpec {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub subaccounts: Option<BTreeSet<String>>,
    pub services: Option<BTreeSet<String>>,
    pub excluded_subaccounts: BTreeSet<String>,
    pub excluded_directories: BTreeSet<String>,
}

/// Turn a user-supplied list into an allowlist; an empty list selects
/// nothing in particular, so it means "all".
fn allowlist<I, S>(values: I) -> Option<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let set: BTreeSet<String> = values
        .into_iter()
        .map(Into::into)
        .filter(|v: &String| !v.trim().is_empty())
        .collect();
    (!set.is_empty()).then_some(set)
}

fn intersect_allowlists(
    a: &Option<BTreeSet<String>>,
    b: &Option<BTreeSet<String>>,
) -> Option<BTreeSet<String>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.intersection(b).cloned().collect()),
        (Some(s), None) | (None, Some(s)) => Some(s.clone()),
        (None, None) => None,
    }
}

fn later(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn earlier(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

impl FilterSpec {
    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_subaccounts<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subaccounts = allowlist(values);
        self
    }

    pub fn with_services<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = allowlist(values);
        self
    }

    pub fn excluding_subaccounts<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_subaccounts = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn excluding_directories<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_directories = values.into_iter().map(Into::into).collect();
        self
    }

    /// True when no constraint is active.
    pub fn is_empty(&self) -> bool {
        *self == FilterSpec::default()
    }

    /// The conjunction of both specs: applying it once equals applying
    /// `self` then `other`. Intersecting two allowlists can leave an empty
    /// set, which matches nothing.
    pub fn intersect(&self, other: &FilterSpec) -> FilterSpec {
        FilterSpec {
            from: later(self.from, other.from),
            to: earlier(self.to, other.to),
            subaccounts: intersect_allowlists(&self.subaccounts, &other.subaccounts),
            services: intersect_allowlists(&self.services, &other.services),
            excluded_subaccounts: self
                .excluded_subaccounts
                .union(&other.excluded_subaccounts)
                .cloned()
                .collect(),
            excluded_directories: self
                .excluded_directories
                .union(&other.excluded_directories)
                .cloned()
                .collect(),
        }
    }

    pub fn matches(&self, r: &Record) -> bool {
        if self.from.is_some_and(|from| r.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| r.date > to) {
            return false;
        }
        if let Some(allowed) = &self.subaccounts {
            if !allowed.contains(&r.subaccount) {
                return false;
            }
        }
        if let Some(allowed) = &self.services {
            if !allowed.contains(&r.service) {
                return false;
            }
        }
        if self.excluded_subaccounts.contains(&r.subaccount) {
            return false;
        }
        if let Some(dir) = &r.directory {
            if self.excluded_directories.contains(dir) {
                return false;
            }
        }
        true
    }
}

/// Records satisfying every constraint, in their original order. A range
/// whose start is after its end selects nothing.
pub fn apply(records: &[Record], spec: &FilterSpec) -> Vec<Record> {
    records.iter().filter(|r| spec.matches(r)).cloned().collect()
}

/// Filter a whole dataset. Quota periods describe the global account and
/// are carried over untouched.
pub fn apply_dataset(dataset: &Dataset, spec: &FilterSpec) -> Dataset {
    Dataset {
        source: dataset.source.clone(),
        records: apply(&dataset.records, spec),
        quota_periods: dataset.quota_periods.clone(),
    }
}

/// Relative date windows anchored at the latest record date.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatePreset {
    LastMonth,
    #[value(name = "last-3-months")]
    Last3Months,
    #[value(name = "last-6-months")]
    Last6Months,
    LastYear,
}

impl DatePreset {
    fn months(self) -> u32 {
        match self {
            DatePreset::LastMonth => 1,
            DatePreset::Last3Months => 3,
            DatePreset::Last6Months => 6,
            DatePreset::LastYear => 12,
        }
    }

    /// `(latest - N months, latest)`, both inclusive.
    pub fn resolve(self, latest: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = latest
            .checked_sub_months(Months::new(self.months()))
            .unwrap_or(NaiveDate::MIN);
        (start, latest)
    }
}

/// Distinct values available for selection, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub subaccounts: Vec<String>,
    pub services: Vec<String>,
    pub directories: Vec<String>,
}

pub fn options(records: &[Record]) -> FilterOptions {
    let mut subaccounts = BTreeSet::new();
    let mut services = BTreeSet::new();
    let mut directories = BTreeSet::new();
    for r in records {
        subaccounts.insert(r.subaccount.clone());
        services.insert(r.service.clone());
        if let Some(dir) = &r.directory {
            directories.insert(dir.clone());
        }
    }
    FilterOptions {
        subaccounts: subaccounts.into_iter().collect(),
        services: services.into_iter().collect(),
        directories: directories.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(date: NaiveDate, subaccount: &str, service: &str, cost: f64) -> Record {
        Record {
            date,
            end_date: None,
            subaccount: subaccount.to_string(),
            subaccount_id: None,
            directory: None,
            service: service.to_string(),
            labels: Vec::new(),
            cost,
            usage: None,
            quota_used: None,
            quota_total: None,
        }
    }

    fn sample() -> Vec<Record> {
        let mut dir = record(ymd(2024, 1, 3), "C", "Kyma", 5.0);
        dir.directory = Some("Sandbox".to_string());
        vec![
            record(ymd(2024, 1, 1), "A", "HANA", 10.0),
            record(ymd(2024, 1, 2), "B", "HANA", 20.0),
            dir,
            record(ymd(2024, 2, 1), "A", "Kyma", 7.0),
            record(ymd(2024, 3, 1), "B", "Integration", 1.0),
        ]
    }

    fn specs() -> Vec<FilterSpec> {
        vec![
            FilterSpec::default(),
            FilterSpec::default().with_subaccounts(["A"]),
            FilterSpec::default().with_subaccounts(["A", "C"]),
            FilterSpec::default().with_services(["Kyma"]),
            FilterSpec::default().between(Some(ymd(2024, 1, 2)), Some(ymd(2024, 2, 1))),
            FilterSpec::default().between(None, Some(ymd(2024, 1, 31))),
            FilterSpec::default().excluding_subaccounts(["B"]),
            FilterSpec::default().excluding_directories(["Sandbox"]),
            FilterSpec::default().with_subaccounts(["B"]).with_services(["HANA"]),
        ]
    }

    #[test]
    fn selects_one_subaccount() {
        let data = vec![
            record(ymd(2024, 1, 1), "A", "HANA", 10.0),
            record(ymd(2024, 1, 2), "B", "HANA", 20.0),
        ];
        let out = apply(&data, &FilterSpec::default().with_subaccounts(["A"]));
        assert_eq!(out, vec![record(ymd(2024, 1, 1), "A", "HANA", 10.0)]);
    }

    #[test]
    fn empty_spec_is_identity() {
        let data = sample();
        assert!(FilterSpec::default().is_empty());
        assert_eq!(apply(&data, &FilterSpec::default()), data);
        let empty_lists = FilterSpec::default()
            .with_subaccounts(Vec::<String>::new())
            .with_services([""]);
        assert!(empty_lists.is_empty());
        assert_eq!(apply(&data, &empty_lists), data);
    }

    #[test]
    fn result_is_a_subset() {
        let data = sample();
        for spec in specs() {
            for r in apply(&data, &spec) {
                assert!(data.contains(&r));
            }
        }
    }

    #[test]
    fn composition_equals_intersection() {
        let data = sample();
        for f1 in specs() {
            for f2 in specs() {
                let twice = apply(&apply(&data, &f1), &f2);
                let once = apply(&data, &f1.intersect(&f2));
                assert_eq!(twice, once, "f1={f1:?} f2={f2:?}");
                let swapped = apply(&apply(&data, &f2), &f1);
                assert_eq!(twice, swapped);
            }
        }
    }

    #[test]
    fn disjoint_allowlists_match_nothing() {
        let data = sample();
        let spec = FilterSpec::default()
            .with_subaccounts(["A"])
            .intersect(&FilterSpec::default().with_subaccounts(["B"]));
        assert_eq!(spec.subaccounts, Some(BTreeSet::new()));
        assert!(apply(&data, &spec).is_empty());
    }

    #[test]
    fn inverted_range_is_empty_not_an_error() {
        let data = sample();
        let spec = FilterSpec::default().between(Some(ymd(2024, 3, 1)), Some(ymd(2024, 1, 1)));
        assert!(apply(&data, &spec).is_empty());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let data = sample();
        let spec = FilterSpec::default().between(Some(ymd(2024, 1, 2)), Some(ymd(2024, 2, 1)));
        let dates: Vec<NaiveDate> = apply(&data, &spec).iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![ymd(2024, 1, 2), ymd(2024, 1, 3), ymd(2024, 2, 1)]);
    }

    #[test]
    fn directory_exclusion_keeps_records_without_directory() {
        let data = sample();
        let out = apply(&data, &FilterSpec::default().excluding_directories(["Sandbox"]));
        assert_eq!(out.len(), data.len() - 1);
        assert!(out.iter().all(|r| r.subaccount != "C"));
    }

    #[test]
    fn presets_use_calendar_months() {
        let latest = ymd(2024, 3, 31);
        assert_eq!(DatePreset::LastMonth.resolve(latest), (ymd(2024, 2, 29), latest));
        assert_eq!(DatePreset::Last3Months.resolve(latest), (ymd(2023, 12, 31), latest));
        assert_eq!(DatePreset::LastYear.resolve(latest).0, ymd(2023, 3, 31));
    }

    #[test]
    fn dataset_filter_keeps_quota_periods() {
        let quota = crate::types::QuotaPeriod {
            date: ymd(2023, 6, 1),
            usage_percent: 104.0,
            kind: "CPEA".to_string(),
        };
        let dataset = Dataset {
            source: "export.xlsx".to_string(),
            records: sample(),
            quota_periods: vec![quota.clone()],
        };
        let spec = FilterSpec::default()
            .between(Some(ymd(2024, 2, 1)), None)
            .with_subaccounts(["A"]);
        let out = apply_dataset(&dataset, &spec);
        assert_eq!(out.source, "export.xlsx");
        assert_eq!(out.records, vec![record(ymd(2024, 2, 1), "A", "Kyma", 7.0)]);
        assert_eq!(out.quota_periods, vec![quota]);
    }

    #[test]
    fn options_are_sorted_and_distinct() {
        let opts = options(&sample());
        assert_eq!(opts.subaccounts, vec!["A", "B", "C"]);
        assert_eq!(opts.services, vec!["HANA", "Integration", "Kyma"]);
        assert_eq!(opts.directories, vec!["Sandbox"]);
    }
}
