use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::aggregate::{self, LabelPolicy, SubaccountBreakdown, Summary};
use crate::anomaly::{self, AnomalyConfig, Outlier, TrendPoint};
use crate::filter::{self, DatePreset, FilterOptions, FilterSpec};
use crate::loader::Loaded;
use crate::quota::{self, QuotaUtilization};
use crate::types::{AggregateResult, Dataset, Diagnostics, QuotaPeriod, Record};

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub top_n: usize,
    pub label_policy: LabelPolicy,
    pub anomaly: AnomalyConfig,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_n: 10,
            label_policy: LabelPolicy::default(),
            anomaly: AnomalyConfig::default(),
        }
    }
}

/// Everything computed for one filter selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub filter: FilterSpec,
    pub summary: Summary,
    pub by_subaccount: AggregateResult,
    pub by_service: AggregateResult,
    pub by_label: AggregateResult,
    pub breakdown: Vec<SubaccountBreakdown>,
    pub trend: Vec<TrendPoint>,
    pub outliers: Vec<Outlier>,
    pub quota: Vec<QuotaUtilization>,
    pub quota_overview: Vec<QuotaPeriod>,
    pub records: Vec<Record>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &TrendPoint> {
        self.trend.iter().filter(|p| p.anomaly.is_some())
    }
}

/// Owns the loaded dataset for one analysis session. The dataset is shared
/// read-only; loading a new file swaps in a new one instead of mutating it.
#[derive(Debug, Clone)]
pub struct Session {
    dataset: Arc<Dataset>,
    diagnostics: Diagnostics,
    settings: AnalysisSettings,
}

impl Session {
    pub fn new(loaded: Loaded, settings: AnalysisSettings) -> Self {
        Self {
            dataset: Arc::new(loaded.dataset),
            diagnostics: loaded.diagnostics,
            settings,
        }
    }

    /// Swap in a freshly loaded file. Returns the previous dataset, which
    /// stays valid for anyone still holding it.
    pub fn replace(&mut self, loaded: Loaded) -> Arc<Dataset> {
        debug!(source = %loaded.dataset.source, "replacing session dataset");
        self.diagnostics = loaded.diagnostics;
        std::mem::replace(&mut self.dataset, Arc::new(loaded.dataset))
    }

    pub fn dataset(&self) -> Arc<Dataset> {
        Arc::clone(&self.dataset)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn options(&self) -> FilterOptions {
        filter::options(&self.dataset.records)
    }

    /// Resolve a relative preset against the newest record; `None` when the
    /// dataset is empty.
    pub fn preset_range(&self, preset: DatePreset) -> Option<(NaiveDate, NaiveDate)> {
        if self.dataset.is_empty() {
            debug!("no records, ignoring date preset");
            return None;
        }
        self.dataset.latest_date().map(|latest| preset.resolve(latest))
    }

    pub fn analyze(&self, spec: &FilterSpec) -> Report {
        let filtered = filter::apply_dataset(&self.dataset, spec);
        let records = filtered.records;
        debug!(
            total = self.dataset.len(),
            matched = records.len(),
            "applied filters"
        );

        let settings = &self.settings;
        Report {
            filter: spec.clone(),
            summary: aggregate::summary(&records),
            by_subaccount: aggregate::by_subaccount(&records),
            by_service: aggregate::by_service(&records),
            by_label: aggregate::by_label(&records, settings.label_policy),
            breakdown: aggregate::service_breakdown(&records, settings.top_n),
            trend: anomaly::detect(&records, &settings.anomaly),
            outliers: anomaly::service_outliers(&records, settings.anomaly.outliers),
            quota: quota::utilization_by_subaccount(&records),
            quota_overview: quota::overview(&filtered.quota_periods),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::{record, ymd};
    use pretty_assertions::assert_eq;

    fn loaded(source: &str, records: Vec<Record>) -> Loaded {
        Loaded {
            dataset: Dataset {
                source: source.to_string(),
                records,
                quota_periods: Vec::new(),
            },
            diagnostics: Diagnostics {
                source: source.to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn analyze_runs_the_whole_pipeline() {
        let session = Session::new(
            loaded(
                "a.xlsx",
                vec![
                    record(ymd(2024, 1, 1), "A", "HANA", 10.0),
                    record(ymd(2024, 1, 2), "B", "HANA", 20.0),
                ],
            ),
            AnalysisSettings::default(),
        );
        let report = session.analyze(&FilterSpec::default().with_subaccounts(["A"]));
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.by_subaccount.rows.len(), 1);
        assert_eq!(report.by_subaccount.rows[0].cost, 10.0);
        assert_eq!(report.summary.total_cost, 10.0);
        assert_eq!(report.trend.len(), 1);
    }

    #[test]
    fn empty_selection_is_a_valid_report() {
        let session = Session::new(
            loaded("a.xlsx", vec![record(ymd(2024, 1, 1), "A", "HANA", 10.0)]),
            AnalysisSettings::default(),
        );
        let report = session.analyze(&FilterSpec::default().with_services(["Nope"]));
        assert!(report.is_empty());
        assert!(report.by_subaccount.is_empty());
        assert!(report.by_service.is_empty());
        assert!(report.by_label.is_empty());
        assert!(report.trend.is_empty());
        assert!(report.quota.is_empty());
        assert_eq!(report.anomalies().count(), 0);
    }

    #[test]
    fn replace_swaps_without_touching_old_snapshot() {
        let mut session = Session::new(
            loaded("first.xlsx", vec![record(ymd(2024, 1, 1), "A", "HANA", 10.0)]),
            AnalysisSettings::default(),
        );
        let snapshot = session.dataset();

        let previous = session.replace(loaded(
            "second.xlsx",
            vec![
                record(ymd(2024, 2, 1), "B", "Kyma", 1.0),
                record(ymd(2024, 2, 2), "B", "Kyma", 2.0),
            ],
        ));

        assert!(Arc::ptr_eq(&snapshot, &previous));
        assert_eq!(snapshot.source, "first.xlsx");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(session.dataset().source, "second.xlsx");
        assert_eq!(session.diagnostics().source, "second.xlsx");
        assert_eq!(session.analyze(&FilterSpec::default()).records.len(), 2);
    }

    #[test]
    fn presets_anchor_on_latest_record() {
        let session = Session::new(
            loaded(
                "a.xlsx",
                vec![
                    record(ymd(2024, 1, 15), "A", "HANA", 1.0),
                    record(ymd(2024, 3, 15), "A", "HANA", 1.0),
                ],
            ),
            AnalysisSettings::default(),
        );
        assert_eq!(
            session.preset_range(DatePreset::LastMonth),
            Some((ymd(2024, 2, 15), ymd(2024, 3, 15)))
        );

        let empty = Session::new(loaded("e.xlsx", vec![]), AnalysisSettings::default());
        assert_eq!(empty.preset_range(DatePreset::LastYear), None);
    }
}
