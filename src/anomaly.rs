use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Number of preceding periods in the moving average.
    pub window: usize,
    /// A day is a spike when its cost exceeds `multiplier × average`.
    pub multiplier: f64,
    /// Days costing less than this are flagged low.
    pub low_threshold: Option<f64>,
    /// How many z-score outliers to report.
    pub outliers: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window: 7,
            multiplier: 1.5,
            low_threshold: None,
            outliers: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Spike,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub cost: f64,
    /// Mean of the preceding `window` periods; `None` until enough history.
    pub moving_average: Option<f64>,
    pub anomaly: Option<AnomalyKind>,
}

/// Total cost per day, ascending by date.
pub fn daily_totals(records: &[Record]) -> Vec<(NaiveDate, f64)> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for r in records {
        *days.entry(r.date).or_default() += r.cost;
    }
    days.into_iter().collect()
}

/// Daily trend with a trailing moving average and anomaly flags.
///
/// The average for day `i` covers days `i - window .. i` and excludes day
/// `i` itself, so a spike cannot raise its own baseline.
pub fn detect(records: &[Record], cfg: &AnomalyConfig) -> Vec<TrendPoint> {
    let series = daily_totals(records);
    let mut points = Vec::with_capacity(series.len());

    for (i, &(date, cost)) in series.iter().enumerate() {
        let moving_average = (cfg.window > 0 && i >= cfg.window).then(|| {
            let prior = &series[i - cfg.window..i];
            prior.iter().map(|(_, c)| c).sum::<f64>() / cfg.window as f64
        });

        let anomaly = if moving_average.is_some_and(|avg| cost > cfg.multiplier * avg) {
            Some(AnomalyKind::Spike)
        } else if cfg.low_threshold.is_some_and(|t| cost < t) {
            Some(AnomalyKind::Low)
        } else {
            None
        };

        points.push(TrendPoint {
            date,
            cost,
            moving_average,
            anomaly,
        });
    }

    points
}

/// A single record standing out from its service's typical cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outlier {
    pub service: String,
    pub subaccount: String,
    pub date: NaiveDate,
    pub cost: f64,
    pub mean: f64,
    pub z_score: f64,
}

/// The `n` records with the highest z-score against their own service.
/// Services with a single record or zero spread are ignored.
pub fn service_outliers(records: &[Record], n: usize) -> Vec<Outlier> {
    let mut by_service: HashMap<&str, Vec<&Record>> = HashMap::new();
    for r in records {
        by_service.entry(r.service.as_str()).or_default().push(r);
    }

    let mut outliers = Vec::new();
    for (service, rows) in by_service {
        if rows.len() < 2 {
            continue;
        }
        let count = rows.len() as f64;
        let mean = rows.iter().map(|r| r.cost).sum::<f64>() / count;
        let variance = rows.iter().map(|r| (r.cost - mean).powi(2)).sum::<f64>() / (count - 1.0);
        let std_dev = variance.sqrt();
        if std_dev == 0.0 || !std_dev.is_finite() {
            continue;
        }
        for r in rows {
            outliers.push(Outlier {
                service: service.to_string(),
                subaccount: r.subaccount.clone(),
                date: r.date,
                cost: r.cost,
                mean,
                z_score: (r.cost - mean) / std_dev,
            });
        }
    }

    outliers.sort_by(|a, b| {
        b.z_score
            .total_cmp(&a.z_score)
            .then_with(|| a.service.cmp(&b.service))
            .then_with(|| a.date.cmp(&b.date))
    });
    outliers.truncate(n);
    outliers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::{record, ymd};
    use pretty_assertions::assert_eq;

    fn days(costs: &[f64]) -> Vec<Record> {
        let start = ymd(2024, 1, 1);
        costs
            .iter()
            .enumerate()
            .map(|(i, c)| record(start + chrono::Duration::days(i as i64), "A", "HANA", *c))
            .collect()
    }

    #[test]
    fn flags_spike_after_flat_week() {
        let data = days(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 100.0]);
        let points = detect(&data, &AnomalyConfig::default());
        assert_eq!(points.len(), 8);
        let last = &points[7];
        assert_eq!(last.cost, 100.0);
        assert_eq!(last.moving_average, Some(10.0));
        assert_eq!(last.anomaly, Some(AnomalyKind::Spike));
        assert!(points[..7].iter().all(|p| p.anomaly.is_none()));
        assert!(points[..7].iter().all(|p| p.moving_average.is_none()));
    }

    #[test]
    fn moderate_increase_is_not_a_spike() {
        let data = days(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 15.0]);
        let points = detect(&data, &AnomalyConfig::default());
        assert_eq!(points[7].anomaly, None);
    }

    #[test]
    fn low_threshold_flags_quiet_days() {
        let cfg = AnomalyConfig {
            window: 2,
            low_threshold: Some(1.0),
            ..Default::default()
        };
        let points = detect(&days(&[5.0, 0.5, 5.0]), &cfg);
        assert_eq!(points[1].anomaly, Some(AnomalyKind::Low));
        assert_eq!(points[2].moving_average, Some(2.75));
        assert_eq!(points[2].anomaly, Some(AnomalyKind::Spike));
    }

    #[test]
    fn zero_window_never_flags_spikes() {
        let cfg = AnomalyConfig {
            window: 0,
            ..Default::default()
        };
        let points = detect(&days(&[1.0, 1000.0]), &cfg);
        assert!(points.iter().all(|p| p.anomaly.is_none()));
    }

    #[test]
    fn daily_totals_merge_same_day_records() {
        let data = vec![
            record(ymd(2024, 1, 2), "A", "HANA", 1.0),
            record(ymd(2024, 1, 1), "B", "Kyma", 2.0),
            record(ymd(2024, 1, 2), "C", "HANA", 3.0),
        ];
        assert_eq!(
            daily_totals(&data),
            vec![(ymd(2024, 1, 1), 2.0), (ymd(2024, 1, 2), 4.0)]
        );
    }

    #[test]
    fn empty_input_has_no_trend() {
        assert!(detect(&[], &AnomalyConfig::default()).is_empty());
        assert!(service_outliers(&[], 5).is_empty());
    }

    #[test]
    fn outliers_rank_by_z_score() {
        let mut data = days(&[10.0, 10.0, 10.0, 50.0]);
        data.push(record(ymd(2024, 1, 1), "B", "Kyma", 3.0));
        data.push(record(ymd(2024, 1, 1), "B", "Flat", 2.0));
        data.push(record(ymd(2024, 1, 2), "B", "Flat", 2.0));

        let outliers = service_outliers(&data, 1);
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].service, "HANA");
        assert_eq!(outliers[0].cost, 50.0);
        assert_eq!(outliers[0].mean, 20.0);
        assert!((outliers[0].z_score - 1.5).abs() < 1e-9);

        let all = service_outliers(&data, 10);
        assert!(all.iter().all(|o| o.service == "HANA"));
    }
}
