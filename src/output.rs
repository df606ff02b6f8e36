use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, ContentArrangement, Table};
use num_format::{Locale, ToFormattedString};
use serde::Serialize;

use crate::anomaly::AnomalyKind;
use crate::filter::{FilterOptions, FilterSpec};
use crate::session::Report;
use crate::types::{AggregateResult, Diagnostics};

/// Formats amounts with the configured currency symbol.
pub struct Money<'a> {
    symbol: &'a str,
}

impl<'a> Money<'a> {
    pub fn new(symbol: &'a str) -> Self {
        Self { symbol }
    }

    pub fn format(&self, amount: f64) -> String {
        let cents = (amount * 100.0).round() as i64;
        let sign = if cents < 0 { "-" } else { "" };
        let cents = cents.unsigned_abs();
        format!(
            "{sign}{}{}.{:02}",
            self.symbol,
            (cents / 100).to_formatted_string(&Locale::en),
            cents % 100
        )
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n:.2}")
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.iter().map(|h| Cell::new(h)));
    table
}

fn amount_cell(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

pub fn print_warning(diagnostics: &Diagnostics) {
    if let Some(warning) = diagnostics.warning() {
        eprintln!("Warning: {}: {}", diagnostics.source, warning);
    }
}

pub fn print_empty() {
    eprintln!("No cost records match the current filters.");
}

pub fn describe_filter(spec: &FilterSpec) -> String {
    let range = match (spec.from, spec.to) {
        (Some(f), Some(t)) => format!("{} to {}", f.format("%B %d, %Y"), t.format("%B %d, %Y")),
        (Some(f), None) => format!("from {}", f.format("%B %d, %Y")),
        (None, Some(t)) => format!("until {}", t.format("%B %d, %Y")),
        (None, None) => "All time".to_string(),
    };
    let mut parts = vec![range];
    if let Some(subs) = &spec.subaccounts {
        parts.push(format!("subaccounts: {}", subs.iter().cloned().collect::<Vec<_>>().join(", ")));
    }
    if let Some(services) = &spec.services {
        parts.push(format!("services: {}", services.iter().cloned().collect::<Vec<_>>().join(", ")));
    }
    if !spec.excluded_subaccounts.is_empty() {
        parts.push(format!(
            "excluding: {}",
            spec.excluded_subaccounts.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !spec.excluded_directories.is_empty() {
        parts.push(format!(
            "excluding directories: {}",
            spec.excluded_directories.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    parts.join(" | ")
}

pub fn print_aggregate(title: &str, key_header: &str, result: &AggregateResult, top: usize, money: &Money) {
    let mut table = new_table(&[key_header, "Cost", "Share", "Records", "Usage"]);
    let total = result.total();

    for row in &result.top_with_other(top).rows {
        let share = if total.cost > 0.0 {
            format!("{:.1}%", row.cost / total.cost * 100.0)
        } else {
            "-".to_string()
        };
        table.add_row(vec![
            Cell::new(&row.key),
            amount_cell(money.format(row.cost)),
            amount_cell(share),
            amount_cell(row.count.to_string()),
            amount_cell(format_number(row.usage)),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL"),
        amount_cell(money.format(total.cost)),
        amount_cell(String::new()),
        amount_cell(total.count.to_string()),
        amount_cell(format_number(total.usage)),
    ]);

    println!("{title}");
    println!("{table}");
}

pub fn print_summary(report: &Report, top: usize, money: &Money) {
    let s = &report.summary;
    println!("Period: {}", describe_filter(&report.filter));

    let mut table = new_table(&["Metric", "Value"]);
    table.add_row(vec![Cell::new("Total Cost"), amount_cell(money.format(s.total_cost))]);
    table.add_row(vec![
        Cell::new("Avg Cost (nonzero)"),
        amount_cell(money.format(s.avg_nonzero_cost)),
    ]);
    table.add_row(vec![Cell::new("Median Cost"), amount_cell(money.format(s.median_cost))]);
    table.add_row(vec![Cell::new("Total Usage"), amount_cell(format_number(s.total_usage))]);
    table.add_row(vec![Cell::new("Records"), amount_cell(s.records.to_string())]);
    if let (Some(first), Some(last)) = (s.first_date, s.last_date) {
        table.add_row(vec![Cell::new("Data Range"), amount_cell(format!("{first} to {last}"))]);
    }
    println!("{table}");

    print_aggregate("Top Subaccounts by Cost", "Subaccount", &report.by_subaccount, top, money);
    print_aggregate("Top Services by Cost", "Service", &report.by_service, top, money);
}

pub fn print_labels(report: &Report, top: usize, money: &Money) {
    if report.by_label.is_empty() {
        println!("No label data available for analysis.");
        return;
    }
    print_aggregate("Cost by Label", "Label", &report.by_label, top, money);
}

pub fn print_trend(report: &Report, money: &Money) {
    let mut table = new_table(&["Date", "Cost", "Moving Avg", "Flag"]);
    for point in &report.trend {
        table.add_row(vec![
            Cell::new(point.date),
            amount_cell(money.format(point.cost)),
            amount_cell(point.moving_average.map(|a| money.format(a)).unwrap_or_default()),
            Cell::new(flag_label(point.anomaly)),
        ]);
    }
    println!("Cost Trend");
    println!("{table}");
}

fn flag_label(kind: Option<AnomalyKind>) -> &'static str {
    match kind {
        Some(AnomalyKind::Spike) => "spike",
        Some(AnomalyKind::Low) => "low",
        None => "",
    }
}

pub fn print_anomalies(report: &Report, money: &Money) {
    let flagged: Vec<_> = report.anomalies().collect();
    if flagged.is_empty() {
        println!("No days above the moving-average threshold.");
    } else {
        let mut table = new_table(&["Date", "Cost", "Moving Avg", "Flag"]);
        for point in flagged {
            table.add_row(vec![
                Cell::new(point.date),
                amount_cell(money.format(point.cost)),
                amount_cell(point.moving_average.map(|a| money.format(a)).unwrap_or_default()),
                Cell::new(flag_label(point.anomaly)),
            ]);
        }
        println!("Daily Cost Anomalies");
        println!("{table}");
    }

    if report.outliers.is_empty() {
        println!("Not enough data for service outliers (need at least two records per service).");
        return;
    }
    let mut table = new_table(&["Service", "Subaccount", "Date", "Cost", "Service Mean", "Z-Score"]);
    for o in &report.outliers {
        table.add_row(vec![
            Cell::new(&o.service),
            Cell::new(&o.subaccount),
            Cell::new(o.date),
            amount_cell(money.format(o.cost)),
            amount_cell(money.format(o.mean)),
            amount_cell(format!("{:.2}", o.z_score)),
        ]);
    }
    println!("Top Cost Outliers");
    println!("{table}");
}

pub fn print_quota(report: &Report) {
    if report.quota.is_empty() {
        println!("No per-subaccount quota columns in this export.");
    } else {
        let mut table = new_table(&["Subaccount", "Used", "Quota", "Utilization", "Status"]);
        for q in &report.quota {
            table.add_row(vec![
                Cell::new(&q.subaccount),
                amount_cell(format_number(q.used)),
                amount_cell(format_number(q.total)),
                amount_cell(format!("{:.1}%", q.ratio * 100.0)),
                Cell::new(if q.over_quota { "OVER QUOTA" } else { "ok" }),
            ]);
        }
        println!("Quota Utilization");
        println!("{table}");
    }

    if report.quota_overview.is_empty() {
        println!("No quota information found in the first sheet of the workbook.");
        return;
    }
    let mut table = new_table(&["Date", "Usage (%)", "Type", "Status"]);
    for p in &report.quota_overview {
        table.add_row(vec![
            Cell::new(p.date),
            amount_cell(format!("{:.1}", p.usage_percent)),
            Cell::new(&p.kind),
            Cell::new(if p.over_quota() { "OVER QUOTA" } else { "ok" }),
        ]);
    }
    println!("Monthly Usage as % of Quota");
    println!("{table}");
    if report.quota_overview.iter().any(|p| p.over_quota()) {
        println!("Some months are at or above quota!");
    } else {
        println!("All months are within quota.");
    }
}

pub fn print_breakdown(report: &Report, top: usize, money: &Money) {
    for b in &report.breakdown {
        let title = format!("{}: {}", b.subaccount.key, money.format(b.subaccount.cost));
        print_aggregate(&title, "Service", &b.services, top, money);
    }
}

pub fn print_records(report: &Report, money: &Money) {
    let mut table = new_table(&["Date", "Subaccount", "Directory", "Service", "Labels", "Cost", "Usage"]);
    for r in &report.records {
        table.add_row(vec![
            Cell::new(r.date),
            Cell::new(&r.subaccount),
            Cell::new(r.directory.as_deref().unwrap_or("")),
            Cell::new(&r.service),
            Cell::new(r.labels.join(", ")),
            amount_cell(money.format(r.cost)),
            amount_cell(r.usage.map(format_number).unwrap_or_default()),
        ]);
    }
    println!("{table}");
}

pub fn print_options(options: &FilterOptions) {
    let mut table = new_table(&["Filter", "Values"]);
    table.add_row(vec![Cell::new("subaccount"), Cell::new(options.subaccounts.join("\n"))]);
    table.add_row(vec![Cell::new("service"), Cell::new(options.services.join("\n"))]);
    table.add_row(vec![Cell::new("directory"), Cell::new(options.directories.join("\n"))]);
    println!("{table}");
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
