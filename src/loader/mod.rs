//! Spreadsheet ingestion.
//!
//! ```text
//!  .xlsx / .xls / .csv bytes
//!        │
//!        ▼
//!   ┌─────────────┐
//!   │ SheetReader │  xlsx (calamine) or csv → Vec<Sheet> of Cell grids
//!   └─────────────┘
//!        │
//!        ▼
//!   ┌─────────────┐
//!   │   schema    │  header row → ColumnMap (alias table)
//!   └─────────────┘
//!        │
//!        ▼
//!   ┌─────────────┐
//!   │  normalize  │  dates, amounts, labels → Dataset + Diagnostics
//!   └─────────────┘
//! ```

pub mod dates;
pub mod delimited;
pub mod schema;
pub mod workbook;

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::{LoadResult, MalformedInputError};
use crate::types::{Dataset, Diagnostics, QuotaPeriod, Record, SkipReason};
use dates::DateParser;
use schema::{ColumnMap, Field, Schema};

/// How many leading rows of a sheet are searched for the header row.
pub const HEADER_SCAN_ROWS: usize = 20;

const UNKNOWN: &str = "Unknown";

/// A single spreadsheet cell, independent of the file format it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Cell rendered as trimmed text; `None` when blank.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
            Cell::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    /// Numeric value of the cell. Text is parsed leniently: currency
    /// symbols, ISO codes and thousands separators are stripped, and
    /// `(12.50)` reads as `-12.50`.
    pub fn as_amount(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => n.is_finite().then_some(*n),
            Cell::Text(s) => parse_amount(s),
            _ => None,
        }
    }
}

pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    let mut negate = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        s = inner;
        negate = true;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '$' | '€' | '£' | '¥' | '%'))
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c.is_ascii_alphabetic());
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = normalize_separators(cleaned)?.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negate { -value } else { value })
}

/// Rewrite `1.234,50` / `1,234.50` / `12,50` into plain `1234.50` form.
///
/// The last of `.` and `,` is the decimal mark when both appear. A lone
/// comma is decimal only when one or two digits follow it; otherwise commas
/// group thousands. Thousands groups must be three digits wide, anything
/// else is rejected rather than guessed.
fn normalize_separators(s: &str) -> Option<String> {
    let (decimal, thousands) = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => (',', '.'),
        (None, Some(comma)) => {
            let frac = &s[comma + 1..];
            if s.matches(',').count() == 1 && (1..=2).contains(&frac.len()) {
                (',', '.')
            } else {
                ('.', ',')
            }
        }
        _ => ('.', ','),
    };

    let (int_part, frac_part) = match s.rfind(decimal) {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };

    let mut groups = int_part.split(thousands);
    let mut out = groups.next().unwrap_or_default().to_string();
    for group in groups {
        if group.len() != 3 || out.trim_start_matches('-').is_empty() {
            return None;
        }
        out.push_str(group);
    }
    if let Some(frac) = frac_part {
        if frac.contains(thousands) {
            return None;
        }
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}

/// One worksheet as a dense grid. Row and column indices are absolute
/// positions in the source sheet.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn is_blank(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(Cell::is_empty))
    }
}

/// Turns raw file bytes into sheets.
pub trait SheetReader {
    fn read_sheets(&mut self) -> LoadResult<Vec<Sheet>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Workbook,
    Csv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> LoadResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceFormat::Workbook),
            "csv" => Ok(SourceFormat::Csv),
            other => Err(MalformedInputError::UnsupportedFormat(other.to_string())),
        }
    }
}

fn reader_for(format: SourceFormat, bytes: Vec<u8>) -> Box<dyn SheetReader> {
    match format {
        SourceFormat::Workbook => Box::new(workbook::WorkbookReader::new(bytes)),
        SourceFormat::Csv => Box::new(delimited::CsvReader::new(bytes)),
    }
}

/// Knobs for turning sheets into records.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub schema: Schema,
    pub dates: DateParser,
    pub main_sheet: Option<String>,
    pub label_sheet: Option<String>,
    pub join_labels: bool,
    pub quota_skip_rows: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            schema: Schema::default(),
            dates: DateParser::default(),
            main_sheet: None,
            label_sheet: None,
            join_labels: true,
            quota_skip_rows: 16,
        }
    }
}

/// A freshly loaded dataset and the report of how it was built.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub dataset: Dataset,
    pub diagnostics: Diagnostics,
}

pub fn load_file(path: &Path, opts: &LoaderOptions) -> LoadResult<Loaded> {
    let format = SourceFormat::from_path(path)?;
    let bytes = std::fs::read(path)?;
    load_bytes(bytes, format, &path.display().to_string(), opts)
}

pub fn load_bytes(
    bytes: Vec<u8>,
    format: SourceFormat,
    source: &str,
    opts: &LoaderOptions,
) -> LoadResult<Loaded> {
    let sheets = reader_for(format, bytes).read_sheets()?;
    build(sheets, source, opts)
}

fn find_sheet(sheets: &[Sheet], name: &str) -> Option<usize> {
    sheets.iter().position(|s| s.name.eq_ignore_ascii_case(name))
}

struct MainTable {
    sheet: usize,
    header_row: usize,
    columns: ColumnMap,
}

fn locate_main(sheets: &[Sheet], opts: &LoaderOptions) -> LoadResult<MainTable> {
    let candidates: Vec<usize> = match &opts.main_sheet {
        Some(name) => vec![find_sheet(sheets, name)
            .ok_or_else(|| MalformedInputError::MissingSheet(name.clone()))?],
        None => (0..sheets.len()).collect(),
    };

    // (missing count, sheet index, first missing field) of the closest miss
    let mut best: Option<(usize, usize, Field)> = None;

    for idx in candidates {
        let sheet = &sheets[idx];
        for (r, row) in sheet.rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
            let columns = opts.schema.resolve(row);
            let missing = columns.missing_required();
            if missing.is_empty() {
                debug!(sheet = %sheet.name, header_row = r, "found cost table");
                return Ok(MainTable {
                    sheet: idx,
                    header_row: r,
                    columns,
                });
            }
            if best.map_or(true, |(n, _, _)| missing.len() < n) {
                best = Some((missing.len(), idx, missing[0]));
            }
        }
    }

    match best {
        Some((_, idx, field)) => Err(MalformedInputError::MissingColumn {
            column: field.display_name().to_string(),
            sheet: sheets[idx].name.clone(),
        }),
        None => Err(MalformedInputError::MissingColumn {
            column: Field::StartDate.display_name().to_string(),
            sheet: opts.main_sheet.clone().unwrap_or_default(),
        }),
    }
}

fn build(sheets: Vec<Sheet>, source: &str, opts: &LoaderOptions) -> LoadResult<Loaded> {
    if sheets.iter().all(Sheet::is_blank) {
        return Err(MalformedInputError::Empty(source.to_string()));
    }

    let main = locate_main(&sheets, opts)?;
    let main_sheet = &sheets[main.sheet];

    let label_idx = if opts.join_labels {
        label_sheet_index(&sheets, main.sheet, opts)
    } else {
        None
    };
    let labels = label_idx
        .map(|idx| read_label_sheet(&sheets[idx], &opts.schema))
        .unwrap_or_default();

    let quota_periods = if main.sheet != 0 && label_idx != Some(0) {
        read_quota_block(&sheets[0], opts)
    } else {
        Vec::new()
    };

    let mut diagnostics = Diagnostics {
        source: source.to_string(),
        sheet: main_sheet.name.clone(),
        labelled_subaccounts: labels.len(),
        quota_periods: quota_periods.len(),
        ..Default::default()
    };

    let mut records = Vec::new();
    for row in main_sheet.rows.iter().skip(main.header_row + 1) {
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        diagnostics.rows_read += 1;
        match normalize_row(row, &main.columns, &labels, opts) {
            Ok(record) => records.push(record),
            Err(reason) => diagnostics.record_skip(reason),
        }
    }

    info!(
        source,
        sheet = %diagnostics.sheet,
        kept = diagnostics.rows_kept(),
        skipped = diagnostics.rows_skipped,
        quota_periods = quota_periods.len(),
        "loaded cost export"
    );

    Ok(Loaded {
        dataset: Dataset {
            source: source.to_string(),
            records,
            quota_periods,
        },
        diagnostics,
    })
}

fn normalize_row(
    row: &[Cell],
    columns: &ColumnMap,
    labels: &HashMap<String, Vec<String>>,
    opts: &LoaderOptions,
) -> Result<Record, SkipReason> {
    let date = opts
        .dates
        .parse_cell(columns.cell(row, Field::StartDate))
        .ok_or(SkipReason::InvalidDate)?;

    let cost = columns
        .cell(row, Field::Cost)
        .as_amount()
        .ok_or(SkipReason::InvalidCost)?;
    if cost < 0.0 {
        return Err(SkipReason::NegativeCost);
    }

    let subaccount_id = columns.cell(row, Field::SubaccountId).as_text();
    let subaccount = columns
        .cell(row, Field::SubaccountName)
        .as_text()
        .or_else(|| subaccount_id.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let service = columns
        .cell(row, Field::ServiceName)
        .as_text()
        .unwrap_or_else(|| UNKNOWN.to_string());

    let mut record_labels: Vec<String> = Vec::new();
    if let Some(inline) = columns.cell(row, Field::Labels).as_text() {
        for label in inline.split([';', '|']).map(str::trim).filter(|l| !l.is_empty()) {
            push_unique(&mut record_labels, label.to_string());
        }
    }
    if let Some(joined) = subaccount_id.as_ref().and_then(|id| labels.get(id)) {
        for label in joined {
            push_unique(&mut record_labels, label.clone());
        }
    }

    Ok(Record {
        date,
        end_date: opts.dates.parse_cell(columns.cell(row, Field::EndDate)),
        subaccount,
        subaccount_id,
        directory: columns.cell(row, Field::Directory).as_text(),
        service,
        labels: record_labels,
        cost,
        usage: columns.cell(row, Field::Usage).as_amount(),
        quota_used: columns.cell(row, Field::QuotaUsed).as_amount(),
        quota_total: columns.cell(row, Field::QuotaTotal).as_amount(),
    })
}

fn push_unique(labels: &mut Vec<String>, label: String) {
    if !labels.contains(&label) {
        labels.push(label);
    }
}

/// The configured label sheet, else the last sheet when it is not the
/// cost table itself.
fn label_sheet_index(sheets: &[Sheet], main: usize, opts: &LoaderOptions) -> Option<usize> {
    if let Some(name) = &opts.label_sheet {
        let idx = find_sheet(sheets, name);
        if idx.is_none() {
            warn!(sheet = %name, "configured label sheet not found, skipping labels");
        }
        return idx;
    }
    let last = sheets.len().checked_sub(1)?;
    (last != main).then_some(last)
}

/// Read `Subaccount ID | Key | Value` rows into `id → ["Key: Value", ..]`.
/// Key and value columns are found by header name, falling back to the two
/// columns after the ID.
fn read_label_sheet(sheet: &Sheet, schema: &Schema) -> HashMap<String, Vec<String>> {
    let mut labels: HashMap<String, Vec<String>> = HashMap::new();

    let header = sheet.rows.iter().take(HEADER_SCAN_ROWS).enumerate().find_map(|(r, row)| {
        row.iter()
            .position(|c| {
                c.as_text()
                    .is_some_and(|t| schema.lookup(&t) == Some(Field::SubaccountId))
            })
            .map(|id_col| (r, id_col, row))
    });
    let Some((header_row, id_col, header_cells)) = header else {
        debug!(sheet = %sheet.name, "no subaccount id column, not a label sheet");
        return labels;
    };

    let named = |names: &[&str]| {
        header_cells.iter().position(|c| {
            c.as_text()
                .is_some_and(|t| names.contains(&schema::normalize_header(&t).as_str()))
        })
    };
    let key_col = named(&["key", "label key", "label name", "tag key", "label"]).unwrap_or(id_col + 1);
    let value_col = named(&["value", "label value", "tag value"]).unwrap_or(id_col + 2);

    for row in sheet.rows.iter().skip(header_row + 1) {
        let cell = |idx: usize| row.get(idx).and_then(Cell::as_text);
        let (Some(id), Some(key)) = (cell(id_col), cell(key_col)) else {
            continue;
        };
        let label = match cell(value_col) {
            Some(value) => format!("{key}: {value}"),
            None => key,
        };
        let entry = labels.entry(id).or_default();
        push_unique(entry, label);
    }

    debug!(sheet = %sheet.name, subaccounts = labels.len(), "read label sheet");
    labels
}

/// The quota overview block on the first sheet: `date | usage % | type`
/// starting at `quota_skip_rows`. Rows without a date or a percentage are
/// dropped.
fn read_quota_block(sheet: &Sheet, opts: &LoaderOptions) -> Vec<QuotaPeriod> {
    let mut periods: Vec<QuotaPeriod> = sheet
        .rows
        .iter()
        .skip(opts.quota_skip_rows)
        .filter_map(|row| {
            let first = row.first()?;
            if first.is_empty() {
                return None;
            }
            let date = opts.dates.parse_cell(first)?;
            let usage_percent = row.get(1)?.as_amount()?;
            let kind = row.get(2).and_then(Cell::as_text).unwrap_or_default();
            Some(QuotaPeriod {
                date,
                usage_percent,
                kind,
            })
        })
        .collect();
    periods.sort_by_key(|p| p.date);
    debug!(sheet = %sheet.name, periods = periods.len(), "read quota block");
    periods
}
