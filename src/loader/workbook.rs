use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use tracing::debug;

use super::dates::DateParser;
use super::{Cell, Sheet, SheetReader};
use crate::error::LoadResult;

/// Reads every worksheet of an Excel/ODS workbook held in memory.
pub struct WorkbookReader {
    bytes: Vec<u8>,
}

impl WorkbookReader {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl SheetReader for WorkbookReader {
    fn read_sheets(&mut self) -> LoadResult<Vec<Sheet>> {
        let cursor = Cursor::new(std::mem::take(&mut self.bytes));
        let mut workbook = open_workbook_auto_from_rs(cursor)?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&name)?;
            debug!(sheet = %name, size = ?range.get_size(), "read worksheet");
            sheets.push(Sheet {
                name,
                rows: range_to_rows(&range),
            });
        }
        Ok(sheets)
    }
}

/// Expand a calamine range into a grid anchored at A1, so row and column
/// indices match the sheet regardless of where the used range starts.
fn range_to_rows(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; start_col as usize];
        cells.extend(row.iter().map(convert));
        rows.push(cells);
    }
    rows
}

fn convert(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => super::dates::from_excel_serial(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Empty),
        Data::DateTimeIso(s) => DateParser::default()
            .parse_text(s)
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        _ => Cell::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load_bytes, LoaderOptions, SourceFormat};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_xlsxwriter::Workbook;

    fn cost_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();

        let overview = workbook.add_worksheet().set_name("Overview").unwrap();
        overview.write_string(0, 0, "Global Account").unwrap();
        overview.write_string(16, 0, "2024-01-01").unwrap();
        overview.write_number(16, 1, 95.0).unwrap();
        overview.write_string(16, 2, "CPEA").unwrap();
        overview.write_string(17, 0, "2024-02-01").unwrap();
        overview.write_number(17, 1, 104.0).unwrap();
        overview.write_string(17, 2, "CPEA").unwrap();

        let info = workbook.add_worksheet().set_name("Info").unwrap();
        info.write_string(0, 0, "Exported from cockpit").unwrap();

        let cost = workbook.add_worksheet().set_name("Cost").unwrap();
        let headers = ["Subaccount ID", "Subaccount Name", "Service Name", "Start Date", "Cost", "Usage"];
        for (col, h) in headers.iter().enumerate() {
            cost.write_string(0, col as u16, *h).unwrap();
        }
        let rows = [
            ("id-a", "Dev", "HANA Cloud", 45292.0, 10.0, 1.0),
            ("id-b", "Prod", "Integration Suite", 45293.0, 20.0, 2.0),
            ("id-a", "Dev", "HANA Cloud", 45294.0, 5.5, 1.0),
        ];
        for (i, (id, name, service, date, amount, usage)) in rows.iter().enumerate() {
            let r = i as u32 + 1;
            cost.write_string(r, 0, *id).unwrap();
            cost.write_string(r, 1, *name).unwrap();
            cost.write_string(r, 2, *service).unwrap();
            cost.write_number(r, 3, *date).unwrap();
            cost.write_number(r, 4, *amount).unwrap();
            cost.write_number(r, 5, *usage).unwrap();
        }
        cost.write_string(4, 0, "id-b").unwrap();
        cost.write_string(4, 1, "Prod").unwrap();
        cost.write_string(4, 2, "HANA Cloud").unwrap();
        cost.write_string(4, 3, "someday").unwrap();
        cost.write_number(4, 4, 1.0).unwrap();

        let labels = workbook.add_worksheet().set_name("Labels").unwrap();
        labels.write_string(0, 0, "Subaccount ID").unwrap();
        labels.write_string(0, 1, "Key").unwrap();
        labels.write_string(0, 2, "Value").unwrap();
        labels.write_string(1, 0, "id-a").unwrap();
        labels.write_string(1, 1, "cost center").unwrap();
        labels.write_string(1, 2, "4711").unwrap();

        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn loads_a_cost_export_workbook() {
        let loaded = load_bytes(
            cost_workbook(),
            SourceFormat::Workbook,
            "export.xlsx",
            &LoaderOptions::default(),
        )
        .unwrap();

        let ds = &loaded.dataset;
        assert_eq!(loaded.diagnostics.sheet, "Cost");
        assert_eq!(ds.len(), 3);
        assert_eq!(loaded.diagnostics.rows_skipped, 1);
        assert_eq!(ds.records[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(ds.records[0].subaccount, "Dev");
        assert_eq!(ds.records[0].labels, vec!["cost center: 4711".to_string()]);
        assert_eq!(ds.records[1].usage, Some(2.0));
        assert_eq!(ds.quota_periods.len(), 2);
        assert!(ds.quota_periods[1].over_quota());
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let err = load_bytes(
            b"definitely not a workbook".to_vec(),
            SourceFormat::Workbook,
            "broken.xlsx",
            &LoaderOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::MalformedInputError::Unreadable(_)));
    }

    #[test]
    fn offset_ranges_keep_absolute_positions() {
        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.write_string(2, 1, "x").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheets = WorkbookReader::new(bytes).read_sheets().unwrap();
        let rows = &sheets[0].rows;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][1], Cell::Text("x".to_string()));
        assert_eq!(rows[2][0], Cell::Empty);
    }
}
