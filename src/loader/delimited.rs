use super::{Cell, Sheet, SheetReader};
use crate::error::LoadResult;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads a CSV export as a single sheet. Every field stays text; typing
/// happens during normalization, same as for workbook cells.
pub struct CsvReader {
    bytes: Vec<u8>,
}

impl CsvReader {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl SheetReader for CsvReader {
    fn read_sheets(&mut self) -> LoadResult<Vec<Sheet>> {
        let data = self.bytes.strip_prefix(UTF8_BOM).unwrap_or(&self.bytes[..]);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|field| {
                        if field.trim().is_empty() {
                            Cell::Empty
                        } else {
                            Cell::Text(field.to_string())
                        }
                    })
                    .collect(),
            );
        }

        Ok(vec![Sheet {
            name: "csv".to_string(),
            rows,
        }])
    }
}
