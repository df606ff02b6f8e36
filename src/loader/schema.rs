use std::collections::BTreeMap;

use serde::Deserialize;

use super::Cell;

/// Canonical columns of a cost export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    StartDate,
    EndDate,
    SubaccountName,
    SubaccountId,
    Directory,
    ServiceName,
    Labels,
    Cost,
    Usage,
    QuotaUsed,
    QuotaTotal,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::StartDate,
        Field::EndDate,
        Field::SubaccountName,
        Field::SubaccountId,
        Field::Directory,
        Field::ServiceName,
        Field::Labels,
        Field::Cost,
        Field::Usage,
        Field::QuotaUsed,
        Field::QuotaTotal,
    ];

    /// Column name as it appears in the SAP BTP export.
    pub fn display_name(self) -> &'static str {
        match self {
            Field::StartDate => "Start Date",
            Field::EndDate => "End Date",
            Field::SubaccountName => "Subaccount Name",
            Field::SubaccountId => "Subaccount ID",
            Field::Directory => "Directory",
            Field::ServiceName => "Service Name",
            Field::Labels => "Labels",
            Field::Cost => "Cost",
            Field::Usage => "Usage",
            Field::QuotaUsed => "Quota Used",
            Field::QuotaTotal => "Quota Total",
        }
    }

    /// Built-in header variants, already in normalized form.
    fn default_aliases(self) -> &'static [&'static str] {
        match self {
            Field::StartDate => &["start date", "date", "period start", "from date", "month"],
            Field::EndDate => &["end date", "period end", "to date"],
            Field::SubaccountName => &["subaccount name", "subaccount", "sub account name", "sub account"],
            Field::SubaccountId => &["subaccount id", "subaccount guid", "sub account id"],
            Field::Directory => &["directory", "directory name", "directory id"],
            Field::ServiceName => &["service name", "service", "service technical name"],
            Field::Labels => &["labels", "label", "tags"],
            Field::Cost => &["cost", "costs", "cost usd", "cost eur", "amount", "total cost"],
            Field::Usage => &["usage", "usage amount", "quantity", "consumption"],
            Field::QuotaUsed => &["quota used", "used quota", "quota usage"],
            Field::QuotaTotal => &["quota total", "quota", "total quota", "entitlement", "quota limit"],
        }
    }
}

/// Lowercase, collapse every run of non-alphanumerics into one space, trim.
/// `"  Cost (USD) "` becomes `"cost usd"`.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

fn squash(normalized: &str) -> String {
    normalized.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Header variant → canonical field lookup table.
#[derive(Debug, Clone)]
pub struct Schema {
    aliases: Vec<(String, Field)>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::with_extra_aliases(&BTreeMap::new())
    }
}

impl Schema {
    /// Built-in table plus user-configured variants. Configured variants are
    /// checked first so they can claim a header a built-in alias would take.
    pub fn with_extra_aliases(extra: &BTreeMap<Field, Vec<String>>) -> Self {
        let mut aliases = Vec::new();
        for (field, variants) in extra {
            for v in variants {
                aliases.push((normalize_header(v), *field));
            }
        }
        for field in Field::ALL {
            for alias in field.default_aliases() {
                aliases.push((alias.to_string(), field));
            }
        }
        Self { aliases }
    }

    /// Resolve one header. Exact normalized match first, then a pass that
    /// ignores spaces (`StartDate`, `start_date`).
    pub fn lookup(&self, header: &str) -> Option<Field> {
        let normalized = normalize_header(header);
        if normalized.is_empty() {
            return None;
        }
        if let Some((_, field)) = self.aliases.iter().find(|(a, _)| *a == normalized) {
            return Some(*field);
        }
        let squashed = squash(&normalized);
        self.aliases
            .iter()
            .find(|(a, _)| squash(a) == squashed)
            .map(|(_, field)| *field)
    }

    /// Map a header row to column positions. The first column claiming a
    /// field wins.
    pub fn resolve(&self, header_row: &[Cell]) -> ColumnMap {
        let mut positions = BTreeMap::new();
        for (idx, cell) in header_row.iter().enumerate() {
            let Some(text) = cell.as_text() else {
                continue;
            };
            if let Some(field) = self.lookup(&text) {
                positions.entry(field).or_insert(idx);
            }
        }
        ColumnMap { positions }
    }
}

/// Resolved column positions for one header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    positions: BTreeMap<Field, usize>,
}

impl ColumnMap {
    pub fn get(&self, field: Field) -> Option<usize> {
        self.positions.get(&field).copied()
    }

    pub fn cell<'a>(&self, row: &'a [Cell], field: Field) -> &'a Cell {
        self.get(field)
            .and_then(|idx| row.get(idx))
            .unwrap_or(&Cell::Empty)
    }

    /// Required fields this header lacks, in a stable order. A subaccount ID
    /// column can stand in for a missing name column.
    pub fn missing_required(&self) -> Vec<Field> {
        let mut missing = Vec::new();
        if self.get(Field::StartDate).is_none() {
            missing.push(Field::StartDate);
        }
        if self.get(Field::SubaccountName).is_none() && self.get(Field::SubaccountId).is_none() {
            missing.push(Field::SubaccountName);
        }
        if self.get(Field::ServiceName).is_none() {
            missing.push(Field::ServiceName);
        }
        if self.get(Field::Cost).is_none() {
            missing.push(Field::Cost);
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn headers(names: &[&str]) -> Vec<Cell> {
        names.iter().map(|n| Cell::Text(n.to_string())).collect()
    }

    #[test]
    fn normalizes_spacing_case_and_punctuation() {
        assert_eq!(normalize_header("  Cost (USD) "), "cost usd");
        assert_eq!(normalize_header("Start_Date"), "start date");
        assert_eq!(normalize_header("SUBACCOUNT   NAME"), "subaccount name");
        assert_eq!(normalize_header("---"), "");
    }

    #[test]
    fn looks_up_export_headers() {
        let schema = Schema::default();
        assert_eq!(schema.lookup("Start Date"), Some(Field::StartDate));
        assert_eq!(schema.lookup("start_date"), Some(Field::StartDate));
        assert_eq!(schema.lookup("StartDate"), Some(Field::StartDate));
        assert_eq!(schema.lookup("Subaccount ID"), Some(Field::SubaccountId));
        assert_eq!(schema.lookup("Cost (USD)"), Some(Field::Cost));
        assert_eq!(schema.lookup("Region"), None);
    }

    #[test]
    fn configured_aliases_take_priority() {
        let mut extra = BTreeMap::new();
        extra.insert(Field::Cost, vec!["Betrag".to_string()]);
        extra.insert(Field::Usage, vec!["Amount".to_string()]);
        let schema = Schema::with_extra_aliases(&extra);
        assert_eq!(schema.lookup("BETRAG"), Some(Field::Cost));
        assert_eq!(schema.lookup("amount"), Some(Field::Usage));
    }

    #[test]
    fn resolve_reports_missing_required_columns() {
        let schema = Schema::default();
        let map = schema.resolve(&headers(&["Start Date", "Service Name", "Usage"]));
        assert_eq!(map.missing_required(), vec![Field::SubaccountName, Field::Cost]);

        let map = schema.resolve(&headers(&["Date", "Subaccount ID", "Service", "Cost"]));
        assert!(map.missing_required().is_empty());
        assert_eq!(map.get(Field::SubaccountId), Some(1));
    }

    #[test]
    fn first_matching_column_wins() {
        let schema = Schema::default();
        let map = schema.resolve(&headers(&["Cost", "Total Cost"]));
        assert_eq!(map.get(Field::Cost), Some(0));
    }
}
