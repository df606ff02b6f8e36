use thiserror::Error;

/// Structural problems that stop a file from becoming a dataset.
///
/// Row-level problems (a bad date, a non-numeric cost) never end up here;
/// they are counted in [`crate::types::Diagnostics`] instead.
#[derive(Error, Debug)]
pub enum MalformedInputError {
    #[error("missing required column '{column}' in sheet '{sheet}'")]
    MissingColumn { column: String, sheet: String },

    #[error("sheet '{0}' not found in workbook")]
    MissingSheet(String),

    #[error("could not read spreadsheet: {0}")]
    Unreadable(String),

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    #[error("no tabular data found in {0}")]
    Empty(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<calamine::Error> for MalformedInputError {
    fn from(e: calamine::Error) -> Self {
        MalformedInputError::Unreadable(e.to_string())
    }
}

impl From<csv::Error> for MalformedInputError {
    fn from(e: csv::Error) -> Self {
        MalformedInputError::Unreadable(e.to_string())
    }
}

pub type LoadResult<T> = Result<T, MalformedInputError>;
