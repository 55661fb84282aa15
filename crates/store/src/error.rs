use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// SQLite error (open, query, commit).
    Sqlite(String),
    /// Stored row that no longer decodes (schema drift, hand edits).
    Corrupt { table: String, detail: String },
    /// Value that cannot be encoded for storage.
    Encode(String),
    /// Missing required column in an input CSV.
    MissingColumn { file: String, column: String },
    /// IO error (directory scan, file read).
    Io(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(msg) => write!(f, "sqlite error: {msg}"),
            Self::Corrupt { table, detail } => {
                write!(f, "corrupt row in '{table}': {detail}")
            }
            Self::Encode(msg) => write!(f, "encode error: {msg}"),
            Self::MissingColumn { file, column } => {
                write!(f, "file '{file}': missing column '{column}'")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(err.to_string())
    }
}
