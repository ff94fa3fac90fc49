use camino::Utf8PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EtlError {
    #[error("invalid id range: {0}")]
    InvalidIdRange(String),

    #[error("invalid table id: {0}")]
    InvalidTableId(String),

    #[error("invalid blob key: {0}")]
    InvalidBlobKey(String),

    #[error("config file not found: {0}")]
    MissingConfig(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("species API request failed: {0}")]
    SpeciesHttp(String),

    #[error("species API returned status {status}: {message}")]
    SpeciesStatus { status: u16, message: String },

    #[error("malformed species payload: {0}")]
    SpeciesPayload(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("blob not found: {bucket}/{key}")]
    BlobNotFound { bucket: String, key: String },

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("dataset is empty, nothing to clean")]
    EmptyDataset,

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("malformed row {row}, column {column}: {reason}")]
    MalformedRow {
        row: usize,
        column: String,
        reason: String,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
