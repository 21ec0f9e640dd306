use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use parquet::errors::ParquetError;
use thiserror::Error;
use url::ParseError;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("source unavailable for {stream} stream: {message}")]
    SourceUnavailable { stream: String, message: String },

    #[error("schema mismatch in {stream} stream: {message}")]
    SchemaMismatch { stream: String, message: String },

    #[error("write failure for table '{table}': {message}")]
    WriteFailure { table: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("{0}")]
    Other(String),
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::Storage(format!("Object store error: {}", err))
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidInput(format!("URL parse error: {}", err))
    }
}

impl Error {
    /// True when the underlying cause is a missing object or prefix.
    pub fn is_not_found(err: &object_store::Error) -> bool {
        matches!(err, object_store::Error::NotFound { .. })
    }
}
