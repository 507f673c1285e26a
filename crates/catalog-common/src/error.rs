//! Error types shared across the catalog workspace

use thiserror::Error;

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Base error type for the catalog pipeline
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::JobNotFound("abc-123".to_string());
        assert_eq!(err.to_string(), "Job not found: abc-123");

        let err = CatalogError::Parse("bad header row".to_string());
        assert_eq!(err.to_string(), "Parse error: bad header row");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CatalogError = io.into();
        assert!(matches!(err, CatalogError::Io(_)));
    }
}
