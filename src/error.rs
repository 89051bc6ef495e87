use thiserror::Error;

use crate::diagnostics::{self, ErrorKind};

/// Convenience result type for table, schema and validation operations.
pub type TableResult<T> = Result<T, TableError>;

/// Error type returned by fallible operations across the crate.
///
/// Configuration errors (schema, dialect, options) are detected before any row is read.
/// Source errors (I/O, scheme, format, encoding, compression, parser failures) abort
/// [`crate::table::Table::open`] or end a row stream. Everything else that can go wrong
/// with the *data* is reported as a [`crate::diagnostics::Diagnostic`] instead.
#[derive(Debug, Error)]
pub enum TableError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel parsing error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV parsing error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing or descriptor error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML descriptor error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The schema descriptor is malformed or violates a schema invariant.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// The dialect descriptor is malformed.
    #[error("dialect error: {message}")]
    Dialect { message: String },

    /// Options (layout filters, detector, check descriptors) are malformed.
    #[error("options error: {message}")]
    Options { message: String },

    /// No loader is registered for the scheme.
    #[error("scheme error: {message}")]
    Scheme { message: String },

    /// No parser is registered for the format, or the format cannot be inferred.
    #[error("format error: {message}")]
    Format { message: String },

    /// The source bytes cannot be decoded with the resolved encoding.
    #[error("encoding error: {message}")]
    Encoding { message: String },

    /// The compressed source cannot be decompressed.
    #[error("compression error: {message}")]
    Compression { message: String },

    /// The source is structurally unreadable by the selected parser.
    #[error("source error: {message}")]
    Source { message: String },

    /// A table operation was called in the wrong lifecycle state.
    #[error("table is not open")]
    NotOpen,
}

impl TableError {
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub(crate) fn dialect(message: impl Into<String>) -> Self {
        Self::Dialect {
            message: message.into(),
        }
    }

    pub(crate) fn options(message: impl Into<String>) -> Self {
        Self::Options {
            message: message.into(),
        }
    }

    pub(crate) fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Diagnostic kind used when this error is folded into a report.
    pub fn kind(&self) -> &'static ErrorKind {
        match self {
            Self::Schema { .. } => &diagnostics::SCHEMA_ERROR,
            Self::Dialect { .. } => &diagnostics::DIALECT_ERROR,
            Self::Options { .. } => &diagnostics::TASK_ERROR,
            Self::Scheme { .. } => &diagnostics::SCHEME_ERROR,
            Self::Format { .. } => &diagnostics::FORMAT_ERROR,
            Self::Encoding { .. } => &diagnostics::ENCODING_ERROR,
            Self::Compression { .. } => &diagnostics::COMPRESSION_ERROR,
            Self::Io(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                &diagnostics::ENCODING_ERROR
            }
            Self::Csv(err) if is_decoding_failure(err) => &diagnostics::ENCODING_ERROR,
            Self::Io(_) | Self::Source { .. } | Self::Csv(_) => &diagnostics::SOURCE_ERROR,
            Self::Json(_) | Self::Yaml(_) => &diagnostics::SOURCE_ERROR,
            #[cfg(feature = "excel")]
            Self::Excel(_) => &diagnostics::SOURCE_ERROR,
            Self::NotOpen => &diagnostics::TASK_ERROR,
        }
    }

    /// Human-readable note without the variant prefix.
    pub fn note(&self) -> String {
        match self {
            Self::Schema { message }
            | Self::Dialect { message }
            | Self::Options { message }
            | Self::Scheme { message }
            | Self::Format { message }
            | Self::Encoding { message }
            | Self::Compression { message }
            | Self::Source { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Wrap this error into a task-level diagnostic.
    pub fn to_diagnostic(&self) -> diagnostics::Diagnostic {
        diagnostics::Diagnostic::new(self.kind(), self.note())
    }
}

fn is_decoding_failure(err: &csv::Error) -> bool {
    match err.kind() {
        csv::ErrorKind::Io(io) => io.kind() == std::io::ErrorKind::InvalidData,
        csv::ErrorKind::Utf8 { .. } => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_failure() {
        assert_eq!(TableError::schema("x").kind().code, "schema-error");
        let invalid = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad byte");
        assert_eq!(TableError::from(invalid).kind().code, "encoding-error");
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(TableError::from(missing).kind().code, "source-error");
        assert_eq!(TableError::schema("bad field").to_diagnostic().note, "bad field");
    }
}
