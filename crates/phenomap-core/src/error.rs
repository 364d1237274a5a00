use std::path::PathBuf;

/// Errors raised while loading inputs or configuring a metric run.
///
/// Per-item exclusions (no negatives, no positives, degenerate null shapes)
/// are not errors; they surface as absent rows. Everything here aborts the
/// configuration being processed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading or writing a file failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// File that was being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file was readable but its contents could not be interpreted.
    #[error("malformed input in {}: {detail}", path.display())]
    Malformed {
        /// File containing the bad content.
        path: PathBuf,
        /// What was wrong.
        detail: String,
    },

    /// A column required by the configuration is absent from a table.
    #[error("missing column '{column}'")]
    MissingColumn {
        /// Name of the absent column.
        column: String,
    },

    /// A stage produced no rows to work with.
    #[error("empty input: {what}")]
    EmptyInput {
        /// Which stage or table was empty.
        what: String,
    },

    /// Feature matrix and metadata disagree in shape, or a value is unusable.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Configuration values outside their allowed range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization of configuration or manifests failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout phenomap-core.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn missing_column(column: &str) -> Self {
        Self::MissingColumn {
            column: column.to_string(),
        }
    }

    pub(crate) fn empty(what: impl Into<String>) -> Self {
        Self::EmptyInput { what: what.into() }
    }
}
