//! Error types for dbtgen.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// The main error type for model transformation.
#[derive(Debug, Error)]
pub enum DbtGenError {
    /// The model text has no usable `select ... from` column list.
    #[error("Malformed input at position {position}: {message}")]
    MalformedInput { position: usize, message: String },

    /// Every column was removed by the rule set.
    #[error("Empty projection: all {dropped} column(s) were dropped")]
    EmptyProjection { dropped: usize },

    /// The transform file is structurally invalid.
    #[error("Invalid transform spec: {0}")]
    InvalidTransformSpec(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A batch worker panicked or was cancelled.
    #[error("Worker failed: {0}")]
    Worker(String),

    /// An error raised while processing one model file.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<DbtGenError>,
    },
}

impl DbtGenError {
    /// Create a malformed input error at the given byte offset.
    pub fn malformed(position: usize, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            position,
            message: message.into(),
        }
    }

    /// Attach the identity of the file being processed.
    pub fn in_file(path: impl AsRef<Path>, err: DbtGenError) -> Self {
        match err {
            // Already attributed; keep the innermost path.
            err @ Self::File { .. } => err,
            err => Self::File {
                path: path.as_ref().to_path_buf(),
                source: Box::new(err),
            },
        }
    }

    /// The underlying error, with any file attribution stripped.
    pub fn root(&self) -> &DbtGenError {
        match self {
            Self::File { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for dbtgen operations.
pub type DbtGenResult<T> = Result<T, DbtGenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbtGenError::malformed(5, "no from clause");
        assert_eq!(
            err.to_string(),
            "Malformed input at position 5: no from clause"
        );
    }

    #[test]
    fn test_file_attribution() {
        let err = DbtGenError::in_file(
            "models/accounts.sql",
            DbtGenError::EmptyProjection { dropped: 3 },
        );
        assert_eq!(
            err.to_string(),
            "models/accounts.sql: Empty projection: all 3 column(s) were dropped"
        );
        assert!(matches!(err.root(), DbtGenError::EmptyProjection { dropped: 3 }));

        // Re-wrapping keeps the original path.
        let rewrapped = DbtGenError::in_file("other.sql", err);
        assert!(rewrapped.to_string().starts_with("models/accounts.sql"));
    }
}
