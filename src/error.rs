use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundlecovError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source map error: {0}")]
    SourceMap(#[from] sourcemap::Error),

    #[error("Invalid mapping: generated line {line} is beyond the last line ({max_line})")]
    InvalidMappingLine { line: u32, max_line: usize },

    #[error(
        "Invalid mapping: column {column} on generated line {line} is beyond the line length ({max_column})"
    )]
    InvalidMappingColumn {
        line: u32,
        column: u32,
        max_column: usize,
    },

    #[error("Coverage samples disagree on script length: expected {expected}, sample {sample} reports {actual}")]
    CoverageLengthMismatch {
        expected: usize,
        actual: usize,
        sample: usize,
    },

    #[error("Coverage sample {sample} reports {length} bytes but the script has only {content_length}")]
    CoverageOutOfBounds {
        length: usize,
        content_length: usize,
        sample: usize,
    },

    #[error("No coverage samples to reconcile")]
    NoCoverageSamples,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl BundlecovError {
    /// Consistency errors abort a script's analysis; callers usually skip
    /// the script and keep going.
    #[must_use]
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            BundlecovError::CoverageLengthMismatch { .. } | BundlecovError::CoverageOutOfBounds { .. }
        )
    }

    /// Errors raised only by strict mapping validation.
    #[must_use]
    pub fn is_invalid_mapping(&self) -> bool {
        matches!(
            self,
            BundlecovError::InvalidMappingLine { .. } | BundlecovError::InvalidMappingColumn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BundlecovError>;
