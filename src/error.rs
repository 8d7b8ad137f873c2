//src/error.rs

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::AnnotationCategory;

/// Why a single line could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("expected at least {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("field '{field}' is not numeric: '{value}'")]
    NotNumeric { field: &'static str, value: String },

    #[error("end coordinate {end} is before start {start}")]
    InvertedCoordinates { start: u64, end: u64 },

    #[error("field '{field}' out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("field '{field}' is empty")]
    EmptyField { field: &'static str },

    #[error("field '{field}' has unexpected value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("line is not valid UTF-8 (invalid byte at offset {offset})")]
    NotUtf8 { offset: usize },
}

/// Fatal conditions. Any of these abandons the whole merge.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("{}:{line}: malformed record: {cause}", .file.display())]
    MalformedRecord {
        file: PathBuf,
        line: usize,
        cause: RecordError,
    },

    #[error(
        "{}: {malformed} of {total} data lines are malformed (limit {max_fraction}); first at line {first_line}: {first_cause}",
        .file.display()
    )]
    CorruptInputFile {
        file: PathBuf,
        malformed: usize,
        total: usize,
        max_fraction: f64,
        first_line: usize,
        first_cause: RecordError,
    },

    #[error("{}: {source}", .file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{tool} not found on PATH")]
    ToolNotFound { tool: String },

    #[error("{tool} failed (exit code: {code:?}): {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl MergeError {
    pub fn io(file: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            file: file.into(),
            source,
        }
    }
}

/// Non-fatal diagnostics collected during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeWarning {
    /// Equal confidence and equal specificity, different lineages.
    /// `kept` is the first one seen in the input.
    AmbiguousTaxonomy {
        query_id: String,
        kept: String,
        discarded: Vec<String>,
        confidence: f64,
    },
    /// A category input was not supplied, does not exist or holds no records.
    MissingCategoryInput {
        category: AnnotationCategory,
        file: Option<PathBuf>,
    },
    /// A malformed line that was skipped without failing the file.
    SkippedMalformed {
        file: PathBuf,
        line: usize,
        cause: RecordError,
    },
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeWarning::AmbiguousTaxonomy {
                query_id,
                kept,
                discarded,
                confidence,
            } => write!(
                f,
                "ambiguous taxonomy for {query_id} at confidence {confidence}: kept '{kept}', discarded {discarded:?}"
            ),
            MergeWarning::MissingCategoryInput { category, file } => match file {
                Some(path) => write!(
                    f,
                    "{category} input {} is missing or empty; every query gets '{}'",
                    path.display(),
                    crate::types::NO_HIT
                ),
                None => write!(
                    f,
                    "no {category} input given; every query gets '{}'",
                    crate::types::NO_HIT
                ),
            },
            MergeWarning::SkippedMalformed { file, line, cause } => {
                write!(f, "{}:{line}: skipped malformed record: {cause}", file.display())
            }
        }
    }
}
