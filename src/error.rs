//! Error taxonomy for cold-start analysis
//!
//! Only [`AnalysisError`] ever leaves the engine. Per-event failures
//! ([`EventError`]) are caught by the correlator, counted and dropped.
//! [`SectionError`] belongs to the `.coldstart` reader.

use thiserror::Error;

/// Unrecoverable outcome of one analysis run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// No request-start event in the whole feed matched the URL filter
    #[error("no cold start request window found (url filter: {filter})")]
    NoWindowFound { filter: String },
}

/// A single event whose payload did not carry what its kind requires
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("payload field '{field}' is missing")]
    MissingField { field: String },

    #[error("payload field '{field}' has unexpected type (wanted {expected})")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },
}

/// A `.coldstart` document section that couldn't be read
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SectionError {
    #[error("section '{header}' not found")]
    MissingSection { header: &'static str },

    #[error("line {line} of section '{header}' is not a `name : value` row: {text}")]
    MalformedRow {
        header: &'static str,
        line: usize,
        text: String,
    },
}

impl EventError {
    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }

    pub(crate) fn mismatch(field: &str, expected: &'static str) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            expected,
        }
    }
}
