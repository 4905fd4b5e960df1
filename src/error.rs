//! Error taxonomy for annotation runs.
//!
//! Errors fall in two groups. Fatal errors (configuration, schema, sort
//! order, I/O, parse) abort the run. Per-record errors (aggregation, match,
//! scripting) are routed through the [`ErrorReporter`](crate::report::ErrorReporter)
//! and never drop the record they arose from.

use std::io;
use thiserror::Error;

/// Errors that can occur while configuring or running an annotation join.
#[derive(Error, Debug)]
pub enum AnnoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("{file} not sorted: {message}")]
    OutOfOrder { file: String, message: String },

    #[error("aggregation error: {0}")]
    Aggregation(String),

    #[error("match error: {0}")]
    Match(String),

    #[error("scripting error: {0}")]
    Scripting(String),
}

impl AnnoError {
    /// Returns true if this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AnnoError::Aggregation(_) | AnnoError::Match(_) | AnnoError::Scripting(_)
        )
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        AnnoError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AnnoError>;
