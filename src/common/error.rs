//! Error types for the sweep harness
//!
//! Messages are meant to be read by whoever launched the run, so they name
//! the offending value or path and hint at the fix where one exists.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sweep harness
#[derive(Error, Debug)]
pub enum Error {
    // === Sweep Errors ===
    #[error("Invalid sweep specification: {0}")]
    InvalidSweepSpec(String),

    // === Process Errors ===
    #[error("Failed to launch '{program}': {reason}")]
    Launch { program: String, reason: String },

    #[error("Invocation {index} timed out after {secs:.1} seconds and was killed")]
    Timeout { index: usize, secs: f64 },

    #[error("Invocation {index} failed: {reason}")]
    InvocationFailed { index: usize, reason: String },

    // === Output Errors ===
    #[error("Result slot {0} was written twice")]
    DuplicateSlot(usize),

    #[error("Result slot {index} is out of range for a sweep of {len} values")]
    SlotOutOfRange { index: usize, len: usize },

    // === Batch Errors ===
    #[error("Failed to rename '{from}' to '{to}': {reason}")]
    Rename {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Batch program exited with code {0:?}; output was not archived")]
    BatchFailed(Option<i32>),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Failed to write file '{path}': {error}")]
    FileWrite { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Captured text that did not contain two numeric tokens
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Expected two numbers in output, found {found}: {raw_text:?}")]
pub struct ParseError {
    /// The text exactly as it was captured
    pub raw_text: String,
    /// Number of numeric tokens that were found
    pub found: usize,
}

impl Error {
    /// Create a launch error for a program path
    pub fn launch(program: &str, reason: impl ToString) -> Self {
        Self::Launch {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a rename error
    pub fn rename(from: &std::path::Path, to: &std::path::Path, reason: impl ToString) -> Self {
        Self::Rename {
            from: from.display().to_string(),
            to: to.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message_shows_raw_text() {
        let err = ParseError {
            raw_text: "no numbers here".to_string(),
            found: 0,
        };
        assert_eq!(
            err.to_string(),
            "Expected two numbers in output, found 0: \"no numbers here\""
        );
    }

    #[test]
    fn test_rename_error_names_both_paths() {
        let err = Error::rename(
            std::path::Path::new("area_files.out"),
            std::path::Path::new("area_files.out2"),
            "permission denied",
        );
        assert_eq!(
            err.to_string(),
            "Failed to rename 'area_files.out' to 'area_files.out2': permission denied"
        );
    }
}
