//! Error types.
//!
//! Only parse-time problems and document/configuration failures are errors. Everything that
//! goes wrong while processing a single selection is reported as
//! [`Outcome::Failure`](crate::Outcome::Failure) instead.

use std::ops::Range;
use std::path::PathBuf;
use thiserror::Error;

/// A malformed command string. The `Display` text is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The command is empty or only whitespace.
    #[error("The given command cannot be empty.")]
    EmptyCommand,

    /// A `#` command with nothing after the marker.
    #[error("The given shell command cannot be empty.")]
    EmptyShellCommand,

    /// Input ended inside an escape sequence or before the pattern was closed.
    #[error("Unexpected end of RegExp.")]
    UnexpectedEndOfRegex,

    /// A flag other than `m`, `i` or `g`.
    #[error("Unknown flag '{0}'.")]
    UnknownFlag(char),

    /// The pattern did not compile.
    #[error("Invalid RegExp.")]
    InvalidRegex,

    /// A substitution without a replacement where one is required.
    #[error("Missing replacement part in RegExp.")]
    MissingReplacement,

    /// The expression did not parse.
    #[error("Invalid expression.")]
    InvalidExpression,
}

/// A document refused an edit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// Two ranges of one multi-range edit overlap.
    #[error("overlapping edits: {first:?} and {second:?}")]
    OverlappingEdits {
        /// The earlier range (character offsets).
        first: Range<usize>,
        /// The range overlapping it.
        second: Range<usize>,
    },

    /// The host document rejected the edit.
    #[error("edit rejected: {0}")]
    Rejected(String),
}

/// Applying pipeline results failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The number of outcomes does not match the number of selections.
    #[error("expected {expected} outcomes, got {actual}")]
    OutcomeCountMismatch {
        /// Number of selections.
        expected: usize,
        /// Number of outcomes.
        actual: usize,
    },

    /// The command could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The document rejected the edit.
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Io {
        /// Path of the settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The settings are not valid JSON.
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The settings root is not an object.
    #[error("settings must be a JSON object")]
    NotAnObject,
}
