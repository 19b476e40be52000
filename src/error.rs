//! Error types for runledger
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Runledger error types
#[derive(Error, Debug)]
pub enum Error {
    /// Parameter name collides with an identifier of the `ParameterSet` surface
    #[error("Cannot use '{0}' as a parameter name: it is reserved\nPick another name (see runledger::params::RESERVED_NAMES)")]
    ReservedName(String),

    /// Resolution requested for a parameter that was never added
    #[error("Unknown parameter: '{0}' is not in this parameter set")]
    UnknownParameter(String),

    /// Directive sentinel present but the verb is not recognized
    #[error("Unsupported directive: {0}\nSupported forms are !uni(a,b), !rint(a,b) and !eval(expr)")]
    UnsupportedDirective(String),

    /// Recognized verb but the arguments do not parse
    #[error("Malformed directive {directive}: {reason}")]
    MalformedDirective {
        /// Raw directive string
        directive: String,
        /// What failed to parse
        reason: String,
    },

    /// `!eval` directive compiled without the capability flag
    #[error("Expression directive {0} rejected: !eval is disabled\nEnable it explicitly with ParameterSet::builder().allow_eval(true)")]
    EvalDisabled(String),

    /// Expression evaluated to something that is not a usable value
    #[error("Expression evaluation failed: {0}")]
    Evaluation(String),

    /// A result filename's run-ID prefix is not an integer
    #[error("Result file {file} in {dir} does not start with an integer run ID\nRemove it or add it to the ignore list")]
    NonIntegerPrefix {
        /// Offending filename
        file: String,
        /// Result directory being scanned
        dir: PathBuf,
    },

    /// Run ID space of a result directory is used up
    #[error("No run ID left in {0}: the largest ID is already u64::MAX\nMove results with oversized prefixes out of the directory")]
    IdExhausted(PathBuf),

    /// Run directory lock could not be acquired in time
    #[error("Timed out waiting for run lock {0}\nAnother process is still saving results; retry or raise the lock timeout")]
    LockTimeout(PathBuf),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Persisted run log is unreadable
    #[error("Run log error: {0}")]
    Log(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error (CSV log encoding)
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn malformed(directive: &str, reason: impl Into<String>) -> Self {
        Self::MalformedDirective {
            directive: directive.to_string(),
            reason: reason.into(),
        }
    }
}
