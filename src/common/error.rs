//! Error types for infratest
//!
//! Messages are meant to be read by someone staring at a failed CI job, so
//! they name the step, command or file involved and, where it helps, hint at
//! how to fix the problem.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for infratest
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid flow '{path}': {message}")]
    FlowParse { path: String, message: String },

    #[error("Unknown step type '{0}'. Supported types: terraform, terraform-inventory, http")]
    UnknownStepType(String),

    #[error("Step {step} depends on {after} which hasn't been executed")]
    Dependency { step: String, after: String },

    #[error("Unsupported report format: {0}")]
    UnsupportedReportFormat(String),

    // === Execution Errors ===
    #[error("Terraform binary not found in PATH")]
    TerraformNotFound,

    #[error("Working directory does not exist: {0}")]
    WorkingDirMissing(String),

    #[error("terraform command failed (exit code: {exit_code}): {command}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        /// Combined stdout and stderr of the failed command
        output: String,
    },

    #[error("command {index}/{total} failed: {source}")]
    CommandInSequence {
        index: usize,
        total: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to read terraform {what}: {message}")]
    ToolOutput { what: &'static str, message: String },

    #[error("HTTP check failed after {retries} retries: {message}")]
    Http { retries: u32, message: String },

    #[error("expected status {expected}, got {actual}")]
    HttpStatus { expected: u16, actual: u16 },

    // === Assertion Errors ===
    #[error("Inventory check failed:\n  - {}", .0.join("\n  - "))]
    Inventory(Vec<String>),

    // === Infrastructure Errors ===
    #[error("execution cancelled")]
    Cancelled,

    #[error("cleanup timeout after {0:?}")]
    CleanupTimeout(Duration),

    #[error("cleanup failed: {0} step(s) failed")]
    CleanupFailed(usize),

    #[error("LocalStack not available at {endpoint}: {message}")]
    LocalStackUnavailable { endpoint: String, message: String },

    #[error("step {step} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<Error>,
    },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error classes, used to pick the failure banner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed flow, unknown step type, unmet dependency
    Configuration,
    /// External command or HTTP failure
    Execution,
    /// Inventory or attribute mismatch
    Assertion,
    /// Cancellation or cleanup trouble
    Infrastructure,
}

impl Error {
    /// Wrap an error with the name of the step that produced it
    pub fn step(step: &str, source: Error) -> Self {
        Self::Step {
            step: step.to_string(),
            source: Box::new(source),
        }
    }

    /// Create a dependency error
    pub fn dependency(step: &str, after: &str) -> Self {
        Self::Dependency {
            step: step.to_string(),
            after: after.to_string(),
        }
    }

    /// Create a flow parse error for a given file
    pub fn flow_parse(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::FlowParse {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::FlowParse { .. }
            | Error::UnknownStepType(_)
            | Error::Dependency { .. }
            | Error::UnsupportedReportFormat(_) => ErrorCategory::Configuration,
            Error::Inventory(_) => ErrorCategory::Assertion,
            Error::Cancelled
            | Error::CleanupTimeout(_)
            | Error::CleanupFailed(_) => ErrorCategory::Infrastructure,
            Error::Step { source, .. } | Error::CommandInSequence { source, .. } => {
                source.category()
            }
            _ => ErrorCategory::Execution,
        }
    }

    /// Output captured from a failed command, if this error carries one
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { output, .. } => Some(output),
            Error::Step { source, .. } | Error::CommandInSequence { source, .. } => {
                source.command_output()
            }
            _ => None,
        }
    }

    /// Whether this error (or the error it wraps) is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Step { source, .. } | Error::CommandInSequence { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }
}
