use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BatchError {
    #[error("invalid template {template:?}: {reason}")]
    #[diagnostic(help("use {{date}} for YYYYMMDD or {{yymmdd}} for YYMMDD"))]
    Template { template: String, reason: String },

    #[error("invalid date spec: {0}")]
    InvalidDateSpec(String),

    #[error("invalid date {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    #[error("request failed: {0}")]
    FetchHttp(String),

    #[error("remote returned status {status}: {message}")]
    FetchStatus { status: u16, message: String },

    #[error("fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to store {key}: {message}")]
    Write { key: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
