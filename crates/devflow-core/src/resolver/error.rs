//! Dependency resolution errors.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("no version of '{name}' satisfies specifier '{specifier}'")]
    NoSatisfyingVersion { name: String, specifier: String },

    #[error("sibling plugin '{name}' not found")]
    SiblingNotFound { name: String },

    #[error("sibling plugin '{name}' found but not Available (status: {status})")]
    SiblingNotAvailable { name: String, status: String },

    #[error("file reference '{path}' does not exist")]
    FileNotFound { path: PathBuf },

    #[error("registry request for '{name}' failed: {message}")]
    RegistryRequestFailed { name: String, message: String },

    #[error("download of '{name}@{version}' failed: {message}")]
    DownloadFailed {
        name: String,
        version: String,
        message: String,
    },

    #[error("extraction of '{name}@{version}' failed: {message}")]
    ExtractionFailed {
        name: String,
        version: String,
        message: String,
    },

    #[error("cache entry at '{path}' is locked by another resolution and did not complete in time")]
    CacheLockTimeout { path: PathBuf },

    #[error("circular dependency detected: {}", .0.join(" -> "))]
    Circular(Vec<String>),

    #[error("I/O error during dependency resolution at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ResolverError>;
