use std::path::PathBuf;
use thiserror::Error;

/// The main error type for urlset operations.
///
/// Only conditions that make a whole run meaningless end up here. Per-item
/// problems (one listing, one record, one rename, one download) are logged
/// and recorded in the owning component's report instead.
#[derive(Debug, Error)]
pub enum UrlsetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read suffix cache {path}: {source}")]
    CacheRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write suffix cache {path}: {source}")]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to parse annotation source {path}: {source}")]
    AnnotationParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to read dataset manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write dataset manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write label file {path}: {source}")]
    LabelWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write URL list {path}: {source}")]
    UrlListWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Required input not found: {path} ({what})")]
    MissingInput { path: PathBuf, what: String },

    #[error("Invalid option: {message}")]
    InvalidOption { message: String },

    #[error("Invalid URL template '{template}': {message}")]
    InvalidUrlTemplate { template: String, message: String },

    #[error("Failed to serialize report: {0}")]
    ReportJson(#[from] serde_json::Error),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// A failed HTTP request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
}
