use std::path::PathBuf;

use tilia_storage::StorageError;

/// Errors produced by cache stores and their management operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to determine home directory for default cache root")]
    MissingHomeDir,

    #[error("invalid cache key {key:?}")]
    InvalidKey { key: String },

    #[error("invalid name {name:?}")]
    InvalidName { name: String },

    #[error("cannot prepare directory {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store {store} has been destroyed")]
    Destroyed { store: String },

    #[error("failed to serialize value for key {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to decode value at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("filesystem operation on {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup {backup} already exists for store {store}")]
    AlreadyExists { store: String, backup: String },

    #[error("backup {backup} not found for store {store}")]
    NotFound { store: String, backup: String },

    #[error("refusing to promote empty candidate for store {store}")]
    EmptyCandidate { store: String },

    #[error("candidate promotion for store {store} failed while {step}: {source}")]
    Promote {
        store: String,
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {message}")]
    Settings { path: PathBuf, message: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
