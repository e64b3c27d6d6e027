use std::path::PathBuf;
use thiserror::Error;

/// One failed store connection, kept for the aggregate error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAttempt {
    pub store: String,
    pub reason: String,
}

/// Build and watch error types
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Source directory not found: {path}")]
    SourceRootNotFound { path: PathBuf },

    #[error("Source file not found: {path}")]
    SourceMissing { path: PathBuf },

    #[error("No space left on device for {path}")]
    DiskFull { path: PathBuf },

    #[error("Failed to copy {src} to {dst}")]
    CopyFailed {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory: {path}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {program}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{label} exited with code {code}")]
    ProcessFailed { label: String, code: i32 },

    #[error("Could not connect to {store}: {reason}")]
    StoreConnectFailed { store: String, reason: String },

    #[error("All store connections failed ({})", format_attempts(.attempts))]
    StoresExhausted { attempts: Vec<StoreAttempt> },

    #[error("Invalid store domain '{0}': expected a host name like my-store.myshopify.com")]
    InvalidStore(String),

    #[error("File watcher error")]
    Watch(#[from] notify::Error),

    #[error("Invalid JSON in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_attempts(attempts: &[StoreAttempt]) -> String {
    if attempts.is_empty() {
        return "no stores configured".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.store, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl BuildError {
    /// Exit code surfaced by the binary for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            BuildError::Cancelled => 130,
            _ => 1,
        }
    }
}
