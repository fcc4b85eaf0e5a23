/// Error types for allscout.
///
/// Per-file failures (`SizeExceeded`, `FileNotFound`, `PermissionDenied`, `EncodingError`,
/// `IoError` while reading one file) are absorbed by the scanner and never abort a query.
/// Subprocess failures make the session fall back to the internal scanner, and index
/// failures trigger a rebuild. Only workspace-level problems (`NoWorkspace`, `InvalidQuery`,
/// `ConfigError`) reach the caller.
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Result type for search operations
pub type ScoutResult<T> = Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("File too large: {path} exceeds {limit} bytes (read {size})")]
    SizeExceeded {
        path: PathBuf,
        size: u64,
        limit: u64,
    },
    #[error("Invalid UTF-8 in file {path}: {source}")]
    EncodingError {
        path: PathBuf,
        source: std::str::Utf8Error,
    },
    #[error("No workspace to search: {0}")]
    NoWorkspace(PathBuf),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Search tool unavailable: {0}")]
    SubprocessUnavailable(String),
    #[error("Search tool failed: {0}")]
    SubprocessFailed(String),
    #[error("Search tool timed out after {0:?}")]
    SubprocessTimeout(Duration),
    #[error("Index not found: {0}")]
    IndexMissing(PathBuf),
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),
    #[error("Index version mismatch: expected {current_version}, found {index_version}")]
    IndexVersionMismatch {
        index_version: u32,
        current_version: u32,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Canonicalize the path and strip UNC prefixes so that
/// comparisons on Windows are consistent.
pub fn unify_path(original: &Path) -> PathBuf {
    let canonical = original
        .canonicalize()
        .unwrap_or_else(|_| original.to_path_buf());
    strip_unc_prefix(&canonical)
}

/// Strips the Windows UNC prefix (\\?\) from a path if present
fn strip_unc_prefix(p: &Path) -> PathBuf {
    let s = p.display().to_string();
    if let Some(stripped) = s.strip_prefix(r"\\?\") {
        PathBuf::from(stripped)
    } else {
        p.to_path_buf()
    }
}

impl SearchError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn size_exceeded(path: impl Into<PathBuf>, size: u64, limit: u64) -> Self {
        Self::SizeExceeded {
            path: path.into(),
            size,
            limit,
        }
    }

    pub fn no_workspace(path: impl Into<PathBuf>) -> Self {
        Self::NoWorkspace(path.into())
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn subprocess_unavailable(msg: impl Into<String>) -> Self {
        Self::SubprocessUnavailable(msg.into())
    }

    pub fn subprocess_failed(msg: impl Into<String>) -> Self {
        Self::SubprocessFailed(msg.into())
    }

    pub fn index_corrupt(msg: impl Into<String>) -> Self {
        Self::IndexCorrupt(msg.into())
    }

    pub fn index_version_mismatch(index_version: u32, current_version: u32) -> Self {
        Self::IndexVersionMismatch {
            index_version,
            current_version,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn encoding_error(path: impl Into<PathBuf>, source: std::str::Utf8Error) -> Self {
        let path = path.into();
        let unified = unify_path(&path);
        Self::EncodingError {
            path: unified,
            source,
        }
    }

    /// Maps an I/O error on `path` to the most specific variant.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }

    /// True for errors scoped to a single file, which the scanner absorbs.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_)
                | Self::PermissionDenied(_)
                | Self::SizeExceeded { .. }
                | Self::EncodingError { .. }
                | Self::IoError(_)
        )
    }

    /// True for errors that send the session to its fallback engine.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Self::SubprocessUnavailable(_)
                | Self::SubprocessFailed(_)
                | Self::SubprocessTimeout(_)
                | Self::IndexMissing(_)
                | Self::IndexCorrupt(_)
                | Self::IndexVersionMismatch { .. }
        )
    }
}
