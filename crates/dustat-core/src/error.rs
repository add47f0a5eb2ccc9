use std::io;
use std::path::PathBuf;

/// Error kinds surfaced across crate boundaries.
///
/// Most scan-time failures never reach here: they are recorded on the
/// affected node's `read_state` instead (see [`crate::node::ReadState`]) so
/// that one unreadable subdirectory does not abort the whole scan. This
/// enum covers the failures that genuinely have nowhere else to go.
#[derive(Debug, thiserror::Error)]
pub enum DustatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("cache parse error at line {line}: {message}")]
    CacheParse { line: u64, message: String },

    #[error("cache file exceeded the parse-error threshold and was abandoned")]
    CacheAborted,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("node not found for path {0}")]
    NotFound(PathBuf),
}

pub type DustatResult<T> = Result<T, DustatError>;
