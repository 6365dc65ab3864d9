//! Error type shared by every module of the application.

use std::path::PathBuf;

/// Everything that can go wrong outside the GUI itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("download of {url} failed with HTTP {status}")]
    Http { url: String, status: u16 },

    /// A job is already running; only one external process is allowed.
    #[error("another process is already running")]
    Busy,

    #[error("no URL given")]
    EmptyUrl,

    /// Required helper binaries are not present.
    #[error("missing files: {}", .0.join(", "))]
    MissingTools(Vec<String>),

    #[error("no `{name}` binary found in archive {}", archive.display())]
    ArchiveEntryMissing { name: String, archive: PathBuf },

    #[error("background task failed: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;
