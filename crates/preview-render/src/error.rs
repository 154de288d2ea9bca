use thiserror::Error;

/// Render-pipeline error type: everything that isn't a terminal
/// `GeneratedAsset` failure (those are reported as `ErrorCode` through the
/// status channel instead) lands here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] preview_storage::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("external tool {0} not found on PATH")]
    ToolNotFound(String),

    #[error("external tool {0} exited with status {1}")]
    ToolFailed(String, i32),

    #[error("external tool timed out after {0:?}")]
    ToolTimedOut(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
