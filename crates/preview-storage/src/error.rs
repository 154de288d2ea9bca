use thiserror::Error;

/// Storage-layer error type. Mirrors the teacher's `thiserror`-grouped
/// shape; batch failures abort the current operation and surface to the
/// caller unchanged (spec §7 "Fatal errors").
#[derive(Error, Debug)]
pub enum Error {
    #[error("generated asset could not be updated: {0}")]
    CouldNotBeUpdated(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("sled transaction error: {0}")]
    SledTransaction(String),

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
