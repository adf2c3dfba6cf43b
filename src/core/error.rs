use thiserror::Error;

use crate::db::StoreError;
use crate::toolkit::creation::CreationError;
use crate::toolkit::deletion::DeletionError;


#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Content store error: {0}")]
    Store(#[from] StoreError),

    #[error("Deletion error: {0}")]
    Deletion(#[from] DeletionError),

    #[error("Creation error: {0}")]
    Creation(#[from] CreationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for SweepError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}


pub type Result<T> = std::result::Result<T, SweepError>;
