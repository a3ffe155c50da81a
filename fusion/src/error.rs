//! Error types for scan fusion

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] scan3d_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No initial frame: {0}")]
    NoInitialFrame(String),

    #[error("Persisting the model failed: {0}")]
    Persistence(String),

    #[error("Frame ingestion failed: {0}")]
    Ingestion(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
