//! Custom error types for dkrutil.
//!
//! The split matters for orchestration: `Config` and `EngineUnreachable` are
//! fatal before or for the whole run, `Collision` is fatal for a single
//! secret operation, and the remaining variants are per-volume errors that
//! get recorded in the run summary while the run continues.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DkrError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Docker engine unreachable: {0}")]
    EngineUnreachable(String),

    #[error("Volume not found: {0}")]
    VolumeNotFound(String),

    #[error("Volume already exists: {0}")]
    Collision(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] bollard::errors::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry error: {0}")]
    Registry(String),
}

pub type Result<T> = std::result::Result<T, DkrError>;
