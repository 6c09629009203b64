//! Exporter errors.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Serialization of a payload (JSON document, texture, compressed
    /// array) failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Bad export options or an empty scene.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
