//! Codec errors.

use std::io;

/// What can go wrong while reading or writing a voxel file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Signature mismatch or unregistered file extension.
    #[error("unknown file format: {0}")]
    FormatUnknown(String),

    /// The file's version is outside the accepted range.
    #[error("unsupported version: {0}")]
    VersionUnsupported(String),

    /// Truncated or malformed chunk, dictionary or numeric field.
    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Bad options or an operation the codec does not offer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// A [`Error::Parse`] for an unexpectedly short file.
    pub fn truncated(what: &str) -> Self {
        Self::Parse(format!("unexpected end of data while reading {what}"))
    }
}
