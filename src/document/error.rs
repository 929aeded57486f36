//! Layer document error types.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reading or writing a layer document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("layers info file not found: `{0}`")]
    NotFound(PathBuf),

    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid JSON in layers info file `{0}`")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error(
        "invalid frame {width}x{height} in `{path}`: both dimensions must be between 1 and {max}",
        max = super::MAX_FRAME_DIMENSION
    )]
    InvalidFrame {
        path: PathBuf,
        width: u32,
        height: u32,
    },

    #[error("failed to write layers info file `{0}`")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("failed to serialize layers info")]
    Serialize(#[source] serde_json::Error),
}
