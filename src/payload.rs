//! Payload file loading at the CLI boundary
//!
//! The client subcommand reads its payload from a JSON file whose top-level
//! value must be an object. A missing, unreadable, or malformed file aborts
//! the process before any publish attempt.

use crate::core::Payload;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Malformed or unreadable payload file.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read payload file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("payload file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload file {path} must contain a top-level JSON object")]
    NotAnObject { path: PathBuf },
}

/// Reads a payload mapping from a JSON file.
///
/// Decoding is lossless for the supported string and number values: the
/// mapping published equals the mapping written to the file.
pub fn load_payload(path: &Path) -> Result<Payload, InputError> {
    let raw = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| InputError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(InputError::NotAnObject {
            path: path.to_path_buf(),
        }),
    }
}
