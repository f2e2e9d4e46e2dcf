//! Error type for the fallible public APIs.
//!
//! The per-event path never returns errors; anything that goes wrong there
//! degrades to passing the original event through. Errors only surface from
//! configuration and trace loading.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("trace line {line}: {source}")]
    Trace {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown code table index {0}")]
    UnknownCodeTable(u8),

    #[error("unknown code table name {0:?}")]
    UnknownCodeTableName(String),

    #[error("unknown key {0:?}")]
    UnknownKey(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}
