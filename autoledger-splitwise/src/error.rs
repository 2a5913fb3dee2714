use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SplitwiseError {
    #[error("splitwise request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("splitwise returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid flag pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The per-user flag identifier must be uppercase letters only.
    #[error("custom user identifier must be A-Z only, got '{0}'")]
    InvalidUserIdentifier(String),
}

pub type Result<T> = std::result::Result<T, SplitwiseError>;
