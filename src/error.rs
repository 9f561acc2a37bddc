use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the beacon library.
///
/// Per-session problems are normally logged and swallowed by the registry;
/// these variants only escape at startup or from the writer-side verbs.
#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("session directory {path} is not usable: {source}")]
    SessionDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to run `{program}`: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` did not finish within {timeout:?}")]
    CommandTimeout { program: String, timeout: Duration },

    #[error("`{program}` printed unexpected output: {output:?}")]
    UnexpectedOutput { program: String, output: String },

    #[error("tmux {command} failed: {message}")]
    Tmux { command: String, message: String },

    #[error("invalid session id {0:?}")]
    InvalidSessionId(String),

    #[error("timed out waiting for lock on session {0}")]
    LockTimeout(String),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BeaconError>;
