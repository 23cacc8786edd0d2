use std::path::PathBuf;

/// Core error type for the bot.
///
/// Adapter crates should map their specific errors into this type so the menu
/// can render failures consistently (store outcome vs infrastructure failure).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config file not found: {path}")]
    DocumentMissing { path: PathBuf },

    #[error("config file is not valid JSON: {path}: {source}")]
    DocumentParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {protocol} inbound: {reason}")]
    InvalidInbound { protocol: String, reason: String },

    #[error("no {protocol} inbound configured")]
    NotConfigured { protocol: String },

    #[error("user already exists: {0}")]
    DuplicateUser(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("invalid arguments: {0}")]
    Argument(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Outcomes caused by the request itself rather than by the host.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NotConfigured { .. }
                | Error::DuplicateUser(_)
                | Error::UserNotFound(_)
                | Error::Argument(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
