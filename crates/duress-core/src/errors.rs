/// Core error type.
///
/// Adapter crates map their transport errors into `Remote`/`External` so the
/// actions can log failures uniformly. No variant ever escapes
/// `Action::execute`: panic actions are best-effort.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A target id did not resolve to any known peer or group.
    #[error("could not resolve target {target}")]
    Resolution { target: i64 },

    /// A send/delete/block/leave call against the remote service failed.
    #[error("remote call {op} failed: {reason}")]
    Remote { op: &'static str, reason: String },

    #[error("operation not supported by this session: {0}")]
    Unsupported(&'static str),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn remote(op: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Remote {
            op,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
