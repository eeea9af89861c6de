use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    /// Network failure, timeout, non-success HTTP status or a service-side
    /// failure code that is not about credentials.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service rejected the configured key.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// The body could not be decoded as either JSON or XML, or lacked the
    /// expected shape.
    #[error("Malformed response: {0}")]
    Parse(String),

    /// A candidate was matched but its full record could not be obtained.
    #[error("Incomplete record: {0}")]
    IncompleteRecord(String),

    /// The task processing an entry ended without producing an outcome.
    #[error("Entry worker failed: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ReconError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ReconError::Auth(_))
    }

    /// Short label used for logs, metrics and the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconError::Transport(_) => "transport",
            ReconError::Auth(_) => "auth",
            ReconError::Parse(_) => "parse",
            ReconError::IncompleteRecord(_) => "incomplete_record",
            ReconError::Worker(_) => "worker",
            ReconError::Config(_) => "config",
            ReconError::Io(_) => "io",
            ReconError::Json(_) => "json",
            ReconError::Csv(_) => "csv",
            ReconError::Toml(_) => "toml",
        }
    }
}

impl From<reqwest::Error> for ReconError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ReconError::Transport(format!("request timed out: {e}"));
        }
        if let Some(status) = e.status() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return ReconError::Auth(format!("HTTP {status}"));
            }
        }
        ReconError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
