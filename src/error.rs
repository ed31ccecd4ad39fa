#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} not set in environment or .env")]
    MissingCredential(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference failed ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Response blocked: {0}")]
    Blocked(String),

    #[error("Failed to parse JSON: {message}")]
    Parse { message: String, raw: String },
}

impl AppError {
    /// Raw model text carried by the error, if the remote call got that far.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            AppError::Parse { raw, .. } => Some(raw.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
