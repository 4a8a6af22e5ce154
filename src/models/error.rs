use thiserror::Error;

/// Error kinds surfaced by the conversion pipeline.
///
/// Each variant corresponds to one of the HTTP statuses returned by the
/// request orchestrator; see `web_handlers::interfaces`.
#[derive(Debug, Error)]
pub enum SubError {
    #[error("failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("the following link doesn't contain any valid node info: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("Unrecognized target")]
    UnknownTarget,

    #[error("target emitter failed: {0}")]
    Emit(String),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl SubError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        SubError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status the orchestrator attaches to this error.
    pub fn status_code(&self) -> u16 {
        match self {
            SubError::Fetch { .. }
            | SubError::Parse(_)
            | SubError::Config(_)
            | SubError::BadRequest(_) => 400,
            SubError::Forbidden => 403,
            SubError::ProfileNotFound => 404,
            SubError::UnknownTarget | SubError::Emit(_) => 500,
        }
    }
}

pub type SubResult<T> = Result<T, SubError>;
