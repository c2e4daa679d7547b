use thiserror::Error;

pub type Result<T> = std::result::Result<T, MlClientError>;

#[derive(Debug, Error)]
pub enum MlClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for MlClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MlClientError::Parse(err.to_string())
        } else {
            MlClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MlClientError {
    fn from(err: serde_json::Error) -> Self {
        MlClientError::Parse(err.to_string())
    }
}
