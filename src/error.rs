use thiserror::Error;

pub type Result<T> = std::result::Result<T, IntakeError>;

/// Message shown to callers for any failure while reading or merging PDFs.
pub const GENERIC_FAILURE: &str = "병합 중 오류가 발생했습니다.";

#[derive(Debug, Error)]
pub enum IntakeError {
    /// Malformed or insufficient caller input.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Unreadable PDF content or an unexpected failure while merging.
    #[error("processing failed: {0}")]
    Processing(String),

    /// Stored file is absent or outside the permitted directory.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("settings document error: {0}")]
    Settings(#[from] toml_edit::TomlError),
}

impl IntakeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    /// What a caller is allowed to see. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) => msg.clone(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
