use thiserror::Error;

pub type PopupResult<T> = Result<T, PopupError>;

#[derive(Error, Debug)]
pub enum PopupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Campaign feed error: {0}")]
    Feed(String),

    #[error("Browser storage error: {0}")]
    Storage(String),

    #[error("Tracking transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
