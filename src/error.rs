use thiserror::Error;

use lottie_core::EngineError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("could not decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document has no marker named {0:?}")]
    UnknownMarker(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
