//! Action errors

use crate::infrastructure::database::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("authentication required")]
    Unauthorized,
    #[error("companion limit reached")]
    QuotaExceeded,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ActionError {
    /// Stable machine-readable code for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::Unauthorized => "unauthorized",
            ActionError::QuotaExceeded => "quota_exceeded",
            ActionError::InvalidInput(_) => "invalid_input",
            ActionError::Store(_) => "store_error",
        }
    }
}
