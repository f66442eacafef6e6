//! Audit crate error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("record failed validation: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;
