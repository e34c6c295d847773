use std::io;

use thiserror::Error;

use crate::domain::case_xml::CaseDecodeError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("credential store error: {0}")]
    CredentialStore(String),
    #[error("FogBugz error {code}: {message}")]
    Api { code: String, message: String },
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<CaseDecodeError> for AppError {
    fn from(err: CaseDecodeError) -> Self {
        AppError::Parse(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
