use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    #[error("duplicate label name: {0}")]
    DuplicateLabel(String),

    #[error("duplicate device name: {0}")]
    DuplicateDevice(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
