use compare_common::error::CommonError;

/// Top-level failures. Everything here aborts the whole request; failures
/// inside the category loop are represented as data (sentinel answers,
/// placeholder evaluations) and never surface as this type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),
}
