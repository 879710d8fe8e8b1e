//! Theme engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("Template error: {0}")]
    TemplateError(String),
}
