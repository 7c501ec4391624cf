use thiserror::Error;

pub type Result<T> = std::result::Result<T, PolicyError>;

/// Errors raised while resolving fields, dispatching operators or loading policies.
///
/// Evaluation never hands these to the caller. They are recovered at the rule
/// level and turned into a denial; loaders and configuration return them.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("field {0} not found")]
    FieldNotFound(String),

    #[error("index {index} out of bounds for sequence {field} of length {len}")]
    IndexOutOfBounds {
        field: String,
        index: usize,
        len: usize,
    },

    #[error("field {0} is private and cannot be accessed")]
    AccessDenied(String),

    #[error("operator '{0}' is not supported")]
    UnsupportedOperator(String),

    #[error("type conversion failed: {0}")]
    TypeConversionFailure(String),

    #[error("cannot descend into null value at {0}")]
    NilValue(String),

    #[error("invalid field path '{0}'")]
    InvalidPath(String),

    #[error("resource is not a structured record: {0}")]
    InvalidResource(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid policy json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}
