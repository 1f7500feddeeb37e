use thiserror::Error;

/// Error type shared by the gradwise crates.
#[derive(Error, Debug, PartialEq, Clone)] // PartialEq for easier testing
pub enum GradwiseError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Tensor creation error: data length {data_len} does not match shape {shape:?}")]
    TensorCreationError { data_len: usize, shape: Vec<usize> },

    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Unsupported gradient layout `{layout}` in {operation}")]
    UnsupportedGradientLayout { layout: String, operation: String },

    #[error("{optimizer} does not support sparse gradients")]
    SparseGradientUnsupported { optimizer: String },

    /// A restored state tensor disagrees with the live parameter's shape.
    #[error(
        "State shape mismatch for parameter {param_index}, field `{field}`: expected {expected:?}, got {actual:?}"
    )]
    StateShapeMismatch {
        param_index: usize,
        field: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A snapshot lacks a required field or was produced by another component.
    #[error("State schema mismatch in {component}: {detail}")]
    StateSchemaMismatch { component: String, detail: String },

    #[error("Failed to acquire {lock_type} lock: {reason}")]
    LockError { lock_type: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl GradwiseError {
    /// Shorthand for a [`GradwiseError::StateSchemaMismatch`].
    pub fn schema(component: impl Into<String>, detail: impl Into<String>) -> Self {
        GradwiseError::StateSchemaMismatch {
            component: component.into(),
            detail: detail.into(),
        }
    }
}
