// ============================================================
// Layer 5 — Model Errors
// ============================================================
// Typed failures raised by the model layer. The application
// layer wraps these in anyhow with extra context.

use thiserror::Error;

/// Errors produced while building, feeding, or loading a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A hyperparameter combination the encoder cannot run with.
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// An entity position id that is neither the `-1` sentinel
    /// nor a valid index into the position table.
    #[error("entity position id {value} is out of range (expected -1 or 0..{max_positions})")]
    InvalidPositionId { value: i64, max_positions: usize },

    /// A word, entity or segment id with no row in its embedding table.
    #[error("{kind} {value} is out of range (expected 0..{limit})")]
    InvalidId { kind: &'static str, value: i64, limit: usize },

    /// A batch without any word tokens.
    #[error("word sequence is empty")]
    EmptySequence,

    /// More word tokens than the position table can address.
    #[error("word sequence of length {len} exceeds max_position_embeddings {max_positions}")]
    SequenceTooLong { len: usize, max_positions: usize },

    /// A checkpoint tensor whose shape differs from the parameter it targets.
    #[error("shape mismatch for '{path}': checkpoint has {checkpoint:?}, model expects {expected:?}")]
    ShapeMismatch {
        path: String,
        checkpoint: Vec<usize>,
        expected: Vec<usize>,
    },

    /// A checkpoint tensor whose value count disagrees with its own shape.
    #[error("tensor '{path}' holds {actual} values but its shape {shape:?} needs {expected}")]
    CorruptTensor {
        path: String,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    /// Strict loading found parameters the checkpoint does not provide.
    #[error("checkpoint is missing {} parameter(s): {}", .0.len(), .0.join(", "))]
    MissingKeys(Vec<String>),

    /// Strict loading found checkpoint entries no parameter claims.
    #[error("checkpoint has {} unexpected parameter(s): {}", .0.len(), .0.join(", "))]
    UnexpectedKeys(Vec<String>),

    /// Reading tensor values back from the device failed.
    #[error("cannot read tensor data: {0}")]
    TensorData(String),
}

impl ModelError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
