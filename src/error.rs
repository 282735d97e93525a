use thiserror::Error;

/// Errors raised while building, colouring or verifying a graph.
///
/// `InvariantViolation` and `MalformedInput` are the two protocol-level
/// failures. Everything else belongs to the layers around the protocol
/// (config files, DIMACS input, JSON output, the task runtime).
#[derive(Error, Debug)]
pub enum ColoringError {
    /// The protocol or the palette sizing is broken. Never retried.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The graph source produced an inconsistent adjacency relation.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A caller-supplied round cap was reached before every node was coloured.
    #[error("round limit of {limit} reached with {uncolored} nodes still uncolored")]
    RoundLimitExceeded { limit: u64, uncolored: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A node task died or a channel closed mid-round.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ColoringError {
    pub fn invariant(message: impl Into<String>) -> Self {
        ColoringError::InvariantViolation(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ColoringError::MalformedInput(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        ColoringError::Config(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        ColoringError::Runtime(message.into())
    }

    /// True for the failures that indicate a protocol defect rather than bad input.
    pub fn is_fatal_invariant(&self) -> bool {
        matches!(self, ColoringError::InvariantViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, ColoringError>;
