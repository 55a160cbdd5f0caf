use thiserror::Error;

/// Failure of a graph load or of a single node.
///
/// Every variant is terminal for the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Bad graph or node setup, detected at load or dispatch time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The language model or tool provider failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// An expected intermediate value is missing.
    #[error("data error: {0}")]
    Data(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "configuration",
            EngineError::Provider(_) => "provider",
            EngineError::Data(_) => "data",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
