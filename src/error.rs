use std::fmt;
use std::io;

/// Custom error type for ezrunner
#[derive(Debug)]
pub enum Error {
    /// Required configuration is missing or invalid
    ConfigError(String),
    /// The inference backend failed to produce a result
    BackendError(BackendError),
    /// IO error
    IoError(io::Error),
}

/// The ways a backend call can fail.
///
/// Callers of a session only need to know that the backend failed; the kind
/// is kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Error initializing the LLM backend
    BackendInit(String),
    /// Error loading the model
    ModelLoad(String),
    /// Error creating the context
    ContextCreation(String),
    /// Error tokenizing input
    Tokenization(String),
    /// Error decoding tokens
    Decoding(String),
    /// Error with batch operations
    Batch(String),
    /// Error with chat template
    ChatTemplate(String),
    /// Error with KV cache size
    KVCacheSize(String),
    /// The backend answered with something that is not a usable reply
    MalformedResponse(String),
    /// Other error
    Other(String),
}

impl Error {
    /// Whether this error came from configuration resolution
    pub fn is_config(&self) -> bool {
        matches!(self, Error::ConfigError(_))
    }

    /// Whether this error came from a backend call
    pub fn is_backend(&self) -> bool {
        matches!(self, Error::BackendError(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Error::BackendError(err) => write!(f, "Backend error: {}", err),
            Error::IoError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::BackendInit(msg) => write!(f, "backend initialization failed: {}", msg),
            BackendError::ModelLoad(msg) => write!(f, "model loading failed: {}", msg),
            BackendError::ContextCreation(msg) => write!(f, "context creation failed: {}", msg),
            BackendError::Tokenization(msg) => write!(f, "tokenization failed: {}", msg),
            BackendError::Decoding(msg) => write!(f, "decoding failed: {}", msg),
            BackendError::Batch(msg) => write!(f, "batch operation failed: {}", msg),
            BackendError::ChatTemplate(msg) => write!(f, "chat template error: {}", msg),
            BackendError::KVCacheSize(msg) => write!(f, "KV cache size error: {}", msg),
            BackendError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            BackendError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BackendError(err) => Some(err),
            Error::IoError(err) => Some(err),
            Error::ConfigError(_) => None,
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        Error::BackendError(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

/// A specialized Result type for ezrunner operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_helpers() {
        let config = Error::ConfigError("MODEL_NAME is not set".to_string());
        assert!(config.is_config());
        assert!(!config.is_backend());

        let backend: Error = BackendError::ModelLoad("no such file".to_string()).into();
        assert!(backend.is_backend());
        assert!(!backend.is_config());
    }

    #[test]
    fn test_display() {
        let err: Error = BackendError::Decoding("llama_decode() failed".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Backend error: decoding failed: llama_decode() failed"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
