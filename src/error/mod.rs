//! Error types for stride.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all stride operations.
#[derive(Error, Debug)]
pub enum StrideError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Gave up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl StrideError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a provider error for a named MCP server or backend.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Provider { .. } => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) | Self::ToolNotFound(_) => ErrorCategory::Configuration,
            Self::Serialization(_) | Self::Parse(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Queue(_) => ErrorCategory::Queue,
            #[cfg(feature = "redis")]
            Self::Redis(_) => ErrorCategory::Queue,
            Self::Cancelled => ErrorCategory::Cancelled,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether the agent loop should spend a retry slot on this error.
    ///
    /// The loop retries every backend and tool failure except structural ones:
    /// a missing tool, a bad configuration, an invalid argument or cancellation.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::Configuration(_)
                | Self::ToolNotFound(_)
                | Self::InvalidArgument(_)
                | Self::Cancelled
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::Queue => RecoverySuggestion::CheckQueueStore,
            _ => RecoverySuggestion::None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, StrideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_maps_to_category() {
        assert_eq!(StrideError::api(401, "no").category(), ErrorCategory::Authentication);
        assert_eq!(StrideError::api(503, "down").category(), ErrorCategory::Server);
        assert_eq!(StrideError::api(400, "bad").category(), ErrorCategory::Api);
    }

    #[test]
    fn structural_errors_are_not_transient() {
        assert!(!StrideError::ToolNotFound("x".into()).is_transient());
        assert!(!StrideError::Configuration("x".into()).is_transient());
        assert!(!StrideError::Cancelled.is_transient());
        assert!(StrideError::tool("x", "boom").is_transient());
        assert!(StrideError::Authentication("expired".into()).is_transient());
    }

    #[test]
    fn suggestions_follow_category() {
        assert_eq!(
            StrideError::Timeout(10).recovery_suggestion(),
            RecoverySuggestion::IncreaseTimeout
        );
        assert!(StrideError::provider("search", "reset").recovery_suggestion().hint().is_some());
        assert_eq!(StrideError::InvalidState("x".into()).recovery_suggestion(), RecoverySuggestion::None);
    }
}
