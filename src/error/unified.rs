//! Error classification and recovery hints.

/// Broad error category used to route retry and recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    ToolExecution,
    Queue,
    Cancelled,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    CheckToolImplementation,
    CheckQueueStore,
    None,
}

impl RecoverySuggestion {
    /// One-line hint for the user, if there is anything to suggest.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Self::RetryWithBackoff => Some("the service may be busy or unreachable; try again shortly"),
            Self::CheckCredentials => Some("check llm_config.api_key in the config file"),
            Self::CheckConfiguration => Some("run `stride config check` to validate the config file"),
            Self::IncreaseTimeout => Some("raise llm_config.request_timeout_secs"),
            Self::CheckToolImplementation => Some("check the MCP server or tool that failed"),
            Self::CheckQueueStore => Some("check that Redis is reachable (REDIS_HOST, REDIS_PORT)"),
            Self::None => None,
        }
    }
}
