use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Execution error in {action}: {message}")]
    Execution { action: String, message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    General(String),
}

impl AppError {
    pub fn execution(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            action: action.into(),
            message: message.into(),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Failures reported by the planning oracle or its transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("context window exceeded: {0}")]
    ContextOverflow(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle returned an empty response")]
    EmptyResponse,

    #[error("no API key configured (expected env var {0})")]
    MissingApiKey(String),
}

impl OracleError {
    pub fn is_context_overflow(&self) -> bool {
        matches!(self, Self::ContextOverflow(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("response does not contain a bracketed action array")]
    NoArray,

    #[error("malformed action array: {0}")]
    Malformed(String),

    #[error("unknown action kind: {0}")]
    UnknownAction(String),

    #[error("{kind} action is missing required field '{field}'")]
    MissingField { kind: String, field: &'static str },

    #[error("{kind} action has an empty '{field}'")]
    EmptyField { kind: String, field: &'static str },

    #[error("unsafe path in plan: {0}")]
    UnsafePath(String),
}
