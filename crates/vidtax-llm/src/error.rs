use thiserror::Error;
use vidtax_core::Usage;
use vidtax_error::{FatalError, InternalError, WarningError};

/// Errors that can occur during LLM interactions.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Network connectivity or the HTTP request itself.
    #[error("Network request failed: {message}")]
    Request {
        message: String,
        url: Option<String>,
        /// Hint for retry logic/diagnostics.
        is_timeout: bool,
    },

    /// The provider returned a non-success status code.
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        url: Option<String>,
        /// Truncated body snippet for diagnostics.
        body_snippet: Option<String>,
    },

    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimited,

    #[error("Authentication failed. Please check your API key.")]
    Authentication,

    #[error("API key not found in environment variable `{0}`")]
    MissingApiKey(String),

    #[error("Invalid endpoint url: {0}")]
    InvalidUrl(String),

    #[error("Failed to serialize request data: {0}")]
    Serialization(String),

    /// The provider envelope could not be parsed.
    #[error("Failed to deserialize response data: {message}")]
    Deserialization {
        message: String,
        body_snippet: Option<String>,
    },

    /// The model answered, but not with the JSON shape that was asked for.
    #[error("Model output is not usable: {message}")]
    MalformedOutput {
        message: String,
        raw: String,
        /// Accounting for the call that produced the output.
        usage: Usage,
    },
}

impl LlmError {
    /// Transient failures worth another attempt on a later run.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Request { .. } | LlmError::RateLimited => true,
            LlmError::Api { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }

    /// Usage recorded for the failed call, when the model did answer.
    pub fn usage(&self) -> Option<Usage> {
        match self {
            LlmError::MalformedOutput { usage, .. } => Some(*usage),
            _ => None,
        }
    }

    /// Returns a diagnostic string with contextual fields for log surfaces.
    pub fn diagnostic(&self) -> String {
        match self {
            LlmError::Request {
                message,
                url,
                is_timeout,
            } => {
                let mut msg = format!("Network request failed: {message}");
                if let Some(u) = url {
                    msg.push_str(&format!("\nurl: {u}"));
                }
                if *is_timeout {
                    msg.push_str("\ncontext: timed out");
                }
                msg
            }
            LlmError::Api {
                status,
                message,
                url,
                body_snippet,
            } => {
                let mut msg = format!("API error (status {status}): {message}");
                if let Some(u) = url {
                    msg.push_str(&format!("\nurl: {u}"));
                }
                if let Some(snippet) = body_snippet {
                    msg.push_str("\nbody excerpt: ");
                    msg.push_str(snippet);
                }
                msg
            }
            LlmError::Deserialization {
                message,
                body_snippet,
            } => {
                let mut msg = format!("Failed to deserialize response data: {message}");
                if let Some(snippet) = body_snippet {
                    if !message.contains(snippet) {
                        msg.push_str("\nbody excerpt: ");
                        msg.push_str(snippet);
                    }
                }
                msg
            }
            other => other.to_string(),
        }
    }
}

impl From<LlmError> for vidtax_error::Error {
    fn from(error: LlmError) -> Self {
        match error {
            LlmError::Authentication | LlmError::MissingApiKey(_) | LlmError::InvalidUrl(_) => {
                vidtax_error::Error::Fatal(FatalError::Config(error.to_string()))
            }
            LlmError::RateLimited => vidtax_error::Error::Warning(WarningError::Degraded {
                stage: "llm",
                item: "request".to_string(),
                reason: "rate limit exceeded".to_string(),
            }),
            LlmError::Serialization(message) => {
                vidtax_error::Error::Internal(InternalError::Serialization(message))
            }
            other => vidtax_error::Error::Internal(InternalError::External(other.diagnostic())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_split() {
        let transport = LlmError::Request {
            message: "connection reset".into(),
            url: None,
            is_timeout: false,
        };
        assert!(transport.is_retryable());
        assert!(LlmError::RateLimited.is_retryable());
        let server = LlmError::Api {
            status: 503,
            message: "overloaded".into(),
            url: None,
            body_snippet: None,
        };
        assert!(server.is_retryable());
        let bad_req = LlmError::Api {
            status: 400,
            message: "bad".into(),
            url: None,
            body_snippet: None,
        };
        assert!(!bad_req.is_retryable());
        let malformed = LlmError::MalformedOutput {
            message: "expected value".into(),
            raw: "sure! here is".into(),
            usage: Usage::default(),
        };
        assert!(!malformed.is_retryable());
        assert!(malformed.usage().is_some());
    }

    #[test]
    fn auth_failures_are_fatal() {
        let e: vidtax_error::Error = LlmError::MissingApiKey("OPENROUTER_API_KEY".into()).into();
        assert!(e.is_fatal());
        assert!(e.to_string().contains("OPENROUTER_API_KEY"));
    }
}
