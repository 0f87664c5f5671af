// Error types for the resolve → select → download pipeline

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// Input is not a recognizable VOD URL or identifier
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Network hiccup or server-side 5xx/429; eligible for retry
    #[error("network error: {0}")]
    Transient(String),

    /// VOD does not exist, is private, restricted, or needs login
    #[error("VOD not available: {0}")]
    NotAvailable(String),

    /// Manifest resolved but offered no playable variants
    #[error("no streams available for VOD {0}")]
    NoStreams(String),

    /// Platform response did not have the expected shape
    #[error("unexpected platform response (API may have changed): {0}")]
    Protocol(String),

    /// ffmpeg missing or not executable
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    /// ffmpeg exited unsuccessfully
    #[error("tool error: {message}")]
    ToolFailed { message: String, diagnostic: String },

    /// ffmpeg reported success but produced no usable file
    #[error("incomplete output: {0}")]
    IncompleteOutput(String),

    /// Interrupted by the user
    #[error("cancelled")]
    Cancelled,

    /// Login failed
    #[error("login failed: {0}")]
    Auth(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("config error: {0}")]
    Config(String),

    /// A caller broke a precondition; not recoverable
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl DownloadError {
    /// Whether a bounded retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Errors that imply the whole tool is broken rather than one VOD
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::ToolUnavailable(_))
    }

    /// Errors that must abort a batch run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }

    /// Short label used by the batch summary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid input",
            Self::Transient(_) => "network",
            Self::NotAvailable(_) => "not available",
            Self::NoStreams(_) => "no streams",
            Self::Protocol(_) => "protocol",
            Self::ToolUnavailable(_) => "tool unavailable",
            Self::ToolFailed { .. } => "tool error",
            Self::IncompleteOutput(_) => "incomplete output",
            Self::Cancelled => "cancelled",
            Self::Auth(_) => "login",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::InvariantViolation(_) => "invariant",
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Protocol(err.to_string());
        }

        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), &err.to_string());
        }

        // Timeouts, refused connections, DNS, TLS, body read failures
        Self::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for DownloadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("JSON parse error: {}", err))
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl DownloadError {
    /// Classify an HTTP status returned by the platform
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            429 | 500..=599 => Self::Transient(format!("HTTP {}: {}", status, context)),
            401 | 403 | 404 | 410 => Self::NotAvailable(format!("HTTP {}: {}", status, context)),
            _ => Self::Protocol(format!("HTTP {}: {}", status, context)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(DownloadError::from_status(503, "x"), DownloadError::Transient(_)));
        assert!(matches!(DownloadError::from_status(429, "x"), DownloadError::Transient(_)));
        assert!(matches!(DownloadError::from_status(404, "x"), DownloadError::NotAvailable(_)));
        assert!(matches!(DownloadError::from_status(403, "x"), DownloadError::NotAvailable(_)));
        assert!(matches!(DownloadError::from_status(302, "x"), DownloadError::Protocol(_)));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(DownloadError::Transient("t".into()).is_retryable());
        assert!(!DownloadError::NotAvailable("n".into()).is_retryable());
        assert!(!DownloadError::Protocol("p".into()).is_retryable());
        assert!(!DownloadError::Cancelled.is_retryable());
    }

    #[test]
    fn test_systemic_errors() {
        assert!(DownloadError::Protocol("p".into()).is_systemic());
        assert!(DownloadError::ToolUnavailable("ffmpeg".into()).is_systemic());
        assert!(!DownloadError::NoStreams("1".into()).is_systemic());
    }

    #[test]
    fn test_json_error_is_protocol() {
        let err: DownloadError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, DownloadError::Protocol(_)));
    }
}
