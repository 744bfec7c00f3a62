pub mod types;
pub mod lexicon;
pub mod classify;
pub mod prompt_input;
pub mod prompt;
mod sanitize;
pub mod extract;
pub mod fallback;
pub mod upstream;
pub mod notes;
pub mod orchestrator;

pub use types::*;
pub use lexicon::*;
pub use classify::*;
pub use prompt::*;
pub use extract::*;
pub use fallback::*;
pub use upstream::*;
pub use notes::*;
pub use orchestrator::*;

use thiserror::Error;

/// Failures talking to the hosted completion service.
///
/// `ConfigurationMissing` is raised before any network activity; every other
/// variant means the service was unavailable for this call.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Upstream credential is missing or still a placeholder")]
    ConfigurationMissing,

    #[error("Upstream service is not reachable at {0}")]
    Connection(String),

    #[error("Upstream request timed out after {0}s")]
    Timeout(u64),

    /// `body` is kept for callers but left out of the message, since
    /// services may echo the request back.
    #[error("Upstream returned error status {status}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed upstream envelope: {0}")]
    Envelope(String),
}

impl UpstreamError {
    /// Whether a fresh attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConfigurationMissing => false,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Connection(_) | Self::Timeout(_) | Self::HttpClient(_) | Self::Envelope(_) => {
                true
            }
        }
    }
}

/// Why a raw upstream text could not be turned into a structured payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("no structured candidate found in upstream output")]
    NoCandidateFound,

    #[error("candidate did not parse after sanitizing: {0}")]
    SanitizeFailed(String),

    #[error("candidate does not match the {kind} schema: {detail}")]
    SchemaMismatch { kind: &'static str, detail: String },
}

impl ExtractionFailure {
    /// Stable machine-readable reason, used in logs and fallback annotations.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoCandidateFound => "no-candidate-found",
            Self::SanitizeFailed(_) => "sanitize-failed",
            Self::SchemaMismatch { .. } => "schema-mismatch",
        }
    }
}

#[derive(Error, Debug)]
pub enum NoteStoreError {
    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Note store unavailable: {0}")]
    Unavailable(String),
}

/// Everything that can go wrong on the upstream path of a single request.
/// Never leaves the orchestrator.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_retryable(),
            Self::Extraction(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_reasons_are_stable() {
        assert_eq!(ExtractionFailure::NoCandidateFound.reason(), "no-candidate-found");
        assert_eq!(
            ExtractionFailure::SanitizeFailed("eof".into()).reason(),
            "sanitize-failed"
        );
        assert_eq!(
            ExtractionFailure::SchemaMismatch {
                kind: "chat_reply",
                detail: "missing content".into()
            }
            .reason(),
            "schema-mismatch"
        );
    }

    #[test]
    fn configuration_missing_is_never_retried() {
        assert!(!UpstreamError::ConfigurationMissing.is_retryable());
        assert!(!EngineError::from(UpstreamError::ConfigurationMissing).is_retryable());
    }

    #[test]
    fn server_errors_and_rate_limits_are_retryable() {
        let status = |s| UpstreamError::Status { status: s, body: String::new() };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(UpstreamError::Connection("http://localhost".into()).is_retryable());
    }

    #[test]
    fn status_message_omits_response_body() {
        let e = UpstreamError::Status { status: 400, body: "echo: I feel hopeless".into() };
        assert_eq!(e.to_string(), "Upstream returned error status 400");
    }

    #[test]
    fn extraction_failures_are_retryable() {
        let e = EngineError::from(ExtractionFailure::NoCandidateFound);
        assert!(e.is_retryable());
    }
}
