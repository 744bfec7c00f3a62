//! Structured responses for therapeutic chat and session notes.
//!
//! [`ResponseOrchestrator`] asks a hosted completion service for a JSON
//! payload, repairs and validates whatever comes back, and falls back to a
//! deterministic keyword analyzer when the service is unconfigured, down, or
//! returns something unusable. Callers always get a complete [`ChatReply`],
//! [`NotesAnalysis`] or [`SessionSummary`].

pub mod config;
pub mod engine;

use tracing_subscriber::EnvFilter;

pub use config::{EngineConfig, RetryPolicy};
pub use engine::{
    ChatReply, ConversationTurn, EmotionClassifier, EmotionalContext, FallbackAnalyzer,
    FallbackReason, GenerativeTextClient, InMemoryNoteStore, Intensity, MockUpstreamClient, Note,
    NoteStore, NotesAnalysis, Resolution, ResponseOrchestrator, ResponseSource, SessionSummary,
    UpstreamClient, Urgency,
};

/// Install a fmt subscriber filtered by `RUST_LOG`, or by
/// [`config::default_log_filter`] when unset. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} engine v{}", config::APP_NAME, config::APP_VERSION);
}
