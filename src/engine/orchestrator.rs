use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::Instrument;
use uuid::Uuid;

use super::classify::EmotionClassifier;
use super::extract::extract;
use super::fallback::FallbackAnalyzer;
use super::notes::NoteStore;
use super::prompt::{compose_prompt, PromptRequest};
use super::types::{
    ChatPayload, ChatReply, ConversationTurn, EmotionalContext, Note, NotesAnalysis,
    SessionSummary, TurnRole,
};
use super::upstream::{GenerativeTextClient, UpstreamClient};
use super::{EngineError, ExtractionFailure, UpstreamError};
use crate::config::{EngineConfig, RetryPolicy, DEFAULT_MAX_RECENT_NOTES};

/// Why the deterministic path produced a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No usable credential; the upstream service was never called.
    NotConfigured,
    /// Nothing to send upstream (no notes, empty transcript).
    EmptyInput,
    UpstreamUnavailable(String),
    Extraction(ExtractionFailure),
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "configuration-missing",
            Self::EmptyInput => "empty-input",
            Self::UpstreamUnavailable(_) => "upstream-unavailable",
            Self::Extraction(failure) => failure.reason(),
        }
    }
}

impl From<EngineError> for FallbackReason {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Upstream(UpstreamError::ConfigurationMissing) => Self::NotConfigured,
            EngineError::Upstream(other) => Self::UpstreamUnavailable(other.to_string()),
            EngineError::Extraction(failure) => Self::Extraction(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    Upstream,
    Fallback(FallbackReason),
}

/// A caller-facing value plus which path produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    pub value: T,
    pub source: ResponseSource,
}

impl<T> Resolution<T> {
    fn upstream(value: T) -> Self {
        Self { value, source: ResponseSource::Upstream }
    }

    fn fallback(value: T, reason: FallbackReason) -> Self {
        Self { value, source: ResponseSource::Fallback(reason) }
    }

    pub fn used_fallback(&self) -> bool {
        matches!(self.source, ResponseSource::Fallback(_))
    }
}

/// Front door of the engine. Tries the upstream service and substitutes the
/// deterministic analyzer on any failure, so every call returns a complete
/// value of the same shape.
///
/// Holds no per-call state; dropping a returned future abandons that call
/// without affecting others.
pub struct ResponseOrchestrator {
    classifier: EmotionClassifier,
    fallback: FallbackAnalyzer,
    upstream: Arc<dyn UpstreamClient>,
    notes: Option<Arc<dyn NoteStore>>,
    retry: RetryPolicy,
    max_recent_notes: usize,
}

impl ResponseOrchestrator {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            classifier: EmotionClassifier::default(),
            fallback: FallbackAnalyzer::default(),
            upstream,
            notes: None,
            retry: RetryPolicy::default(),
            max_recent_notes: DEFAULT_MAX_RECENT_NOTES,
        }
    }

    /// Build with the HTTP client described by `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, UpstreamError> {
        let client = GenerativeTextClient::new(config.upstream.clone())?;
        Ok(Self::new(Arc::new(client))
            .with_retry(config.retry)
            .with_max_recent_notes(config.max_recent_notes))
    }

    pub fn with_note_store(mut self, store: Arc<dyn NoteStore>) -> Self {
        self.notes = Some(store);
        self
    }

    pub fn with_classifier(mut self, classifier: EmotionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackAnalyzer) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_recent_notes(mut self, max_recent_notes: usize) -> Self {
        self.max_recent_notes = max_recent_notes;
        self
    }

    pub async fn get_chat_reply(&self, text: &str, client_id: Option<&str>, use_notes: bool) -> ChatReply {
        self.resolve_chat_reply(text, client_id, use_notes).await.value
    }

    pub async fn get_notes_analysis(&self, client_id: &str, note_ids: Option<&[String]>) -> NotesAnalysis {
        self.resolve_notes_analysis(client_id, note_ids).await.value
    }

    pub async fn get_session_summary(&self, turns: &[ConversationTurn]) -> SessionSummary {
        self.resolve_session_summary(turns).await.value
    }

    pub async fn resolve_chat_reply(
        &self,
        text: &str,
        client_id: Option<&str>,
        use_notes: bool,
    ) -> Resolution<ChatReply> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("chat_reply", request_id = %request_id, use_notes);

        async move {
            let context = self.classifier.classify(text);

            if !self.upstream.is_configured() {
                return self.chat_fallback(text, &context, FallbackReason::NotConfigured);
            }

            let notes = match client_id {
                Some(id) if use_notes => self.load_notes(id, None).await,
                _ => Vec::new(),
            };

            let request = PromptRequest::Chat { text, context: &context, notes: &notes };
            match self.call_upstream::<ChatPayload>(&request).await {
                Ok(payload) => Resolution::upstream(self.normalize_chat(payload, text, &context)),
                Err(e) => self.chat_fallback(text, &context, e.into()),
            }
        }
        .instrument(span)
        .await
    }

    pub async fn resolve_notes_analysis(
        &self,
        client_id: &str,
        note_ids: Option<&[String]>,
    ) -> Resolution<NotesAnalysis> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "notes_analysis",
            request_id = %request_id,
            explicit_ids = note_ids.map_or(0, <[String]>::len)
        );

        async move {
            let notes = self.load_notes(client_id, note_ids).await;

            if notes.is_empty() {
                tracing::info!("No notes retrieved, returning baseline analysis");
                return Resolution::fallback(self.fallback.baseline_analysis(), FallbackReason::EmptyInput);
            }

            if !self.upstream.is_configured() {
                return self.notes_fallback(&notes, FallbackReason::NotConfigured);
            }

            let request = PromptRequest::Notes { notes: &notes };
            match self.call_upstream::<NotesAnalysis>(&request).await {
                Ok(analysis) => Resolution::upstream(analysis),
                Err(e) => self.notes_fallback(&notes, e.into()),
            }
        }
        .instrument(span)
        .await
    }

    pub async fn resolve_session_summary(&self, turns: &[ConversationTurn]) -> Resolution<SessionSummary> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("session_summary", request_id = %request_id, turns = turns.len());

        async move {
            let client_text = turns
                .iter()
                .filter(|t| t.role == TurnRole::User)
                .map(|t| t.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let context = self.classifier.classify(&client_text);

            if turns.is_empty() {
                return self.summary_fallback(turns, &context, FallbackReason::EmptyInput);
            }
            if !self.upstream.is_configured() {
                return self.summary_fallback(turns, &context, FallbackReason::NotConfigured);
            }

            let request = PromptRequest::Summary { turns, context: &context };
            match self.call_upstream::<SessionSummary>(&request).await {
                Ok(summary) => Resolution::upstream(self.normalize_summary(summary, &client_text, &context)),
                Err(e) => self.summary_fallback(turns, &context, e.into()),
            }
        }
        .instrument(span)
        .await
    }

    /// Compose, call and extract, retrying per the policy. The only place
    /// upstream errors exist; callers turn any `Err` into a fallback.
    async fn call_upstream<T: DeserializeOwned>(&self, request: &PromptRequest<'_>) -> Result<T, EngineError> {
        let kind = request.kind();
        let prompt = compose_prompt(request);
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match self.upstream.generate(&prompt).await {
                Ok(raw) => extract::<T>(&raw, kind).map_err(EngineError::from),
                Err(e) => Err(EngineError::from(e)),
            };

            match result {
                Ok(value) => {
                    tracing::info!(kind = kind.label(), attempt, "Upstream response accepted");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        kind = kind.label(),
                        attempt,
                        error = %e,
                        "Upstream attempt failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Notes for the prompt. Retrieval problems degrade to "no notes".
    async fn load_notes(&self, client_id: &str, note_ids: Option<&[String]>) -> Vec<Note> {
        let Some(store) = &self.notes else {
            tracing::debug!("No note store configured");
            return Vec::new();
        };
        match store.fetch_notes(client_id, note_ids, self.max_recent_notes).await {
            Ok(notes) => notes,
            Err(e) => {
                tracing::warn!(error = %e, "Note retrieval failed, continuing without notes");
                Vec::new()
            }
        }
    }

    /// Fill what the model left out from the classified context and the
    /// deterministic rules.
    fn normalize_chat(&self, payload: ChatPayload, text: &str, context: &EmotionalContext) -> ChatReply {
        let meta = payload.metadata;
        let or_context = |list: Vec<String>, fallback: &std::collections::BTreeSet<String>| {
            if list.is_empty() {
                fallback.iter().cloned().collect()
            } else {
                list
            }
        };

        let strategies_suggested = if meta.strategies_suggested.is_empty() {
            self.fallback.chat_template(text, context).strategies.clone()
        } else {
            meta.strategies_suggested
        };

        ChatReply {
            content: payload.content,
            emotions_detected: or_context(meta.emotions_detected, &context.emotions),
            triggers_detected: or_context(meta.triggers_detected, &context.triggers),
            strategies_suggested,
            urgency: meta
                .urgency
                .unwrap_or_else(|| self.fallback.chat_urgency(text, context)),
            therapeutic_references: meta.therapeutic_references,
        }
    }

    fn normalize_summary(
        &self,
        mut summary: SessionSummary,
        client_text: &str,
        context: &EmotionalContext,
    ) -> SessionSummary {
        if summary.key_topics.is_empty() {
            summary.key_topics = context.triggers.iter().cloned().collect();
        }
        if summary.emotions_observed.is_empty() {
            summary.emotions_observed = context.emotions.iter().cloned().collect();
        }
        // Never report less urgency than the keyword rule finds.
        summary.urgency = summary
            .urgency
            .max(self.fallback.chat_urgency(client_text, context));
        summary
    }

    fn chat_fallback(&self, text: &str, context: &EmotionalContext, reason: FallbackReason) -> Resolution<ChatReply> {
        log_fallback("chat_reply", &reason);
        Resolution::fallback(self.fallback.fallback_chat_reply(text, context), reason)
    }

    fn notes_fallback(&self, notes: &[Note], reason: FallbackReason) -> Resolution<NotesAnalysis> {
        log_fallback("notes_analysis", &reason);
        Resolution::fallback(self.fallback.fallback_notes_analysis(notes), reason)
    }

    fn summary_fallback(
        &self,
        turns: &[ConversationTurn],
        context: &EmotionalContext,
        reason: FallbackReason,
    ) -> Resolution<SessionSummary> {
        log_fallback("session_summary", &reason);
        Resolution::fallback(self.fallback.fallback_session_summary(turns, context), reason)
    }
}

fn log_fallback(kind: &'static str, reason: &FallbackReason) {
    match reason {
        FallbackReason::NotConfigured | FallbackReason::EmptyInput => {
            tracing::info!(kind, reason = reason.as_str(), "Using deterministic fallback");
        }
        FallbackReason::UpstreamUnavailable(detail) => {
            tracing::warn!(kind, reason = reason.as_str(), detail = %detail, "Using deterministic fallback");
        }
        FallbackReason::Extraction(failure) => {
            tracing::warn!(kind, reason = reason.as_str(), detail = %failure, "Using deterministic fallback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::notes::InMemoryNoteStore;
    use crate::engine::prompt::NO_NOTES_PLACEHOLDER;
    use crate::engine::types::Urgency;
    use crate::engine::upstream::MockUpstreamClient;
    use crate::engine::NoteStoreError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    const CHAT_JSON: &str = r#"{"content": "I hear how heavy this feels.", "metadata": {
        "emotionsDetected": ["anxiety"], "triggersDetected": ["work"],
        "strategiesSuggested": ["Box breathing"], "urgency": "medium",
        "therapeuticReferences": ["CBT"]}}"#;

    const NOTES_JSON: &str = r#"{"summary": "Improving", "mainThemes": ["Sleep"],
        "progressMarkers": ["Sleeping better"], "recommendations": ["Keep routine"],
        "wellnessScore": 72, "attentionAreas": [], "strategies": ["Sleep hygiene"]}"#;

    fn orchestrator(mock: &Arc<MockUpstreamClient>) -> ResponseOrchestrator {
        ResponseOrchestrator::new(mock.clone())
    }

    async fn store_with_notes() -> Arc<InMemoryNoteStore> {
        let store = Arc::new(InMemoryNoteStore::new());
        for (day, text) in [(1, "Client anxious about job interview"), (9, "Reports sleeping better")] {
            store
                .add_note(
                    "client-1",
                    Note {
                        id: format!("n{day}"),
                        content: text.into(),
                        created_at: Utc.with_ymd_and_hms(2024, 2, day, 10, 0, 0).unwrap(),
                    },
                )
                .await;
        }
        store
    }

    #[tokio::test]
    async fn unconfigured_upstream_uses_fallback_without_calling() {
        let mock = Arc::new(MockUpstreamClient::unconfigured());
        let resolution = orchestrator(&mock)
            .resolve_chat_reply("I feel anxious about my presentation", None, false)
            .await;

        assert_eq!(resolution.source, ResponseSource::Fallback(FallbackReason::NotConfigured));
        assert!(resolution.value.emotions_detected.contains(&"anxiety".to_string()));
        assert_eq!(resolution.value.urgency, Urgency::Medium);
        assert!(!resolution.value.content.is_empty());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn network_failure_returns_complete_reply() {
        let mock = Arc::new(MockUpstreamClient::unreachable());
        let resolution = orchestrator(&mock)
            .resolve_chat_reply("I'm so sad and lonely", None, false)
            .await;

        assert!(resolution.used_fallback());
        match &resolution.source {
            ResponseSource::Fallback(reason) => assert_eq!(reason.as_str(), "upstream-unavailable"),
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(resolution.value.urgency, Urgency::Medium);
        assert!(!resolution.value.strategies_suggested.is_empty());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn valid_upstream_reply_is_returned() {
        let mock = Arc::new(MockUpstreamClient::new(CHAT_JSON));
        let resolution = orchestrator(&mock)
            .resolve_chat_reply("Work is crushing me", None, false)
            .await;

        assert_eq!(resolution.source, ResponseSource::Upstream);
        assert_eq!(resolution.value.content, "I hear how heavy this feels.");
        assert_eq!(resolution.value.strategies_suggested, vec!["Box breathing"]);
        assert_eq!(resolution.value.therapeutic_references, vec!["CBT"]);
    }

    #[tokio::test]
    async fn sparse_upstream_metadata_is_filled_from_context() {
        let mock = Arc::new(MockUpstreamClient::new(r#"{"content": "Thanks for telling me.", "metadata": {}}"#));
        let reply = orchestrator(&mock)
            .get_chat_reply("I'm worried about money", None, false)
            .await;

        assert_eq!(reply.content, "Thanks for telling me.");
        assert_eq!(reply.emotions_detected, vec!["anxiety"]);
        assert_eq!(reply.triggers_detected, vec!["money"]);
        assert_eq!(reply.urgency, Urgency::Medium);
        assert!(!reply.strategies_suggested.is_empty());
    }

    #[tokio::test]
    async fn unusable_output_falls_back_after_single_attempt() {
        let mock = Arc::new(MockUpstreamClient::new("I cannot answer in JSON today."));
        let resolution = orchestrator(&mock)
            .resolve_chat_reply("I feel stressed", None, false)
            .await;

        assert_eq!(
            resolution.source,
            ResponseSource::Fallback(FallbackReason::Extraction(ExtractionFailure::NoCandidateFound))
        );
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn retry_recovers_from_one_malformed_response() {
        let script = || vec![Ok("not json".to_string()), Ok(CHAT_JSON.to_string())];

        let mock = Arc::new(MockUpstreamClient::unreachable().with_script(script()));
        let resolution = orchestrator(&mock)
            .with_retry(RetryPolicy::retries(1))
            .resolve_chat_reply("hello", None, false)
            .await;
        assert_eq!(resolution.source, ResponseSource::Upstream);
        assert_eq!(mock.calls(), 2);

        let mock = Arc::new(MockUpstreamClient::unreachable().with_script(script()));
        let resolution = orchestrator(&mock).resolve_chat_reply("hello", None, false).await;
        assert!(resolution.used_fallback());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn non_retryable_status_stops_immediately() {
        let mock = Arc::new(MockUpstreamClient::new(CHAT_JSON).with_script(vec![Err(
            UpstreamError::Status { status: 401, body: "bad key".into() },
        )]));
        let resolution = orchestrator(&mock)
            .with_retry(RetryPolicy::retries(3))
            .resolve_chat_reply("hello", None, false)
            .await;
        assert!(resolution.used_fallback());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let mock = Arc::new(MockUpstreamClient::unreachable());
        let reply = orchestrator(&mock)
            .with_retry(RetryPolicy::retries(2))
            .get_chat_reply("hello", None, false)
            .await;
        assert!(!reply.content.is_empty());
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn chat_prompt_includes_notes_when_requested() {
        let mock = Arc::new(MockUpstreamClient::new(CHAT_JSON));
        let engine = orchestrator(&mock).with_note_store(store_with_notes().await);

        engine.get_chat_reply("How am I doing?", Some("client-1"), true).await;
        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("Reports sleeping better"));

        engine.get_chat_reply("How am I doing?", Some("client-1"), false).await;
        assert!(mock.last_prompt().unwrap().contains(NO_NOTES_PLACEHOLDER));
    }

    #[tokio::test]
    async fn note_store_failure_degrades_to_no_notes() {
        let mock = Arc::new(MockUpstreamClient::new(CHAT_JSON));
        let engine = orchestrator(&mock).with_note_store(store_with_notes().await);

        let resolution = engine.resolve_chat_reply("Hi", Some("unknown-client"), true).await;
        assert_eq!(resolution.source, ResponseSource::Upstream);
        assert!(mock.last_prompt().unwrap().contains(NO_NOTES_PLACEHOLDER));
    }

    #[tokio::test]
    async fn every_explicitly_requested_note_reaches_the_prompt() {
        let store = Arc::new(InMemoryNoteStore::new());
        for day in 1..=15u32 {
            store
                .add_note(
                    "client-2",
                    Note {
                        id: format!("n{day}"),
                        content: format!("Session entry {day}"),
                        created_at: Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap(),
                    },
                )
                .await;
        }
        let mock = Arc::new(MockUpstreamClient::new(NOTES_JSON));
        let engine = orchestrator(&mock).with_note_store(store);

        let ids: Vec<String> = (1..=15).map(|d| format!("n{d}")).collect();
        let resolution = engine.resolve_notes_analysis("client-2", Some(&ids)).await;
        assert_eq!(resolution.source, ResponseSource::Upstream);
        let prompt = mock.last_prompt().unwrap();
        for day in 1..=15 {
            assert!(prompt.contains(&format!("\"Session entry {day}\"")), "note {day} missing");
        }

        engine.resolve_notes_analysis("client-2", None).await;
        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("\"Session entry 15\""));
        assert!(!prompt.contains("\"Session entry 5\""));
    }

    struct UnavailableStore;

    #[async_trait]
    impl NoteStore for UnavailableStore {
        async fn fetch_notes(
            &self,
            _client_id: &str,
            _note_ids: Option<&[String]>,
            _limit: usize,
        ) -> Result<Vec<Note>, NoteStoreError> {
            Err(NoteStoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn unavailable_note_store_is_treated_as_no_notes() {
        let mock = Arc::new(MockUpstreamClient::new(CHAT_JSON));
        let engine = orchestrator(&mock).with_note_store(Arc::new(UnavailableStore));

        let reply = engine.resolve_chat_reply("Hello", Some("client-1"), true).await;
        assert_eq!(reply.source, ResponseSource::Upstream);
        assert!(mock.last_prompt().unwrap().contains(NO_NOTES_PLACEHOLDER));

        let analysis = engine.resolve_notes_analysis("client-1", None).await;
        assert_eq!(analysis.source, ResponseSource::Fallback(FallbackReason::EmptyInput));
        assert_eq!(analysis.value.wellness_score, 50);
    }

    #[tokio::test]
    async fn status_body_stays_out_of_fallback_detail() {
        let mock = Arc::new(MockUpstreamClient::new(CHAT_JSON).with_script(vec![Err(
            UpstreamError::Status { status: 400, body: "echo: I feel hopeless".into() },
        )]));
        let resolution = orchestrator(&mock).resolve_chat_reply("I feel hopeless", None, false).await;

        match resolution.source {
            ResponseSource::Fallback(FallbackReason::UpstreamUnavailable(detail)) => {
                assert!(detail.contains("400"));
                assert!(!detail.contains("hopeless"));
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_notes_returns_baseline_without_upstream_call() {
        let mock = Arc::new(MockUpstreamClient::new(NOTES_JSON));
        let resolution = orchestrator(&mock).resolve_notes_analysis("client-1", None).await;

        assert_eq!(resolution.source, ResponseSource::Fallback(FallbackReason::EmptyInput));
        assert_eq!(resolution.value.wellness_score, 50);
        assert!(!resolution.value.main_themes.is_empty());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn notes_analysis_from_upstream() {
        let mock = Arc::new(MockUpstreamClient::new(NOTES_JSON));
        let engine = orchestrator(&mock).with_note_store(store_with_notes().await);

        let resolution = engine.resolve_notes_analysis("client-1", None).await;
        assert_eq!(resolution.source, ResponseSource::Upstream);
        assert_eq!(resolution.value.wellness_score, 72);
        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("Client anxious about job interview"));
    }

    #[tokio::test]
    async fn notes_analysis_falls_back_on_bad_output() {
        let mock = Arc::new(MockUpstreamClient::new(r#"{"summary": "only this"}"#));
        let engine = orchestrator(&mock).with_note_store(store_with_notes().await);

        let resolution = engine
            .resolve_notes_analysis("client-1", Some(&["n1".to_string()]))
            .await;
        match &resolution.source {
            ResponseSource::Fallback(reason) => assert_eq!(reason.as_str(), "schema-mismatch"),
            other => panic!("unexpected source {other:?}"),
        }
        assert!(resolution.value.wellness_score <= 100);
        assert!(resolution.value.main_themes.contains(&"Anxiety management".to_string()));
    }

    #[tokio::test]
    async fn session_summary_paths() {
        let turns = vec![
            ConversationTurn::user("I'm overwhelmed by my boss"),
            ConversationTurn::assistant("That sounds like a lot."),
        ];

        let mock = Arc::new(MockUpstreamClient::new(
            r#"{"summary": "Talked about work.", "keyTopics": [], "emotionsObserved": [], "followUps": ["Check in on workload"]}"#,
        ));
        let resolution = orchestrator(&mock).resolve_session_summary(&turns).await;
        assert_eq!(resolution.source, ResponseSource::Upstream);
        assert_eq!(resolution.value.key_topics, vec!["work"]);
        assert_eq!(resolution.value.emotions_observed, vec!["stress"]);

        let empty = orchestrator(&mock).resolve_session_summary(&[]).await;
        assert_eq!(empty.source, ResponseSource::Fallback(FallbackReason::EmptyInput));
        assert_eq!(mock.calls(), 1);
    }

    struct SlowUpstream;

    #[async_trait]
    impl UpstreamClient for SlowUpstream {
        async fn generate(&self, _prompt: &str) -> Result<String, UpstreamError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CHAT_JSON.to_string())
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn caller_cancellation_leaves_engine_usable() {
        let engine = ResponseOrchestrator::new(Arc::new(SlowUpstream));
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            engine.get_chat_reply("hello", None, false),
        )
        .await;
        assert!(cancelled.is_err());

        let again = tokio::time::timeout(
            Duration::from_millis(50),
            engine.get_chat_reply("hello", None, false),
        )
        .await;
        assert!(again.is_err());
    }

    #[test]
    fn fallback_reason_from_engine_error() {
        let reason = FallbackReason::from(EngineError::from(UpstreamError::ConfigurationMissing));
        assert_eq!(reason, FallbackReason::NotConfigured);
        let reason = FallbackReason::from(EngineError::from(UpstreamError::Timeout(5)));
        assert_eq!(reason.as_str(), "upstream-unavailable");
        let reason = FallbackReason::from(EngineError::from(ExtractionFailure::NoCandidateFound));
        assert_eq!(reason.as_str(), "no-candidate-found");
    }

    #[test]
    fn from_config_builds_unconfigured_client_by_default() {
        let engine = ResponseOrchestrator::from_config(&EngineConfig::default()).unwrap();
        assert!(!engine.upstream.is_configured());
        assert_eq!(engine.max_recent_notes, 10);
    }
}
