use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::UpstreamError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Credential values that ship in sample configs and never authenticate.
const PLACEHOLDER_CREDENTIALS: &[&str] = &["your_api_key_here", "your_api_key", "changeme", "placeholder"];
const PLACEHOLDER_PREFIXES: &[&str] = &["your", "<", "xxx"];

/// A hosted text-completion service: one prompt in, one text blob out.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;

    /// Whether a usable credential is present. Checked before every call.
    fn is_configured(&self) -> bool;
}

/// Sampling parameters. Fixed per client, never varied per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub generation: GenerationConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            generation: GenerationConfig::default(),
        }
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("generation", &self.generation)
            .finish()
    }
}

impl UpstreamConfig {
    pub fn has_usable_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !is_placeholder_credential(key))
    }
}

/// True for empty keys and for the sample values people forget to replace.
pub fn is_placeholder_credential(key: &str) -> bool {
    let key = key.trim();
    if key.is_empty() {
        return true;
    }
    let lower = key.to_lowercase();
    PLACEHOLDER_CREDENTIALS.contains(&lower.as_str())
        || PLACEHOLDER_PREFIXES.iter().any(|p| lower.starts_with(p))
}

// ═══════════════════════════════════════════
// HTTP client
// ═══════════════════════════════════════════

/// Client for a `generateContent`-style completion endpoint.
pub struct GenerativeTextClient {
    config: UpstreamConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerativeTextClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::HttpClient(e.to_string()))?;

        let config = UpstreamConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }
}

#[async_trait]
impl UpstreamClient for GenerativeTextClient {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !is_placeholder_credential(key) => key,
            _ => return Err(UpstreamError::ConfigurationMissing),
        };

        let body = GenerateRequest {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
            generation_config: &self.config.generation,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout(self.config.timeout_secs)
                } else if e.is_connect() {
                    UpstreamError::Connection(self.config.base_url.clone())
                } else {
                    UpstreamError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Envelope(e.to_string()))?;

        candidate_text(parsed)
    }

    fn is_configured(&self) -> bool {
        self.config.has_usable_credential()
    }
}

/// Concatenate the text parts of the first candidate.
fn candidate_text(response: GenerateResponse) -> Result<String, UpstreamError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map_or_else(|| "no candidate text".to_string(), |r| format!("prompt blocked: {r}"));
        return Err(UpstreamError::Envelope(reason));
    }
    Ok(text)
}

// ═══════════════════════════════════════════
// Mock
// ═══════════════════════════════════════════

/// Scripted upstream for tests and offline demos.
///
/// Scripted replies are served first, in order; after that every call gets
/// the default response, or a connection error when there is none.
pub struct MockUpstreamClient {
    configured: bool,
    script: Mutex<VecDeque<Result<String, UpstreamError>>>,
    default_response: Option<String>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockUpstreamClient {
    pub fn new(response: &str) -> Self {
        Self {
            configured: true,
            script: Mutex::new(VecDeque::new()),
            default_response: Some(response.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Configured, but every call fails as if the network were down.
    pub fn unreachable() -> Self {
        Self {
            default_response: None,
            ..Self::new("")
        }
    }

    /// Reports no credential; calling it anyway is a configuration error.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::unreachable()
        }
    }

    pub fn with_script(self, replies: Vec<Result<String, UpstreamError>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            ..self
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstreamClient {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(prompt.to_string());

        if !self.configured {
            return Err(UpstreamError::ConfigurationMissing);
        }

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match scripted {
            Some(reply) => reply,
            None => self
                .default_response
                .clone()
                .ok_or_else(|| UpstreamError::Connection("mock://upstream".into())),
        }
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Captured {
        action: String,
        api_key: Option<String>,
        body: Value,
    }

    type CaptureLog = Arc<Mutex<Vec<Captured>>>;

    /// Local stand-in for the completion endpoint answering every request
    /// with `status` and `reply` after `delay`.
    async fn spawn_stub(status: StatusCode, reply: Value, delay: Duration) -> (String, CaptureLog) {
        let log: CaptureLog = Arc::default();
        let app = Router::new()
            .route(
                "/models/:action",
                post(
                    move |State((log, status, reply)): State<(CaptureLog, StatusCode, Value)>,
                     Path(action): Path<String>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let api_key = headers
                            .get("x-goog-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        log.lock().unwrap().push(Captured { action, api_key, body });
                        tokio::time::sleep(delay).await;
                        (status, Json(reply))
                    },
                ),
            )
            .with_state((log.clone(), status, reply));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), log)
    }

    fn config_for(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            api_key: Some("test-key-123".into()),
            base_url: base_url.to_string(),
            model: "test-model".into(),
            timeout_secs: 5,
            generation: GenerationConfig::default(),
        }
    }

    fn candidate_reply(parts: &[&str]) -> Value {
        let parts: Vec<Value> = parts.iter().map(|t| json!({ "text": t })).collect();
        json!({ "candidates": [{ "content": { "role": "model", "parts": parts } }] })
    }

    #[test]
    fn placeholder_credentials_are_detected() {
        for key in ["", "   ", "your_api_key_here", "YOUR_API_KEY", "changeme", "placeholder", "<api-key>", "xxx-xxx", "your-key"] {
            assert!(is_placeholder_credential(key), "{key:?} should be a placeholder");
        }
        assert!(!is_placeholder_credential("AIzaSyD-real-looking-key"));
    }

    #[test]
    fn missing_or_placeholder_key_is_unconfigured() {
        let mut config = UpstreamConfig::default();
        assert!(!GenerativeTextClient::new(config.clone()).unwrap().is_configured());
        config.api_key = Some("your_api_key_here".into());
        assert!(!GenerativeTextClient::new(config.clone()).unwrap().is_configured());
        config.api_key = Some("real-key".into());
        assert!(GenerativeTextClient::new(config).unwrap().is_configured());
    }

    #[test]
    fn debug_output_redacts_credential() {
        let config = config_for("http://localhost");
        let debug = format!("{config:?}");
        assert!(!debug.contains("test-key-123"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = GenerativeTextClient::new(config_for("http://localhost:9000/v1beta/")).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:9000/v1beta/models/test-model:generateContent"
        );
    }

    #[tokio::test]
    async fn sends_prompt_key_and_generation_config() {
        let (base_url, log) =
            spawn_stub(StatusCode::OK, candidate_reply(&["{\"a\":", " 1}"]), Duration::ZERO).await;
        let client = GenerativeTextClient::new(config_for(&base_url)).unwrap();

        let text = client.generate("hello prompt").await.unwrap();
        assert_eq!(text, "{\"a\": 1}");

        let captured = log.lock().unwrap()[0].clone();
        assert_eq!(captured.action, "test-model:generateContent");
        assert_eq!(captured.api_key.as_deref(), Some("test-key-123"));
        assert_eq!(captured.body["contents"][0]["role"], "user");
        assert_eq!(captured.body["contents"][0]["parts"][0]["text"], "hello prompt");
        assert_eq!(captured.body["generationConfig"]["topK"], 40);
        assert_eq!(captured.body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let (base_url, _) =
            spawn_stub(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "busy"}), Duration::ZERO).await;
        let client = GenerativeTextClient::new(config_for(&base_url)).unwrap();

        match client.generate("p").await {
            Err(UpstreamError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert!(body.contains("busy"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_candidates_are_envelope_errors() {
        let reply = json!({ "candidates": [], "promptFeedback": { "blockReason": "SAFETY" } });
        let (base_url, _) = spawn_stub(StatusCode::OK, reply, Duration::ZERO).await;
        let client = GenerativeTextClient::new(config_for(&base_url)).unwrap();

        match client.generate("p").await {
            Err(UpstreamError::Envelope(reason)) => assert!(reason.contains("SAFETY")),
            other => panic!("expected envelope error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GenerativeTextClient::new(config_for(&format!("http://{addr}"))).unwrap();
        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Connection(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let (base_url, _) =
            spawn_stub(StatusCode::OK, candidate_reply(&["late"]), Duration::from_secs(3)).await;
        let mut config = config_for(&base_url);
        config.timeout_secs = 1;
        let client = GenerativeTextClient::new(config).unwrap();

        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(1)), "got {err:?}");
    }

    #[tokio::test]
    async fn placeholder_key_never_touches_the_network() {
        let (base_url, log) = spawn_stub(StatusCode::OK, candidate_reply(&["x"]), Duration::ZERO).await;
        let mut config = config_for(&base_url);
        config.api_key = Some("YOUR_API_KEY".into());
        let client = GenerativeTextClient::new(config).unwrap();

        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, UpstreamError::ConfigurationMissing));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mock_serves_script_then_default() {
        let mock = MockUpstreamClient::new("default").with_script(vec![
            Err(UpstreamError::Timeout(1)),
            Ok("scripted".into()),
        ]);
        assert!(mock.generate("a").await.is_err());
        assert_eq!(mock.generate("b").await.unwrap(), "scripted");
        assert_eq!(mock.generate("c").await.unwrap(), "default");
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.last_prompt().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn unreachable_and_unconfigured_mocks() {
        let down = MockUpstreamClient::unreachable();
        assert!(down.is_configured());
        assert!(matches!(down.generate("p").await, Err(UpstreamError::Connection(_))));

        let off = MockUpstreamClient::unconfigured();
        assert!(!off.is_configured());
        assert!(matches!(off.generate("p").await, Err(UpstreamError::ConfigurationMissing)));
    }
}
