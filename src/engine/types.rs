use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ═══════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════

/// How strongly the user expressed what they feel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    #[default]
    Low,
    Medium,
    High,
}

impl Intensity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Emotions, triggers and intensity derived from a single user message.
///
/// Built once per input by the classifier and shared by the prompt path and
/// the fallback path, so both report the same labels.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmotionalContext {
    pub emotions: BTreeSet<String>,
    pub triggers: BTreeSet<String>,
    pub intensity: Intensity,
}

impl EmotionalContext {
    pub fn has_emotion(&self, label: &str) -> bool {
        self.emotions.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.emotions.is_empty() && self.triggers.is_empty()
    }
}

// ═══════════════════════════════════════════
// Caller-facing payloads
// ═══════════════════════════════════════════

/// Urgency attached to a chat turn. Always exactly one of three values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Case-insensitive parse. "moderate" is accepted as a synonym of medium
    /// since models use it interchangeably.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Urgency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Urgency::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown urgency '{raw}'")))
    }
}

/// One conversational turn returned to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub content: String,
    pub emotions_detected: Vec<String>,
    pub triggers_detected: Vec<String>,
    pub strategies_suggested: Vec<String>,
    pub urgency: Urgency,
    pub therapeutic_references: Vec<String>,
}

/// Analysis of a client's session notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesAnalysis {
    pub summary: String,
    pub main_themes: Vec<String>,
    pub progress_markers: Vec<String>,
    pub recommendations: Vec<String>,
    /// Always within 0..=100, whatever the source.
    #[serde(deserialize_with = "deserialize_wellness_score")]
    pub wellness_score: u8,
    pub attention_areas: Vec<String>,
    pub strategies: Vec<String>,
}

/// Summary of a whole chat session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub summary: String,
    pub key_topics: Vec<String>,
    pub emotions_observed: Vec<String>,
    pub follow_ups: Vec<String>,
    #[serde(default)]
    pub urgency: Urgency,
}

/// Clamp any integer score into the 0..=100 wellness range.
pub fn clamp_wellness_score(score: i64) -> u8 {
    score.clamp(0, 100) as u8
}

fn deserialize_wellness_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawScore {
        Number(f64),
        Text(String),
    }

    let value = match RawScore::deserialize(deserializer)? {
        RawScore::Number(n) => n,
        RawScore::Text(s) => s
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("wellnessScore '{s}' is not a number")))?,
    };
    if !value.is_finite() {
        return Err(serde::de::Error::custom("wellnessScore is not finite"));
    }
    Ok(value.round().clamp(0.0, 100.0) as u8)
}

// ═══════════════════════════════════════════
// Collaborator inputs
// ═══════════════════════════════════════════

/// A clinical note as handed over by the note store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into() }
    }
}

// ═══════════════════════════════════════════
// Upstream wire shapes
// ═══════════════════════════════════════════

/// Chat payload as the upstream service is asked to emit it:
/// the reply text plus a metadata object.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    pub content: String,
    pub metadata: ChatMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatMetadata {
    pub emotions_detected: Vec<String>,
    pub triggers_detected: Vec<String>,
    pub strategies_suggested: Vec<String>,
    pub urgency: Option<Urgency>,
    pub therapeutic_references: Vec<String>,
}

// ═══════════════════════════════════════════
// Request kinds
// ═══════════════════════════════════════════

/// The closed set of structured outputs the engine can request.
/// Each kind owns its schema text and required top-level fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    ChatReply,
    NotesAnalysis,
    SessionSummary,
}

impl OutputKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ChatReply => "chat_reply",
            Self::NotesAnalysis => "notes_analysis",
            Self::SessionSummary => "session_summary",
        }
    }

    /// Top-level fields that must be present in an extracted object.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::ChatReply => &["content", "metadata"],
            Self::NotesAnalysis => &[
                "summary",
                "mainThemes",
                "progressMarkers",
                "recommendations",
                "wellnessScore",
                "attentionAreas",
                "strategies",
            ],
            Self::SessionSummary => &["summary", "keyTopics", "emotionsObserved", "followUps"],
        }
    }

    /// JSON template shown to the upstream service.
    pub fn schema(&self) -> &'static str {
        match self {
            Self::ChatReply => CHAT_REPLY_SCHEMA,
            Self::NotesAnalysis => NOTES_ANALYSIS_SCHEMA,
            Self::SessionSummary => SESSION_SUMMARY_SCHEMA,
        }
    }
}

const CHAT_REPLY_SCHEMA: &str = r#"{
  "content": "your empathetic reply to the client",
  "metadata": {
    "emotionsDetected": ["emotion label"],
    "triggersDetected": ["trigger label"],
    "strategiesSuggested": ["concrete coping strategy"],
    "urgency": "low | medium | high",
    "therapeuticReferences": ["technique or framework referenced"]
  }
}"#;

const NOTES_ANALYSIS_SCHEMA: &str = r#"{
  "summary": "short narrative summary of the notes",
  "mainThemes": ["theme"],
  "progressMarkers": ["observed progress"],
  "recommendations": ["recommendation for the next sessions"],
  "wellnessScore": 0,
  "attentionAreas": ["area needing attention"],
  "strategies": ["strategy to practice"]
}"#;

const SESSION_SUMMARY_SCHEMA: &str = r#"{
  "summary": "short narrative summary of the conversation",
  "keyTopics": ["topic"],
  "emotionsObserved": ["emotion label"],
  "followUps": ["suggested follow-up"],
  "urgency": "low | medium | high"
}"#;
