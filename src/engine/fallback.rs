//! Deterministic keyword analyzer used whenever the upstream path fails.
//!
//! Produces exactly the same output shapes as the upstream path, from keyword
//! scans and fixed templates only. Every entry point is total: any input,
//! including an empty one, yields a complete value.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::lexicon::{contains_any, contains_term, owned_terms, KeywordGroup};
use super::types::{
    clamp_wellness_score, ChatReply, ConversationTurn, EmotionalContext, Note, NotesAnalysis,
    SessionSummary, TurnRole, Urgency,
};

// ═══════════════════════════════════════════
// Rules
// ═══════════════════════════════════════════

/// One templated chat response and what selects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTemplate {
    pub family: String,
    /// Classified emotion labels that select this template.
    pub emotions: Vec<String>,
    /// Lower-case keywords that select this template directly from the text.
    pub keywords: Vec<String>,
    pub content: String,
    pub strategies: Vec<String>,
    pub references: Vec<String>,
    pub urgency: Urgency,
}

/// A notes theme and the strategies it suggests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeRule {
    pub label: String,
    pub keywords: Vec<String>,
    pub strategies: Vec<String>,
}

/// Summary wording and recommendations for scores at or above `min_score`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub min_score: u8,
    pub summary: String,
    pub recommendations: Vec<String>,
}

/// Keyword lists and templates for the fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRules {
    /// Checked in order; the first matching family wins.
    pub chat_families: Vec<ChatTemplate>,
    pub generic_chat: ChatTemplate,
    pub themes: Vec<ThemeRule>,
    pub progress_markers: Vec<KeywordGroup>,
    pub attention_areas: Vec<KeywordGroup>,
    /// Highest `min_score` first.
    pub score_bands: Vec<ScoreBand>,
    pub default_strategies: Vec<String>,
    pub baseline: NotesAnalysis,
    /// Cap on themes, progress markers, attention areas and strategies.
    pub max_list_items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: i64,
}

impl WeightedTerm {
    fn new(term: &str, weight: i64) -> Self {
        Self { term: term.to_string(), weight }
    }
}

/// Wellness score = `baseline` + matched positive weights - matched negative
/// weights, clamped to 0..=100. Each term counts once however often it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub baseline: i64,
    pub positive: Vec<WeightedTerm>,
    pub negative: Vec<WeightedTerm>,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        let weighted = |items: &[(&str, i64)]| -> Vec<WeightedTerm> {
            items.iter().map(|(t, w)| WeightedTerm::new(t, *w)).collect()
        };
        Self {
            baseline: 50,
            positive: weighted(&[
                ("better", 5),
                ("improv", 5),
                ("progress", 5),
                ("calm", 4),
                ("hopeful", 5),
                ("grateful", 4),
                ("coping well", 5),
                ("sleeping well", 5),
                ("exercis", 3),
                ("motivated", 4),
                ("mejor", 5),
                ("tranquil", 4),
                ("mieux", 5),
                ("progrès", 5),
            ]),
            negative: weighted(&[
                ("worse", 5),
                ("anxi", 3),
                ("panic", 5),
                ("hopeless", 8),
                ("insomnia", 4),
                ("can't sleep", 4),
                ("isolat", 4),
                ("relapse", 6),
                ("crisis", 8),
                ("self-harm", 15),
                ("suicid", 15),
                ("peor", 5),
                ("pire", 5),
            ]),
        }
    }
}

impl Default for FallbackRules {
    fn default() -> Self {
        Self {
            chat_families: vec![
                ChatTemplate {
                    family: "anxiety".into(),
                    emotions: owned_terms(&["anxiety", "panic"]),
                    keywords: owned_terms(&[
                        "anxious", "anxiety", "worried", "worry", "nervous", "panic", "scared",
                        "afraid", "ansiedad", "preocupad", "anxieux", "anxieuse", "inquiet",
                    ]),
                    content: "It sounds like you're carrying a lot of worry right now, and that \
                              can be exhausting. Let's slow things down for a moment. Try taking \
                              a slow breath in for four counts and out for six, a few times."
                        .into(),
                    strategies: owned_terms(&[
                        "Paced breathing (inhale 4, exhale 6)",
                        "5-4-3-2-1 grounding exercise",
                        "Write down the worry and one thing within your control",
                    ]),
                    references: owned_terms(&["Cognitive Behavioral Therapy", "Mindfulness-based stress reduction"]),
                    urgency: Urgency::Medium,
                },
                ChatTemplate {
                    family: "sadness".into(),
                    emotions: owned_terms(&["sadness", "depression"]),
                    keywords: owned_terms(&[
                        "sad", "feeling down", "feel down", "lonely", "empty", "hopeless", "crying", "depressed",
                        "triste", "deprimid", "déprimé",
                    ]),
                    content: "I'm sorry you're feeling this low. What you're feeling matters, \
                              and you don't have to go through it alone. Would it help to talk \
                              about what has been weighing on you?"
                        .into(),
                    strategies: owned_terms(&[
                        "Plan one small, pleasant activity for today",
                        "Reach out to someone you trust",
                        "Keep a simple mood journal",
                    ]),
                    references: owned_terms(&["Behavioral activation", "Self-compassion practice"]),
                    urgency: Urgency::Medium,
                },
                ChatTemplate {
                    family: "stress".into(),
                    emotions: owned_terms(&["stress"]),
                    keywords: owned_terms(&[
                        "stress", "overwhelmed", "pressure", "too much", "burned out",
                        "burnt out", "estrés", "agobiad", "débordé",
                    ]),
                    content: "That sounds like a lot of pressure. When everything feels urgent, \
                              it can help to step back and pick just one thing to focus on first."
                        .into(),
                    strategies: owned_terms(&[
                        "Break tasks into small next steps",
                        "Schedule short breaks during the day",
                        "Progressive muscle relaxation",
                    ]),
                    references: owned_terms(&["Stress inoculation", "Problem-solving therapy"]),
                    urgency: Urgency::Low,
                },
            ],
            generic_chat: ChatTemplate {
                family: "general".into(),
                emotions: Vec::new(),
                keywords: Vec::new(),
                content: "Thank you for sharing that with me. I'm here to listen. Could you \
                          tell me a little more about how you've been feeling?"
                    .into(),
                strategies: owned_terms(&["Take a moment to notice how your body feels", "Reflective journaling"]),
                references: owned_terms(&["Person-centered therapy"]),
                urgency: Urgency::Low,
            },
            themes: vec![
                ThemeRule {
                    label: "Anxiety management".into(),
                    keywords: owned_terms(&["anxi", "worr", "panic", "nervous", "ansiedad", "preocup", "inquiet"]),
                    strategies: owned_terms(&["Paced breathing", "Cognitive restructuring of anxious thoughts"]),
                },
                ThemeRule {
                    label: "Low mood".into(),
                    keywords: owned_terms(&["sad", "depress", "low mood", "hopeless", "triste", "deprim"]),
                    strategies: owned_terms(&["Behavioral activation", "Mood tracking"]),
                },
                ThemeRule {
                    label: "Work stress".into(),
                    keywords: owned_terms(&["work", "job", "boss", "deadline", "burnout", "trabajo", "travail"]),
                    strategies: owned_terms(&["Boundary setting at work", "Time blocking"]),
                },
                ThemeRule {
                    label: "Relationships".into(),
                    keywords: owned_terms(&[
                        "relationship", "partner", "marriage", "family", "conflict", "pareja",
                        "familia", "famille",
                    ]),
                    strategies: owned_terms(&["Assertive communication practice"]),
                },
                ThemeRule {
                    label: "Sleep".into(),
                    keywords: owned_terms(&["sleep", "insomnia", "tired", "nightmare", "sueño", "sommeil"]),
                    strategies: owned_terms(&["Sleep hygiene routine"]),
                },
                ThemeRule {
                    label: "Self-esteem".into(),
                    keywords: owned_terms(&["confidence", "self-esteem", "worthless", "autoestima", "confiance"]),
                    strategies: owned_terms(&["Strengths journaling", "Challenging self-critical thoughts"]),
                },
                ThemeRule {
                    label: "Grief and loss".into(),
                    keywords: owned_terms(&["grief", "griev", "loss", "passed away", "duelo", "deuil"]),
                    strategies: owned_terms(&["Grief processing exercises"]),
                },
            ],
            progress_markers: vec![
                KeywordGroup::new("Reports feeling better", &["better", "improv", "mejor", "mieux"]),
                KeywordGroup::new(
                    "Uses coping strategies",
                    &["breathing", "coping", "journal", "meditat", "mindful"],
                ),
                KeywordGroup::new("Improved sleep", &["sleeping better", "slept well", "sleeping well"]),
                KeywordGroup::new("More social connection", &["friends", "reconnect", "social"]),
                KeywordGroup::new("Working toward goals", &["goal", "achiev", "progress", "progreso", "progrès"]),
            ],
            attention_areas: vec![
                KeywordGroup::new(
                    "Safety risk (self-harm mentioned)",
                    &["self-harm", "suicid", "hurt myself", "kill myself", "end it all"],
                ),
                KeywordGroup::new("Hopelessness", &["hopeless", "no point", "sin esperanza", "désespéré"]),
                KeywordGroup::new("Sleep disruption", &["insomnia", "can't sleep", "not sleeping", "nightmare"]),
                KeywordGroup::new("Social isolation", &["isolat", "alone", "lonely", "aislad"]),
                KeywordGroup::new("Substance use", &["alcohol", "drinking", "drugs"]),
                KeywordGroup::new("Escalating anxiety", &["panic attack", "panic"]),
            ],
            score_bands: vec![
                ScoreBand {
                    min_score: 70,
                    summary: "Notes indicate steady progress".into(),
                    recommendations: owned_terms(&[
                        "Consolidate the strategies that are working",
                        "Consider spacing sessions as stability holds",
                    ]),
                },
                ScoreBand {
                    min_score: 40,
                    summary: "Notes show a mixed picture of progress and ongoing difficulty".into(),
                    recommendations: owned_terms(&[
                        "Keep the current session cadence",
                        "Revisit coping strategies that have been less effective",
                    ]),
                },
                ScoreBand {
                    min_score: 0,
                    summary: "Notes point to significant ongoing distress".into(),
                    recommendations: owned_terms(&[
                        "Review the safety plan at the next session",
                        "Consider increasing session frequency",
                        "Coordinate with other care providers where appropriate",
                    ]),
                },
            ],
            default_strategies: owned_terms(&["Regular check-ins", "Mindfulness practice"]),
            baseline: NotesAnalysis {
                summary: "No session notes are available yet. This is a baseline assessment."
                    .into(),
                main_themes: owned_terms(&["Initial assessment", "Establishing rapport", "Goal setting"]),
                progress_markers: Vec::new(),
                recommendations: owned_terms(&[
                    "Complete an intake assessment",
                    "Agree on initial therapy goals",
                    "Schedule regular sessions",
                ]),
                wellness_score: 50,
                attention_areas: Vec::new(),
                strategies: owned_terms(&["Psychoeducation", "Mood tracking"]),
            },
            max_list_items: 5,
        }
    }
}

// ═══════════════════════════════════════════
// Analyzer
// ═══════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct FallbackAnalyzer {
    rules: Arc<FallbackRules>,
    weights: Arc<ScoringWeights>,
}

impl Default for FallbackAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(FallbackRules::default()), Arc::new(ScoringWeights::default()))
    }
}

impl FallbackAnalyzer {
    pub fn new(rules: Arc<FallbackRules>, weights: Arc<ScoringWeights>) -> Self {
        Self { rules, weights }
    }

    pub fn rules(&self) -> &FallbackRules {
        &self.rules
    }

    /// The first chat family matching the text or the classified emotions,
    /// or the generic template.
    pub fn chat_template(&self, text: &str, context: &EmotionalContext) -> &ChatTemplate {
        let lower = text.to_lowercase();
        self.rules
            .chat_families
            .iter()
            .find(|t| {
                contains_any(&lower, &t.keywords) || t.emotions.iter().any(|e| context.has_emotion(e))
            })
            .unwrap_or(&self.rules.generic_chat)
    }

    pub fn chat_urgency(&self, text: &str, context: &EmotionalContext) -> Urgency {
        self.chat_template(text, context).urgency
    }

    pub fn fallback_chat_reply(&self, text: &str, context: &EmotionalContext) -> ChatReply {
        let template = self.chat_template(text, context);

        let mut content = template.content.clone();
        if let Some(trigger) = context.triggers.iter().next() {
            content.push_str(&format!(
                " It sounds like {trigger} has been part of this, and we can look at that together."
            ));
        }

        ChatReply {
            content,
            emotions_detected: context.emotions.iter().cloned().collect(),
            triggers_detected: context.triggers.iter().cloned().collect(),
            strategies_suggested: template.strategies.clone(),
            urgency: template.urgency,
            therapeutic_references: template.references.clone(),
        }
    }

    pub fn baseline_analysis(&self) -> NotesAnalysis {
        let mut baseline = self.rules.baseline.clone();
        baseline.wellness_score = clamp_wellness_score(self.weights.baseline);
        baseline
    }

    pub fn fallback_notes_analysis(&self, notes: &[Note]) -> NotesAnalysis {
        if notes.is_empty() {
            return self.baseline_analysis();
        }

        let lower = notes
            .iter()
            .map(|n| n.content.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        let cap = self.rules.max_list_items;

        let matched_themes: Vec<&ThemeRule> = self
            .rules
            .themes
            .iter()
            .filter(|t| contains_any(&lower, &t.keywords))
            .take(cap)
            .collect();
        let main_themes: Vec<String> = matched_themes.iter().map(|t| t.label.clone()).collect();
        let progress_markers = matched_labels(&self.rules.progress_markers, &lower, cap);
        let attention_areas = matched_labels(&self.rules.attention_areas, &lower, cap);

        let mut strategies: Vec<String> = Vec::new();
        for strategy in matched_themes.iter().flat_map(|t| t.strategies.iter()) {
            if !strategies.contains(strategy) {
                strategies.push(strategy.clone());
            }
        }
        strategies.truncate(cap);
        if strategies.is_empty() {
            strategies = self.rules.default_strategies.clone();
        }

        let wellness_score = self.wellness_score(&lower);
        let band = self
            .rules
            .score_bands
            .iter()
            .find(|b| wellness_score >= b.min_score)
            .or_else(|| self.rules.score_bands.last());

        let band_summary = band.map_or("Notes reviewed", |b| b.summary.as_str());
        let themes_sentence = if main_themes.is_empty() {
            "No recurring theme stood out.".to_string()
        } else {
            format!("Recurring themes: {}.", main_themes.join(", "))
        };
        let summary = format!(
            "{band_summary} across {} note{}. {themes_sentence}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" },
        );

        NotesAnalysis {
            summary,
            main_themes,
            progress_markers,
            recommendations: band.map(|b| b.recommendations.clone()).unwrap_or_default(),
            wellness_score,
            attention_areas,
            strategies,
        }
    }

    /// Score already lower-cased text with the configured weights.
    pub fn wellness_score(&self, lower: &str) -> u8 {
        let sum = |terms: &[WeightedTerm]| -> i64 {
            terms
                .iter()
                .filter(|t| contains_term(lower, &t.term))
                .map(|t| t.weight)
                .sum()
        };
        let raw = self
            .weights
            .baseline
            .saturating_add(sum(&self.weights.positive))
            .saturating_sub(sum(&self.weights.negative));
        clamp_wellness_score(raw)
    }

    pub fn fallback_session_summary(
        &self,
        turns: &[ConversationTurn],
        context: &EmotionalContext,
    ) -> SessionSummary {
        let client_text = turns
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let client_turns = turns.iter().filter(|t| t.role == TurnRole::User).count();
        let template = self.chat_template(&client_text, context);

        let key_topics: Vec<String> = context.triggers.iter().cloned().collect();
        let emotions_observed: Vec<String> = context.emotions.iter().cloned().collect();

        let topics_sentence = if key_topics.is_empty() {
            "No specific life area was named.".to_string()
        } else {
            format!("Topics raised: {}.", key_topics.join(", "))
        };
        let emotions_sentence = if emotions_observed.is_empty() {
            "No strong emotion was clearly expressed.".to_string()
        } else {
            format!("Emotions observed: {}.", emotions_observed.join(", "))
        };

        SessionSummary {
            summary: format!(
                "Conversation of {} message{} ({client_turns} from the client). \
                 {topics_sentence} {emotions_sentence}",
                turns.len(),
                if turns.len() == 1 { "" } else { "s" },
            ),
            key_topics,
            emotions_observed,
            follow_ups: template.strategies.clone(),
            urgency: template.urgency,
        }
    }
}

fn matched_labels(groups: &[KeywordGroup], lower: &str, cap: usize) -> Vec<String> {
    groups
        .iter()
        .filter(|g| g.matches(lower))
        .take(cap)
        .map(|g| g.label.clone())
        .collect()
}
