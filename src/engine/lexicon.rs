//! Keyword data for the classifier and the fallback analyzer.
//!
//! Lexicons are plain immutable values handed to the components that use them,
//! so several locale configurations can live side by side.

use serde::{Deserialize, Serialize};

/// A label and the lower-case keywords that signal it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordGroup {
    pub label: String,
    pub keywords: Vec<String>,
}

impl KeywordGroup {
    pub fn new(label: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// True when any keyword occurs in `lower` (already lower-cased).
    pub fn matches(&self, lower: &str) -> bool {
        contains_any(lower, &self.keywords)
    }
}

/// Find `term` in `lower` starting at a word boundary.
///
/// Terms may be stems ("preocupad" matches "preocupada"), but they must start a
/// word, so "mum" does not fire inside "minimum".
pub fn contains_term(lower: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    lower.match_indices(term).any(|(idx, _)| {
        lower[..idx]
            .chars()
            .next_back()
            .map_or(true, |prev| !prev.is_alphanumeric())
    })
}

pub fn contains_any<S: AsRef<str>>(lower: &str, terms: &[S]) -> bool {
    terms.iter().any(|t| contains_term(lower, t.as_ref()))
}

/// Emotion groups, trigger groups and intensity qualifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lexicon {
    pub emotions: Vec<KeywordGroup>,
    pub triggers: Vec<KeywordGroup>,
    /// Words that raise intensity to high.
    pub amplifiers: Vec<String>,
    /// Words that soften intensity to medium.
    pub moderators: Vec<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::multilingual()
    }
}

impl Lexicon {
    /// English, Spanish and French keywords in a single lexicon.
    pub fn multilingual() -> Self {
        Self {
            emotions: vec![
                KeywordGroup::new(
                    "anxiety",
                    &[
                        "anxious", "anxiety", "worried", "worry", "worrying", "nervous", "uneasy",
                        "on edge", "ansiedad", "ansios", "preocupad", "nervios", "anxieux",
                        "anxieuse", "anxiété", "inquiet", "angoiss",
                    ],
                ),
                KeywordGroup::new(
                    "sadness",
                    &[
                        "sad", "unhappy", "feeling down", "feel down", "crying", "cried", "lonely",
                        "heartbroken", "grief", "grieving", "triste", "tristeza", "llorar",
                        "llorando", "tristesse", "pleure",
                    ],
                ),
                KeywordGroup::new(
                    "anger",
                    &[
                        "angry", "anger", "furious", "mad at", "rage", "irritated", "resentful",
                        "enojad", "enfadad", "furios", "rabia", "en colère", "furieux", "énervé",
                    ],
                ),
                KeywordGroup::new(
                    "stress",
                    &[
                        "stress", "overwhelmed", "pressure", "burned out", "burnt out",
                        "exhausted", "too much to handle", "estrés", "estresad", "agobiad",
                        "débordé", "épuisé",
                    ],
                ),
                KeywordGroup::new(
                    "panic",
                    &[
                        "panic", "can't breathe", "cannot breathe", "heart racing",
                        "heart is racing", "pánico", "panique",
                    ],
                ),
                KeywordGroup::new(
                    "depression",
                    &[
                        "depressed", "depression", "hopeless", "empty inside", "worthless",
                        "no point", "deprimid", "depresión", "sin esperanza", "déprimé",
                        "dépression", "désespéré",
                    ],
                ),
            ],
            triggers: vec![
                KeywordGroup::new(
                    "work",
                    &[
                        "work", "job", "boss", "office", "deadline", "career", "coworker",
                        "colleague", "presentation", "meeting", "trabajo", "jefe", "travail",
                        "boulot", "patron",
                    ],
                ),
                KeywordGroup::new(
                    "family",
                    &[
                        "family", "mother", "father", "my mom", "my dad", "mum", "parents",
                        "sister", "brother", "my kids", "children", "familia", "madre", "padre",
                        "famille", "mère", "père",
                    ],
                ),
                KeywordGroup::new(
                    "relationship",
                    &[
                        "relationship", "partner", "boyfriend", "girlfriend", "husband", "wife",
                        "marriage", "divorce", "breakup", "break up", "pareja", "novio", "novia",
                        "esposo", "esposa", "divorcio", "copain", "copine", "rupture",
                    ],
                ),
                KeywordGroup::new(
                    "money",
                    &[
                        "money", "debt", "bills", "rent", "financial", "finances", "afford",
                        "salary", "dinero", "deuda", "alquiler", "argent", "dette", "loyer",
                    ],
                ),
                KeywordGroup::new(
                    "health",
                    &[
                        "health", "sick", "illness", "in pain", "chronic pain", "doctor",
                        "diagnosis", "hospital", "salud", "enferm", "dolor", "médico", "santé", "malade", "douleur",
                    ],
                ),
            ],
            amplifiers: owned_terms(&[
                "very", "extremely", "really", "so much", "totally", "completely", "can't take",
                "unbearable", "overwhelming", "constantly", "muy", "demasiado", "extremadamente",
                "très", "vraiment",
            ]),
            moderators: owned_terms(&[
                "a bit", "a little", "somewhat", "kind of", "sort of", "slightly", "un poco",
                "un peu", "légèrement",
            ]),
        }
    }

    /// Append another lexicon's groups and qualifiers. Groups with the same
    /// label are merged so labels stay unique.
    pub fn merged(mut self, other: Lexicon) -> Self {
        merge_groups(&mut self.emotions, other.emotions);
        merge_groups(&mut self.triggers, other.triggers);
        self.amplifiers.extend(other.amplifiers);
        self.moderators.extend(other.moderators);
        self
    }
}

fn merge_groups(into: &mut Vec<KeywordGroup>, from: Vec<KeywordGroup>) {
    for group in from {
        match into.iter_mut().find(|g| g.label == group.label) {
            Some(existing) => existing.keywords.extend(group.keywords),
            None => into.push(group),
        }
    }
}

pub(crate) fn owned_terms(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
