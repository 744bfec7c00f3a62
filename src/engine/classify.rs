use std::sync::Arc;

use super::lexicon::{contains_any, Lexicon};
use super::types::{EmotionalContext, Intensity};

/// Keyword classifier mapping free text to emotions, triggers and intensity.
///
/// Pure and total: any string yields a context, no model call involved.
#[derive(Debug, Clone)]
pub struct EmotionClassifier {
    lexicon: Arc<Lexicon>,
}

impl Default for EmotionClassifier {
    fn default() -> Self {
        Self::new(Arc::new(Lexicon::default()))
    }
}

impl EmotionClassifier {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Classify a message. Every matching group contributes its label;
    /// intensity is decided by the last qualifier check that fires.
    pub fn classify(&self, text: &str) -> EmotionalContext {
        let lower = text.to_lowercase();

        let emotions = self
            .lexicon
            .emotions
            .iter()
            .filter(|group| group.matches(&lower))
            .map(|group| group.label.clone())
            .collect();

        let triggers = self
            .lexicon
            .triggers
            .iter()
            .filter(|group| group.matches(&lower))
            .map(|group| group.label.clone())
            .collect();

        let mut intensity = Intensity::Low;
        if contains_any(&lower, &self.lexicon.moderators) {
            intensity = Intensity::Medium;
        }
        if contains_any(&lower, &self.lexicon.amplifiers) {
            intensity = Intensity::High;
        }

        EmotionalContext {
            emotions,
            triggers,
            intensity,
        }
    }
}
