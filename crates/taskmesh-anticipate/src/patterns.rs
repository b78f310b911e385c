//! Prediction patterns and the abstract → concrete resource map.

use serde::{Deserialize, Serialize};

/// Keyword-triggered prediction rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    /// Lower-case keywords, matched as substrings of the task description.
    pub triggers: Vec<String>,
    /// Resources (abstract or concrete ids) this pattern predicts.
    pub predicts: Vec<String>,
    /// Always within [0, 1].
    pub confidence: f64,
}

impl Pattern {
    pub fn new(id: &str, triggers: &[&str], predicts: &[&str], confidence: f64) -> Self {
        Self {
            id: id.to_string(),
            triggers: triggers.iter().map(|t| t.to_lowercase()).collect(),
            predicts: predicts.iter().map(|p| p.to_string()).collect(),
            confidence: clamp_confidence(confidence),
        }
    }

    /// Whether any trigger occurs in the lower-cased description text.
    pub fn matches(&self, text: &str) -> bool {
        self.triggers
            .iter()
            .any(|t| !t.is_empty() && text.contains(t.as_str()))
    }

    /// Fold an observed correct-rate into the confidence (0.7 old, 0.3 new).
    pub fn blend(&mut self, rate: f64) -> f64 {
        let old = self.confidence;
        let updated = 0.7 * old + 0.3 * rate;
        if updated.is_finite() {
            self.confidence = clamp_confidence(updated);
        }
        old
    }
}

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Built-in patterns an engine starts with when there is no checkpoint.
pub fn seed_patterns() -> Vec<Pattern> {
    vec![
        Pattern::new(
            "voice_after_text",
            &["text_input", "query"],
            &["voice_response"],
            0.85,
        ),
        Pattern::new(
            "image_after_description",
            &["describe", "generate", "create"],
            &["image_generation"],
            0.80,
        ),
        Pattern::new(
            "code_after_error",
            &["error", "bug", "fix"],
            &["code_analysis"],
            0.90,
        ),
        Pattern::new(
            "search_after_question",
            &["what", "how", "why", "when"],
            &["web_search"],
            0.70,
        ),
        Pattern::new(
            "multiple_services",
            &["complex", "multi", "all"],
            &["voice_response", "image_generation", "code_analysis"],
            0.65,
        ),
    ]
}

/// Concrete resource id for an abstract prediction. Unknown ids pass
/// through unchanged.
pub fn map_resource(prediction: &str) -> &str {
    match prediction {
        "voice_response" => "voice_models",
        "image_generation" => "image_models",
        "code_analysis" => "code_models",
        "web_search" => "search_cache",
        other => other,
    }
}
