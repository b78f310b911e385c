//! JSON checkpoint of learned state.
//!
//! Format: `{"patterns": {id: {trigger, predict, confidence}}, "history": [...]}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use taskmesh_core::Result;

use crate::history::HistoryEntry;
use crate::patterns::{clamp_confidence, Pattern};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub trigger: Vec<String>,
    pub predict: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub patterns: BTreeMap<String, PatternRecord>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Checkpoint {
    pub fn from_state<'a>(
        patterns: &[Pattern],
        history: impl Iterator<Item = &'a HistoryEntry>,
    ) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| {
                    (
                        p.id.clone(),
                        PatternRecord {
                            trigger: p.triggers.clone(),
                            predict: p.predicts.clone(),
                            confidence: p.confidence,
                        },
                    )
                })
                .collect(),
            history: history.cloned().collect(),
        }
    }

    /// Patterns in id order, confidences clamped.
    pub fn to_patterns(&self) -> Vec<Pattern> {
        self.patterns
            .iter()
            .map(|(id, rec)| Pattern {
                id: id.clone(),
                triggers: rec.trigger.iter().map(|t| t.to_lowercase()).collect(),
                predicts: rec.predict.clone(),
                confidence: clamp_confidence(rec.confidence),
            })
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write via a temp file and rename so a crash never leaves a torn file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
