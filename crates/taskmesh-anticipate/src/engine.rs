//! Anticipation engine: prediction, outcome learning and the background
//! recalibration loop.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use taskmesh_core::clock::now_rfc3339;
use taskmesh_core::{AnticipationConfig, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::Checkpoint;
use crate::history::{HistoryEntry, HistoryRing};
use crate::patterns::{map_resource, seed_patterns, Pattern};

/// How a prediction compared with what the task actually used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub correct: Vec<String>,
    pub missed: Vec<String>,
    pub extra: Vec<String>,
    pub accuracy: f64,
    /// Id of the pattern synthesized from the misses, if any.
    pub new_pattern: Option<String>,
}

struct EngineState {
    /// Insertion order; only ever appended to.
    patterns: Vec<Pattern>,
    history: HistoryRing,
}

struct Analyzer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct AnticipationEngine {
    config: AnticipationConfig,
    state: Arc<Mutex<EngineState>>,
    checkpoint_path: PathBuf,
    analyzer: Mutex<Option<Analyzer>>,
}

impl AnticipationEngine {
    /// Engine seeded with the built-in patterns.
    pub fn new(config: AnticipationConfig, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self::with_state(config, checkpoint_path.into(), seed_patterns(), Vec::new())
    }

    /// Engine resumed from the checkpoint at `checkpoint_path`. A missing or
    /// unreadable checkpoint falls back to the built-in patterns.
    pub fn restore(config: AnticipationConfig, checkpoint_path: impl Into<PathBuf>) -> Self {
        let path = checkpoint_path.into();
        if !path.exists() {
            debug!("No anticipation checkpoint at {}", path.display());
            return Self::new(config, path);
        }
        match Checkpoint::load(&path) {
            Ok(cp) if !cp.patterns.is_empty() => {
                let patterns = cp.to_patterns();
                info!(
                    "Restored {} patterns and {} history entries from {}",
                    patterns.len(),
                    cp.history.len(),
                    path.display()
                );
                Self::with_state(config, path, patterns, cp.history)
            }
            Ok(_) => {
                warn!("Checkpoint {} has no patterns, using seeds", path.display());
                Self::new(config, path)
            }
            Err(e) => {
                warn!("Ignoring checkpoint {}: {}", path.display(), e);
                Self::new(config, path)
            }
        }
    }

    fn with_state(
        config: AnticipationConfig,
        checkpoint_path: PathBuf,
        patterns: Vec<Pattern>,
        history: Vec<HistoryEntry>,
    ) -> Self {
        let mut ring = HistoryRing::new(config.history_capacity);
        for entry in history {
            ring.push(entry);
        }
        Self {
            config,
            state: Arc::new(Mutex::new(EngineState {
                patterns,
                history: ring,
            })),
            checkpoint_path,
            analyzer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AnticipationConfig {
        &self.config
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    // ----- Prediction -----

    /// Resource ids the task described by `task` (`{name, type, payload}`)
    /// is likely to need. In-memory only; no match gives an empty list.
    pub fn predict(&self, task: &serde_json::Value) -> Vec<String> {
        let text = task.to_string().to_lowercase();
        let name = task_name(task).unwrap_or("unknown").to_string();

        let mut state = self.state.lock();
        let mut resources: Vec<String> = Vec::new();
        for pattern in &state.patterns {
            if pattern.confidence < self.config.threshold || !pattern.matches(&text) {
                continue;
            }
            debug!(
                "Predicted {:?} based on {} (confidence: {:.2})",
                pattern.predicts, pattern.id, pattern.confidence
            );
            for predicted in &pattern.predicts {
                let resource = map_resource(predicted);
                if !resources.iter().any(|r| r == resource) {
                    resources.push(resource.to_string());
                }
            }
        }

        state.history.push(HistoryEntry {
            timestamp: now_rfc3339(),
            task: name,
            predictions: resources.clone(),
            actual: None,
        });
        resources
    }

    // ----- Learning -----

    /// Score the newest prediction against the resources the task used.
    ///
    /// Returns `None` when the newest history entry belongs to a different
    /// task. Misses produce a new `learned_<n>` pattern keyed on the first
    /// three words of the task name.
    pub fn learn_from_outcome(
        &self,
        task: &serde_json::Value,
        actual: &[String],
    ) -> Option<OutcomeReport> {
        let raw_name = task_name(task);
        let name = raw_name.unwrap_or("unknown");

        let mut state = self.state.lock();
        let newest = state.history.newest_mut()?;
        if newest.task != name {
            debug!(
                "Newest prediction is for {:?}, not {:?}; outcome ignored",
                newest.task, name
            );
            return None;
        }

        let predicted: BTreeSet<String> = newest.predictions.iter().cloned().collect();
        let actual: BTreeSet<String> = actual.iter().cloned().collect();
        let correct: Vec<String> = predicted.intersection(&actual).cloned().collect();
        let missed: Vec<String> = actual.difference(&predicted).cloned().collect();
        let extra: Vec<String> = predicted.difference(&actual).cloned().collect();
        let union = predicted.union(&actual).count();
        let accuracy = correct.len() as f64 / union.max(1) as f64;

        newest.actual = Some(actual.iter().cloned().collect());

        info!(
            "Prediction accuracy for {}: {:.0}% (correct: {:?}, missed: {:?}, extra: {:?})",
            name,
            accuracy * 100.0,
            correct,
            missed,
            extra
        );

        let new_pattern = if missed.is_empty() {
            None
        } else {
            learn_pattern(
                &mut state.patterns,
                raw_name.unwrap_or(""),
                &missed,
                self.config.learned_confidence,
            )
        };

        Some(OutcomeReport {
            correct,
            missed,
            extra,
            accuracy,
            new_pattern,
        })
    }

    /// Run one recalibration pass now. Returns the number of confidence
    /// updates applied.
    pub fn recalibrate(&self) -> usize {
        recalibrate(&mut self.state.lock(), &self.config)
    }

    // ----- Inspection -----

    pub fn patterns(&self) -> Vec<Pattern> {
        self.state.lock().patterns.clone()
    }

    pub fn pattern(&self, id: &str) -> Option<Pattern> {
        self.state.lock().patterns.iter().find(|p| p.id == id).cloned()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().history.to_vec()
    }

    /// Snapshot of the patterns and the most recent history.
    pub fn checkpoint(&self) -> Checkpoint {
        let state = self.state.lock();
        Checkpoint::from_state(
            &state.patterns,
            state.history.recent(self.config.checkpoint_history),
        )
    }

    // ----- Lifecycle -----

    /// Spawn the recalibration loop. No-op if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut analyzer = self.analyzer.lock();
        if analyzer.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let state = self.state.clone();
        let config = self.config.clone();
        let period = Duration::from_secs(config.analyze_interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Pattern analyzer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let updated = recalibrate(&mut state.lock(), &config);
                        if updated > 0 {
                            debug!("Recalibration applied {} updates", updated);
                        }
                    }
                }
            }
        });

        *analyzer = Some(Analyzer { cancel, handle });
        info!(
            "Anticipation engine started (analyze every {}s)",
            period.as_secs()
        );
    }

    pub fn is_running(&self) -> bool {
        self.analyzer.lock().is_some()
    }

    /// Stop the loop and write the checkpoint.
    pub async fn shutdown(&self) -> Result<()> {
        let analyzer = self.analyzer.lock().take();
        if let Some(analyzer) = analyzer {
            analyzer.cancel.cancel();
            if let Err(e) = analyzer.handle.await {
                warn!("Pattern analyzer ended abnormally: {}", e);
            }
        }

        let checkpoint = self.checkpoint();
        checkpoint.save(&self.checkpoint_path)?;
        info!(
            "Anticipation engine shut down: {} patterns saved to {}",
            checkpoint.patterns.len(),
            self.checkpoint_path.display()
        );
        Ok(())
    }
}

fn task_name(task: &serde_json::Value) -> Option<&str> {
    task.get("name").and_then(|v| v.as_str())
}

/// Append a pattern predicting `missed`, triggered by the first three words
/// of `task_name`. Returns its id; `None` if the name has no words or an
/// identical pattern already exists.
fn learn_pattern(
    patterns: &mut Vec<Pattern>,
    task_name: &str,
    missed: &[String],
    confidence: f64,
) -> Option<String> {
    let triggers: Vec<String> = task_name
        .to_lowercase()
        .split_whitespace()
        .take(3)
        .map(str::to_string)
        .collect();
    if triggers.is_empty() {
        debug!("Task has no name to key a pattern on; misses not learned");
        return None;
    }
    if let Some(existing) = patterns
        .iter()
        .find(|p| p.triggers == triggers && p.predicts == missed)
    {
        debug!("Misses already covered by pattern {}", existing.id);
        return None;
    }

    let mut n = patterns.len();
    let mut id = format!("learned_{}", n);
    while patterns.iter().any(|p| p.id == id) {
        n += 1;
        id = format!("learned_{}", n);
    }

    let pattern = Pattern {
        id: id.clone(),
        triggers,
        predicts: missed.to_vec(),
        confidence,
    };
    info!(
        "Created new pattern {}: triggers {:?} -> {:?}",
        id, pattern.triggers, pattern.predicts
    );
    patterns.push(pattern);
    Some(id)
}

/// Blend each pattern's confidence toward the correct-rate of its
/// resources over the recent window.
///
/// Only entries with a recorded outcome count as samples.
fn recalibrate(state: &mut EngineState, config: &AnticipationConfig) -> usize {
    if state.history.len() < config.min_history {
        return 0;
    }

    // resource -> (correct, total)
    let mut stats: HashMap<&str, (usize, usize)> = HashMap::new();
    for entry in state.history.recent(config.window) {
        let Some(actual) = &entry.actual else {
            continue;
        };
        for predicted in &entry.predictions {
            let slot = stats.entry(predicted.as_str()).or_insert((0, 0));
            slot.1 += 1;
            if actual.contains(predicted) {
                slot.0 += 1;
            }
        }
    }

    let mut updates = 0;
    for pattern in state.patterns.iter_mut() {
        for predicted in pattern.predicts.clone() {
            let Some(&(correct, total)) = stats.get(map_resource(&predicted)) else {
                continue;
            };
            if total <= config.min_samples {
                continue;
            }
            let rate = correct as f64 / total as f64;
            let old = pattern.blend(rate);
            info!(
                "Updated confidence for {}: {:.2} -> {:.2}",
                pattern.id, old, pattern.confidence
            );
            updates += 1;
        }
    }
    updates
}
