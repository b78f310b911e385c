//! Engine lifecycle: background recalibration, shutdown checkpoint, restore.

use std::time::Duration;

use serde_json::json;
use taskmesh_anticipate::AnticipationEngine;
use taskmesh_core::AnticipationConfig;

fn task(name: &str) -> serde_json::Value {
    json!({"name": name, "type": "voice", "payload": {"text": "hello"}})
}

#[tokio::test]
async fn test_shutdown_writes_checkpoint_and_restore_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("anticipation_patterns.json");

    let engine = AnticipationEngine::new(AnticipationConfig::default(), &path);
    engine.start();
    assert!(engine.is_running());

    let t = task("Read this query aloud");
    assert_eq!(engine.predict(&t), vec!["voice_models"]);
    let report = engine
        .learn_from_outcome(&t, &["voice_models".into(), "image_models".into()])
        .unwrap();
    assert_eq!(report.new_pattern.as_deref(), Some("learned_5"));

    engine.shutdown().await.unwrap();
    assert!(!engine.is_running());
    assert!(path.exists());

    let restored = AnticipationEngine::restore(AnticipationConfig::default(), &path);
    assert_eq!(restored.patterns().len(), 6);
    let learned = restored.pattern("learned_5").unwrap();
    assert_eq!(learned.predicts, vec!["image_models"]);
    assert_eq!(learned.confidence, 0.50);

    let history = restored.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].task, "Read this query aloud");

    let mut before = engine.predict(&t);
    let mut after = restored.predict(&t);
    before.sort();
    after.sort();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_checkpoint_history_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cp.json");
    let engine = AnticipationEngine::new(AnticipationConfig::default(), &path);
    for i in 0..120 {
        engine.predict(&task(&format!("task {}", i)));
    }
    assert_eq!(engine.history().len(), 100);

    engine.shutdown().await.unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let history = raw["history"].as_array().unwrap();
    assert_eq!(history.len(), 50);
    assert_eq!(history[49]["task"], "task 119");
}

#[test]
fn test_restore_falls_back_to_seeds() {
    let dir = tempfile::tempdir().unwrap();

    let missing = AnticipationEngine::restore(AnticipationConfig::default(), dir.path().join("none.json"));
    assert_eq!(missing.patterns().len(), 5);

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "{not json").unwrap();
    let engine = AnticipationEngine::restore(AnticipationConfig::default(), &garbage);
    assert_eq!(engine.patterns().len(), 5);
    assert!(engine.history().is_empty());
}

#[tokio::test]
async fn test_background_loop_recalibrates() {
    let dir = tempfile::tempdir().unwrap();
    let config = AnticipationConfig {
        analyze_interval_secs: 1,
        ..AnticipationConfig::default()
    };
    let engine = AnticipationEngine::new(config, dir.path().join("cp.json"));

    for _ in 0..12 {
        let t = json!({"name": "fix error", "type": "code", "payload": {}});
        engine.predict(&t);
        engine.learn_from_outcome(&t, &[]);
    }
    engine.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let conf = engine.pattern("code_after_error").unwrap().confidence;
    assert!(conf < 0.90);
    engine.shutdown().await.unwrap();
}
