//! End-to-end pipeline scenarios with a recording sender.

use std::sync::{Arc, Mutex};

use codetick::commands::build_pipeline;
use codetick::config::Settings;
use codetick::error::Error;
use codetick::heartbeat::{Category, EntityType, Heartbeat, HeartbeatResult};
use codetick::matcher::Matcher;
use codetick::pipeline::Sender;

/// Captures whatever reaches the terminal sender.
#[derive(Clone)]
struct RecordingSender {
    sent: Arc<Mutex<Vec<Heartbeat>>>,
    calls: Arc<Mutex<usize>>,
}

impl RecordingSender {
    fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    fn sent(&self) -> Vec<Heartbeat> {
        self.sent.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Sender for RecordingSender {
    fn send_heartbeats(&mut self, hh: Vec<Heartbeat>) -> Result<Vec<HeartbeatResult>, Error> {
        *self.calls.lock().unwrap() += 1;
        self.sent.lock().unwrap().extend(hh.iter().cloned());
        Ok(hh
            .into_iter()
            .map(|heartbeat| HeartbeatResult {
                errors: Vec::new(),
                status: 201,
                heartbeat,
            })
            .collect())
    }
}

fn file_heartbeat(entity: &str) -> Heartbeat {
    Heartbeat {
        category: Category::Debugging,
        entity: entity.to_string(),
        entity_type: EntityType::File,
        language: Some("Go".to_string()),
        time: 1585598059.1,
        user_agent: "wakatime/test".to_string(),
        ..Default::default()
    }
}

/// Happy path: an existing file is enriched and reaches the sender with
/// project metadata and a line count.
#[test]
fn happy_path_enriches_and_sends() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("demoproject");
    std::fs::create_dir_all(repo.join(".git")).unwrap();
    std::fs::write(repo.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
    std::fs::write(repo.join(".git/config"), "[core]\n").unwrap();

    let entity = repo.join("main.go");
    std::fs::write(&entity, "package main\n\nimport \"os\"\n\nfunc main() {}\n").unwrap();

    let sender = RecordingSender::new();
    let mut pipeline = build_pipeline(&Settings::default(), Box::new(sender.clone()));

    let mut input = file_heartbeat(entity.to_str().unwrap());
    input.language = None;

    let results = pipeline.run(vec![input]).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, 201);

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].project.as_deref(), Some("demoproject"));
    assert_eq!(sent[0].branch.as_deref(), Some("main"));
    assert_eq!(sent[0].language.as_deref(), Some("Go"));
    assert_eq!(sent[0].lines, Some(5));
    assert_eq!(sent[0].dependencies.as_deref(), Some(&["os".to_string()][..]));
    assert!(sent[0].project_root_count.is_some());
}

/// A missing file never reaches the sender and produces an empty result.
#[test]
fn missing_entity_short_circuits_without_sending() {
    let sender = RecordingSender::new();
    let mut pipeline = build_pipeline(&Settings::default(), Box::new(sender.clone()));

    let results = pipeline
        .run(vec![file_heartbeat("/nonexistent/main.go")])
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(sender.calls(), 0, "sender must not be called");
}

/// Unsaved entities survive the existence filter.
#[test]
fn unsaved_entity_is_kept() {
    let sender = RecordingSender::new();
    let mut pipeline = build_pipeline(&Settings::default(), Box::new(sender.clone()));

    let mut h = file_heartbeat("/nonexistent/unsaved.go");
    h.is_unsaved_entity = true;

    let results = pipeline.run(vec![h]).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(sender.sent().len(), 1);
}

/// Sanitize closure: with hide_file_names, no sent heartbeat contains the
/// original file basename.
#[test]
fn hide_file_names_removes_basename_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let entity = dir.path().join("topsecret.go");
    std::fs::write(&entity, "package main\n").unwrap();

    let settings = Settings {
        hide_file_names: vec![Matcher::compile("true").unwrap()],
        ..Default::default()
    };

    let sender = RecordingSender::new();
    let mut pipeline = build_pipeline(&settings, Box::new(sender.clone()));

    let mut h = file_heartbeat(entity.to_str().unwrap());
    h.cursor_position = Some(10);
    h.line_number = Some(3);

    pipeline.run(vec![h]).unwrap();

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].entity, "HIDDEN.go");
    assert!(!sent[0].entity.contains("topsecret"));
    assert!(sent[0].cursor_position.is_none());
    assert!(sent[0].line_number.is_none());
    assert!(sent[0].lines.is_none());

    let serialized = serde_json::to_string(&sent[0]).unwrap();
    assert!(!serialized.contains("topsecret"));
}

/// Project-path prefix: without hide_project_folder the sent entity starts
/// with the detected project path.
#[test]
fn entity_keeps_project_path_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("prefixed");
    std::fs::create_dir_all(repo.join(".git")).unwrap();
    std::fs::write(repo.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
    std::fs::write(repo.join(".git/config"), "[core]\n").unwrap();
    let entity = repo.join("src.go");
    std::fs::write(&entity, "package main\n").unwrap();

    let sender = RecordingSender::new();
    let mut pipeline = build_pipeline(&Settings::default(), Box::new(sender.clone()));
    pipeline.run(vec![file_heartbeat(entity.to_str().unwrap())]).unwrap();

    let sent = sender.sent();
    assert!(!sent[0].project_path.is_empty());
    assert!(sent[0].entity.starts_with(&sent[0].project_path));
}

/// With hide_project_folder the sent entity is relative.
#[test]
fn hide_project_folder_sends_relative_entity() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("relative");
    std::fs::create_dir_all(repo.join(".git")).unwrap();
    std::fs::write(repo.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
    std::fs::write(repo.join(".git/config"), "[core]\n").unwrap();
    let entity = repo.join("inner.go");
    std::fs::write(&entity, "package main\n").unwrap();

    let settings = Settings {
        hide_project_folder: true,
        ..Default::default()
    };

    let sender = RecordingSender::new();
    let mut pipeline = build_pipeline(&settings, Box::new(sender.clone()));
    pipeline.run(vec![file_heartbeat(entity.to_str().unwrap())]).unwrap();

    let sent = sender.sent();
    assert_eq!(sent[0].entity, "inner.go");
    assert!(sent[0].project_root_count.is_none());
}

/// Exclude patterns drop matching heartbeats; include overrides exclude.
#[test]
fn exclude_and_include_patterns() {
    let dir = tempfile::tempdir().unwrap();
    let kept = dir.path().join("app.go");
    let dropped = dir.path().join("scratch.tmp");
    std::fs::write(&kept, "package main\n").unwrap();
    std::fs::write(&dropped, "scratch\n").unwrap();

    let settings = Settings {
        exclude: vec![Matcher::compile(r"\.tmp$").unwrap(), Matcher::compile(r"\.go$").unwrap()],
        include: vec![Matcher::compile(r"\.go$").unwrap()],
        ..Default::default()
    };

    let sender = RecordingSender::new();
    let mut pipeline = build_pipeline(&settings, Box::new(sender.clone()));

    pipeline
        .run(vec![
            file_heartbeat(kept.to_str().unwrap()),
            file_heartbeat(dropped.to_str().unwrap()),
        ])
        .unwrap();

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].entity.ends_with("app.go"));
}

/// Unknown-project filtering drops heartbeats without a detected project.
#[test]
fn exclude_unknown_project_drops_unmatched() {
    let dir = tempfile::tempdir().unwrap();
    let entity = dir.path().join("loose.go");
    std::fs::write(&entity, "package main\n").unwrap();

    let settings = Settings {
        exclude_unknown_project: true,
        ..Default::default()
    };

    let sender = RecordingSender::new();
    let mut pipeline = build_pipeline(&settings, Box::new(sender.clone()));
    let results = pipeline
        .run(vec![file_heartbeat(entity.to_str().unwrap())])
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(sender.calls(), 0);
}

/// Per-entity api keys replace the default on matching paths.
#[test]
fn api_key_map_applies_per_entity() {
    let dir = tempfile::tempdir().unwrap();
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let entity = work.join("task.go");
    std::fs::write(&entity, "package main\n").unwrap();

    let settings = Settings {
        api_key: "default-key".to_string(),
        api_key_map: vec![codetick::apikey::ApiKeyPattern {
            api_key: "work-key".to_string(),
            pattern: Matcher::compile("/work/").unwrap(),
        }],
        ..Default::default()
    };

    let sender = RecordingSender::new();
    let mut pipeline = build_pipeline(&settings, Box::new(sender.clone()));
    pipeline.run(vec![file_heartbeat(entity.to_str().unwrap())]).unwrap();

    assert_eq!(sender.sent()[0].api_key, "work-key");
}
