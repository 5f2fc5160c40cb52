//! Entity path formatting stage.
//!
//! Absolutizes and symlink-resolves file entity paths and the project path
//! override so later stages compare normalized paths.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::heartbeat::{EntityType, Heartbeat};
use crate::pipeline::Stage;

pub struct Formatting;

impl Stage for Formatting {
    fn name(&self) -> &'static str {
        "heartbeat filepath formatting"
    }

    fn process(&mut self, mut heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat> {
        for h in &mut heartbeats {
            if h.entity_type != EntityType::File {
                continue;
            }

            if h.is_remote() {
                continue;
            }

            h.entity = format_file_path(&h.entity);

            if !h.project_path_override.is_empty() {
                h.project_path_override = format_file_path(&h.project_path_override);
            }
        }

        heartbeats
    }
}

/// Absolutize a path and resolve symlinks where possible.
///
/// Nonexistent paths keep their absolutized form; a canonicalize failure is
/// not an error, since unsaved entities legitimately point nowhere.
pub fn format_file_path(path: &str) -> String {
    let absolute = absolutize(Path::new(path));

    match std::fs::canonicalize(&absolute) {
        Ok(real) => normalize_separators(&real),
        Err(err) => {
            debug!("failed to resolve real path for {path:?}: {err}");
            normalize_separators(&absolute)
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(windows)]
fn normalize_separators(path: &Path) -> String {
    // Strip the verbatim prefix canonicalize adds and use forward slashes,
    // matching what the server expects for windows paths.
    let s = path.to_string_lossy().replace('\\', "/");
    s.strip_prefix("//?/").unwrap_or(&s).to_string()
}

#[cfg(not(windows))]
fn normalize_separators(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::Category;

    #[test]
    fn formats_existing_file_to_real_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.go");
        std::fs::write(&file, "package main\n").unwrap();

        let formatted = format_file_path(file.to_str().unwrap());
        assert!(Path::new(&formatted).is_absolute());
        assert!(formatted.ends_with("main.go"));
    }

    #[test]
    fn keeps_nonexistent_path_absolutized() {
        let formatted = format_file_path("/nonexistent/deep/file.rs");
        assert_eq!(formatted, "/nonexistent/deep/file.rs");
    }

    #[test]
    fn skips_remote_and_non_file_entities() {
        let remote = Heartbeat {
            category: Category::Coding,
            entity: "ssh://user@host/file.go".to_string(),
            entity_type: EntityType::File,
            time: 1.0,
            ..Default::default()
        };
        let app = Heartbeat {
            entity: "terminal".to_string(),
            entity_type: EntityType::App,
            ..remote.clone()
        };

        let mut stage = Formatting;
        let out = stage.process(vec![remote.clone(), app.clone()]);
        assert_eq!(out[0].entity, remote.entity);
        assert_eq!(out[1].entity, app.entity);
    }
}
