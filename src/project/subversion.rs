//! Subversion project detection.
//!
//! Needs a `.svn/wc.db` in the directory tree and shells out to `svn info`
//! for the repository root and URL.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use super::{find_file_or_directory, DetectionResult};

pub struct Subversion {
    filepath: PathBuf,
}

impl Subversion {
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    pub fn detect(&self) -> Result<Option<DetectionResult>, String> {
        let Some(binary) = find_svn_binary() else {
            debug!("svn binary not found");
            return Ok(None);
        };

        let Some(wc_db) = find_file_or_directory(&self.filepath, ".svn/wc.db") else {
            return Ok(None);
        };

        // .svn/wc.db -> working copy root
        let working_copy = wc_db
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_default();

        let Some(info) = svn_info(&binary, &working_copy)? else {
            return Ok(None);
        };

        let repository_root = info
            .get("Repository Root")
            .map(|v| v.replace('\r', ""))
            .unwrap_or_default();

        Ok(Some(DetectionResult {
            project: last_segment(info.get("Repository Root")),
            branch: last_segment(info.get("URL")),
            folder: repository_root,
        }))
    }
}

fn last_segment(value: Option<&String>) -> String {
    value
        .map(|v| v.trim_end_matches('/'))
        .and_then(|v| v.rsplit('/').next())
        .unwrap_or_default()
        .replace('\r', "")
}

fn svn_info(
    binary: &str,
    working_copy: &std::path::Path,
) -> Result<Option<HashMap<String, String>>, String> {
    let output = Command::new(binary)
        .arg("info")
        .arg(working_copy)
        .output()
        .map_err(|err| format!("error getting svn info: {err}"))?;

    if !output.status.success() {
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut result = HashMap::new();

    for line in stdout.lines() {
        if let Some((key, value)) = line.split_once(": ") {
            result.insert(key.to_string(), value.to_string());
        }
    }

    Ok(Some(result))
}

fn find_svn_binary() -> Option<String> {
    let path = std::env::var_os("PATH")?;

    for dir in std::env::split_paths(&path) {
        let candidate = dir.join("svn");
        if candidate.is_file() {
            return Some(candidate.to_string_lossy().into_owned());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_wc_db_detects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let entity = dir.path().join("main.c");
        std::fs::write(&entity, "").unwrap();

        // detects nothing whether or not svn is installed
        assert!(Subversion::new(&entity).detect().unwrap().is_none());
    }

    #[test]
    fn last_segment_strips_path() {
        let root = "https://svn.example.org/repos/myproject".to_string();
        assert_eq!(last_segment(Some(&root)), "myproject");

        let url = "https://svn.example.org/repos/myproject/branches/dev".to_string();
        assert_eq!(last_segment(Some(&url)), "dev");

        assert_eq!(last_segment(None), "");
    }
}
