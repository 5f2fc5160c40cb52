//! Mercurial project and branch detection.

use std::path::{Path, PathBuf};

use tracing::error;

use super::{find_file_or_directory, read_lines, DetectionResult};

pub struct Mercurial {
    filepath: PathBuf,
}

impl Mercurial {
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    pub fn detect(&self) -> Result<Option<DetectionResult>, String> {
        let Some(hg_directory) = find_file_or_directory(&self.filepath, ".hg") else {
            return Ok(None);
        };

        let repo_root = hg_directory.parent().unwrap_or(Path::new(""));

        let project = repo_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let branch = find_hg_branch(&hg_directory).unwrap_or_else(|err| {
            error!("error finding branch name from {hg_directory:?}: {err}");
            String::new()
        });

        Ok(Some(DetectionResult {
            project,
            branch,
            folder: repo_root.to_string_lossy().into_owned(),
        }))
    }
}

/// Branch from `.hg/branch`, defaulting to `default`.
fn find_hg_branch(hg_directory: &Path) -> Result<String, String> {
    let branch_file = hg_directory.join("branch");
    if !branch_file.exists() {
        return Ok("default".to_string());
    }

    let lines = read_lines(&branch_file, 1)
        .map_err(|err| format!("failed while opening file {branch_file:?}: {err}"))?;

    match lines.first() {
        Some(line) if !line.trim().is_empty() => Ok(line.trim().to_string()),
        _ => Ok("default".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_repository_and_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("hgproject");
        std::fs::create_dir_all(repo.join(".hg")).unwrap();
        std::fs::write(repo.join(".hg/branch"), "stable\n").unwrap();
        let entity = repo.join("main.py");
        std::fs::write(&entity, "").unwrap();

        let result = Mercurial::new(&entity).detect().unwrap().unwrap();
        assert_eq!(result.project, "hgproject");
        assert_eq!(result.branch, "stable");
        assert_eq!(result.folder, repo.to_string_lossy());
    }

    #[test]
    fn missing_branch_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("hgproject");
        std::fs::create_dir_all(repo.join(".hg")).unwrap();
        let entity = repo.join("main.py");
        std::fs::write(&entity, "").unwrap();

        let result = Mercurial::new(&entity).detect().unwrap().unwrap();
        assert_eq!(result.branch, "default");
    }

    #[test]
    fn no_repository_detects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Mercurial::new(dir.path()).detect().unwrap().is_none());
    }
}
