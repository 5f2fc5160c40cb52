//! `.wakatime-project` file detection.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::{find_file_or_directory, DetectionResult, WAKATIME_PROJECT_FILE};

/// Detects the project from a `.wakatime-project` file in the entity's
/// directory tree. Line 1 sets the project name, line 2 the branch.
pub struct File {
    filepath: PathBuf,
}

impl File {
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    pub fn detect(&self) -> Result<Option<DetectionResult>, String> {
        let Some(found) = find_file_or_directory(&self.filepath, WAKATIME_PROJECT_FILE) else {
            return Ok(None);
        };

        tracing::debug!("wakatime project file found at: {}", found.display());

        let lines = read_lines(&found, 2).map_err(|err| format!("error reading file: {err}"))?;

        let folder = found
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut result = DetectionResult {
            // folder name is the default project when the file is empty
            project: Path::new(&folder)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            branch: String::new(),
            folder,
        };

        if let Some(first) = lines.first() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                result.project = trimmed.to_string();
            }
        }

        if let Some(second) = lines.get(1) {
            result.branch = second.trim().to_string();
        }

        Ok(Some(result))
    }
}

/// Read up to `max` lines of a file.
pub fn read_lines(path: &Path, max: usize) -> std::io::Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut lines = Vec::new();

    for line in reader.lines() {
        if lines.len() >= max {
            break;
        }
        lines.push(line?);
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_project_and_branch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(WAKATIME_PROJECT_FILE),
            "my project\nfeature/x\nignored\n",
        )
        .unwrap();
        let entity = dir.path().join("src/main.rs");
        std::fs::create_dir_all(entity.parent().unwrap()).unwrap();
        std::fs::write(&entity, "").unwrap();

        let result = File::new(&entity).detect().unwrap().unwrap();
        assert_eq!(result.project, "my project");
        assert_eq!(result.branch, "feature/x");
        assert_eq!(result.folder, dir.path().to_string_lossy());
    }

    #[test]
    fn empty_file_defaults_to_folder_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(WAKATIME_PROJECT_FILE), "").unwrap();

        let result = File::new(dir.path()).detect().unwrap().unwrap();
        assert_eq!(
            result.project,
            dir.path().file_name().unwrap().to_string_lossy()
        );
    }

    #[test]
    fn absent_file_detects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(File::new(dir.path()).detect().unwrap().is_none());
    }

    #[test]
    fn read_lines_caps_at_max() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("many.txt");
        std::fs::write(&path, "a\nb\nc\nd\n").unwrap();

        let lines = read_lines(&path, 2).unwrap();
        assert_eq!(lines, vec!["a", "b"]);
    }
}
