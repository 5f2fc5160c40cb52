//! Team Foundation Version Control project detection.

use std::path::PathBuf;

use super::{find_file_or_directory, DetectionResult};

pub struct Tfvc {
    filepath: PathBuf,
}

impl Tfvc {
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    pub fn detect(&self) -> Result<Option<DetectionResult>, String> {
        let tf_folder = if cfg!(windows) { "$tf" } else { ".tf" };

        let Some(properties) =
            find_file_or_directory(&self.filepath, &format!("{tf_folder}/properties.tf1"))
        else {
            return Ok(None);
        };

        // <root>/<tf folder>/properties.tf1
        let root = properties
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_default();

        let project = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Some(DetectionResult {
            project,
            branch: String::new(),
            folder: root.to_string_lossy().into_owned(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_tf_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("tfproject");
        std::fs::create_dir_all(repo.join(".tf")).unwrap();
        std::fs::write(repo.join(".tf/properties.tf1"), "").unwrap();
        let entity = repo.join("main.cs");
        std::fs::write(&entity, "").unwrap();

        let result = Tfvc::new(&entity).detect().unwrap().unwrap();
        assert_eq!(result.project, "tfproject");
        assert!(result.branch.is_empty());
        assert_eq!(result.folder, repo.to_string_lossy());
    }

    #[test]
    fn no_workspace_detects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Tfvc::new(dir.path()).detect().unwrap().is_none());
    }
}
