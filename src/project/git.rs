//! Git project and branch detection.
//!
//! Handles plain repositories, submodules (resolved `gitdir` under
//! `modules/`), worktrees (a `commondir` file whose parent directory is
//! `worktrees/`), and `.git` files pointing at a relocated git directory.

use std::path::{Path, PathBuf};

use tracing::{debug, error};

use super::{
    find_file_or_directory, match_pattern, read_lines, DetectionResult, MapPattern,
};
use crate::matcher::Matcher;

pub struct Git {
    /// The entity path.
    pub filepath: PathBuf,
    /// Use the git remote as the project name instead of the local folder.
    pub project_from_git_remote: bool,
    /// Matched against the submodule path; a match skips submodule detection.
    pub submodule_disabled_patterns: Vec<Matcher>,
    /// Overridden project name per submodule path.
    pub submodule_map_patterns: Vec<MapPattern>,
}

impl Git {
    pub fn detect(&self) -> Result<Option<DetectionResult>, String> {
        let fp = if self.filepath.exists() {
            self.filepath
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.filepath.clone())
        } else {
            self.filepath.clone()
        };

        // submodule takes priority when enabled
        if let Some(gitdir_submodule) = self.find_submodule(&fp)? {
            let mut project = self.project_or_remote(
                base_name(&gitdir_submodule),
                &gitdir_submodule,
            );

            if let Some(mapped) = match_pattern(
                &gitdir_submodule.to_string_lossy(),
                &self.submodule_map_patterns,
            ) {
                project = mapped;
            }

            let branch = find_git_branch(&gitdir_submodule.join("HEAD")).unwrap_or_else(|err| {
                error!(
                    "error finding branch from {:?}: {err}",
                    gitdir_submodule.join("HEAD")
                );
                String::new()
            });

            return Ok(Some(DetectionResult {
                project,
                branch,
                folder: parent_string(&gitdir_submodule),
            }));
        }

        // plain .git file or directory
        let Some(dot_git) = find_file_or_directory(&fp, ".git") else {
            return Ok(None);
        };

        let gitdir = find_gitdir(&dot_git)?;

        // a commondir file alongside gitdir marks a worktree
        if let Some(gitdir) = &gitdir {
            if let Some(commondir) = find_commondir(gitdir)? {
                // commondir usually points at the .git folder, except for
                // bare-repo worktrees where it is the repo itself
                let dir = if commondir.to_string_lossy().contains(".git") {
                    parent_string(&commondir)
                } else {
                    commondir.to_string_lossy().into_owned()
                };

                let project = self.project_or_remote(base_name(Path::new(&dir)), &commondir);

                let branch = find_git_branch(&gitdir.join("HEAD")).unwrap_or_else(|err| {
                    error!("error finding branch from {:?}: {err}", gitdir.join("HEAD"));
                    String::new()
                });

                return Ok(Some(DetectionResult {
                    project,
                    branch,
                    folder: dir,
                }));
            }
        }

        // .git file redirecting to a relocated (non-submodule) git dir
        if let Some(gitdir) = &gitdir {
            if !gitdir.to_string_lossy().contains("modules") {
                let project_dir = dot_git.parent().unwrap_or(Path::new(""));
                let project = self.project_or_remote(base_name(project_dir), gitdir);

                let branch = find_git_branch(&gitdir.join("HEAD")).unwrap_or_else(|err| {
                    error!("error finding branch from {:?}: {err}", gitdir.join("HEAD"));
                    String::new()
                });

                return Ok(Some(DetectionResult {
                    project,
                    branch,
                    folder: project_dir.to_string_lossy().into_owned(),
                }));
            }
        }

        // ordinary .git directory with a config file
        if let Some(git_config) = find_file_or_directory(&fp, ".git/config") {
            let git_dir = git_config.parent().unwrap_or(Path::new(""));
            let project_dir = git_dir.parent().unwrap_or(Path::new(""));

            let branch = find_git_branch(&git_dir.join("HEAD")).unwrap_or_else(|err| {
                error!("error finding branch from {:?}: {err}", git_dir.join("HEAD"));
                String::new()
            });

            let project = self.project_or_remote(base_name(project_dir), git_dir);

            return Ok(Some(DetectionResult {
                project,
                branch,
                folder: project_dir.to_string_lossy().into_owned(),
            }));
        }

        Ok(None)
    }

    fn find_submodule(&self, fp: &Path) -> Result<Option<PathBuf>, String> {
        if !self.should_take_submodule(fp) {
            return Ok(None);
        }

        let Some(dot_git) = find_file_or_directory(fp, ".git") else {
            return Ok(None);
        };

        let gitdir = find_gitdir(&dot_git)
            .map_err(|err| format!("error finding gitdir for submodule: {err}"))?;

        match gitdir {
            Some(gitdir) if gitdir.to_string_lossy().contains("modules") => Ok(Some(gitdir)),
            _ => Ok(None),
        }
    }

    /// Whether the path escapes all submodule-disabled patterns.
    fn should_take_submodule(&self, fp: &Path) -> bool {
        let path = fp.to_string_lossy();
        !self
            .submodule_disabled_patterns
            .iter()
            .any(|p| p.matches(&path))
    }

    fn project_or_remote(&self, project_name: String, dot_git_folder: &Path) -> String {
        if !self.project_from_git_remote {
            return project_name;
        }

        let config_file = dot_git_folder.join("config");

        match find_git_remote(&config_file) {
            Ok(remote) if !remote.is_empty() => remote,
            Ok(_) => project_name,
            Err(err) => {
                error!("error finding git remote from {config_file:?}: {err}");
                project_name
            }
        }
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent_string(path: &Path) -> String {
    path.parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Resolve the real git directory behind a `.git` file or directory.
///
/// A `.git` directory resolves to itself; a `.git` file must contain a
/// `gitdir: <path>` pointer, relative paths resolved against the file's
/// directory. Only directories with a `HEAD` are accepted.
fn find_gitdir(dot_git: &Path) -> Result<Option<PathBuf>, String> {
    if dot_git.is_dir() {
        return Ok(Some(dot_git.to_path_buf()));
    }

    let lines = read_lines(dot_git, 1)
        .map_err(|err| format!("failed while opening file {dot_git:?}: {err}"))?;

    if let Some(first) = lines.first() {
        if let Some(target) = first.strip_prefix("gitdir: ") {
            let base = dot_git.parent().unwrap_or(Path::new(""));
            return Ok(resolve_gitdir(base, target));
        }
    }

    Ok(None)
}

fn resolve_gitdir(base: &Path, gitdir: &str) -> Option<PathBuf> {
    let sub_path = gitdir.trim();
    let resolved = if Path::new(sub_path).is_absolute() {
        PathBuf::from(sub_path)
    } else {
        normalize(&base.join(sub_path))
    };

    if resolved.join("HEAD").exists() {
        Some(resolved)
    } else {
        None
    }
}

/// Lexically resolve `..` and `.` components.
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                result.pop();
            }
            std::path::Component::CurDir => {}
            other => result.push(other.as_os_str()),
        }
    }

    result
}

/// A worktree is marked by a `commondir` file whose parent directory is
/// `worktrees/`; it contains the relative path to the real repository.
fn find_commondir(gitdir: &Path) -> Result<Option<PathBuf>, String> {
    if gitdir.as_os_str().is_empty() {
        return Ok(None);
    }

    let in_worktrees = gitdir
        .parent()
        .and_then(Path::file_name)
        .map(|n| n == "worktrees")
        .unwrap_or(false);

    if !in_worktrees {
        return Ok(None);
    }

    if !gitdir.join("commondir").exists() {
        return Ok(None);
    }

    let lines = read_lines(&gitdir.join("commondir"), 1)
        .map_err(|err| format!("failed while opening file {gitdir:?}: {err}"))?;

    let Some(first) = lines.first() else {
        return Ok(None);
    };

    Ok(Some(normalize(&gitdir.join(first.trim()))))
}

/// Branch name from `HEAD`, or `master` when `HEAD` is absent.
fn find_git_branch(head: &Path) -> Result<String, String> {
    if !head.exists() {
        return Ok("master".to_string());
    }

    let lines =
        read_lines(head, 1).map_err(|err| format!("failed while opening file {head:?}: {err}"))?;

    if let Some(first) = lines.first() {
        let trimmed = first.trim();
        if trimmed.starts_with("ref: ") {
            // ref: refs/heads/branch-name, branch may itself contain slashes
            let mut parts = trimmed.splitn(3, '/');
            parts.next();
            parts.next();
            return match parts.next() {
                Some(branch) => Ok(branch.trim().to_string()),
                None => {
                    debug!("invalid branch from {head:?}: {trimmed}");
                    Ok(String::new())
                }
            };
        }
    }

    // detached head
    Ok(String::new())
}

/// Last path segment (minus `.git`) of the `[remote "origin"]` url in a git
/// config file.
fn find_git_remote(config: &Path) -> Result<String, String> {
    if !config.exists() {
        return Ok(String::new());
    }

    let lines = read_lines(config, 1000)
        .map_err(|err| format!("failed while opening file {config:?}: {err}"))?;

    let mut in_origin = false;

    for line in &lines {
        let trimmed = line.trim();

        if trimmed.starts_with('[') {
            in_origin = trimmed == "[remote \"origin\"]";
            continue;
        }

        if !in_origin {
            continue;
        }

        if let Some(value) = trimmed.strip_prefix("url = ") {
            let url = value.trim();
            let last_segment = url
                .rsplit(|c| c == '/' || c == ':')
                .next()
                .unwrap_or(url);

            return Ok(last_segment.trim_end_matches(".git").to_string());
        }
    }

    Ok(String::new())
}
