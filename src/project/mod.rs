//! Layered project and branch detection.
//!
//! Seven ordered stages; the first that yields a project wins, except that
//! the override and alternate stages only fill in what earlier stages left
//! empty:
//!
//! 1. `.wakatime-project` file (name on line 1, branch on line 2)
//! 2. `[projectmap]` patterns
//! 3. explicit `--project` override
//! 4. revision control (Git, Mercurial, Subversion, TFVC)
//! 5. `--alternate-project`
//! 6. `--alternate-branch`
//! 7. the entity's directory as a fallback folder

mod file;
mod git;
mod mercurial;
mod subversion;
mod tfvc;
mod words;

pub use file::{read_lines, File};
pub use git::Git;
pub use mercurial::Mercurial;
pub use subversion::Subversion;
pub use tfvc::Tfvc;

use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, warn};

use crate::heartbeat::{should_sanitize, EntityType, Heartbeat, SanitizeCheck};
use crate::matcher::Matcher;
use crate::pipeline::Stage;

/// Special file carrying the project name and optional branch that override
/// auto-detection.
pub const WAKATIME_PROJECT_FILE: &str = ".wakatime-project";

/// Upper bound for walking parent directories.
const MAX_RECURSIVE_ITERATION: usize = 500;

/// A project name mapped to a path pattern.
#[derive(Debug, Clone)]
pub struct MapPattern {
    pub name: String,
    pub pattern: Matcher,
}

/// Detection outcome: any field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
    pub project: String,
    pub branch: String,
    pub folder: String,
}

/// Which detector produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorId {
    Unknown,
    File,
    Map,
    Git,
    Mercurial,
    Subversion,
    Tfvc,
}

/// Project detection configuration.
#[derive(Default, Clone)]
pub struct ProjectConfig {
    /// Obfuscate the project name when its path matches.
    pub hide_project_names: Vec<Matcher>,
    /// Overridden project name per path.
    pub map_patterns: Vec<MapPattern>,
    /// Use the git remote as the project name instead of the local folder.
    pub project_from_git_remote: bool,
    /// Skip submodule detection for matching paths.
    pub submodules_disabled: Vec<Matcher>,
    /// Overridden project name per submodule path.
    pub submodule_map_patterns: Vec<MapPattern>,
}

pub struct ProjectDetection {
    config: ProjectConfig,
}

impl ProjectDetection {
    pub fn new(config: ProjectConfig) -> Self {
        Self { config }
    }
}

impl Stage for ProjectDetection {
    fn name(&self) -> &'static str {
        "project detection"
    }

    fn process(&mut self, mut heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat> {
        for h in &mut heartbeats {
            debug!("execute project detection for: {}", h.entity);

            let entity_arg = if h.entity_type == EntityType::File {
                Some(h.entity.as_str())
            } else {
                None
            };
            let override_arg = if h.project_path_override.is_empty() {
                None
            } else {
                Some(h.project_path_override.as_str())
            };

            // first, .wakatime-project or [projectmap] with the entity path,
            // then with the project folder override
            let (mut result, detector) =
                detect(&self.config.map_patterns, &[entity_arg, override_arg]);

            // second, the explicit override
            if result.project.is_empty() && !h.project_override.is_empty() {
                result.project = h.project_override.clone();
                result.folder = h.project_path_override.clone();
            }

            // third, revision control
            if result.project.is_empty() || result.branch.is_empty() || result.folder.is_empty() {
                let rev = detect_with_rev_control(
                    &self.config,
                    h.project_from_git_remote || self.config.project_from_git_remote,
                    &[entity_arg, override_arg],
                );

                if result.project.is_empty() {
                    result.project = rev.project;
                }
                if result.branch.is_empty() {
                    result.branch = rev.branch;
                }
                if result.folder.is_empty() {
                    result.folder = rev.folder;
                }
            }

            // fourth, the alternate project
            if result.project.is_empty() && !h.project_alternate.is_empty() {
                result.project = h.project_alternate.clone();
                if result.folder.is_empty() {
                    result.folder = h.project_path_override.clone();
                }
            }

            // fifth, the alternate branch
            if result.branch.is_empty() && !h.branch_alternate.is_empty() {
                result.branch = h.branch_alternate.clone();
            }

            // sixth, the project folder override
            if result.folder.is_empty() {
                result.folder = h.project_path_override.clone();
            }

            // seventh, the entity's directory
            if h.entity_type == EntityType::File && result.folder.is_empty() {
                result.folder = Path::new(&h.entity)
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }

            // finally, obfuscate the project name if necessary
            let hide = should_sanitize(
                &SanitizeCheck {
                    entity: &h.entity,
                    project_path: &result.folder,
                    project_path_override: &h.project_path_override,
                },
                &self.config.hide_project_names,
            );
            if hide && !result.project.is_empty() && detector != DetectorId::File {
                result.project = obfuscate_project_name(&result.folder);
            }

            result.folder = format_project_folder(&result.folder);

            // count of path separators from root to the project folder
            if !result.folder.is_empty() && h.entity.starts_with(&result.folder) {
                let subfolders = count_slashes_in_project_folder(&result.folder);
                if subfolders > 0 {
                    h.project_root_count = Some(subfolders);
                }
            }

            h.project = Some(result.project);
            h.branch = Some(result.branch);
            h.project_path = result.folder;
        }

        heartbeats
    }
}

/// Run the config-driven detectors (project file, map) over the candidate
/// paths in order.
pub fn detect(
    patterns: &[MapPattern],
    candidates: &[Option<&str>],
) -> (DetectionResult, DetectorId) {
    for candidate in candidates.iter().flatten().copied() {
        if candidate.is_empty() {
            continue;
        }

        let file_detector = File::new(candidate);
        match file_detector.detect() {
            Ok(Some(result)) => return (result, DetectorId::File),
            Ok(None) => {}
            Err(err) => warn!("unexpected error in project-file detection: {err}"),
        }

        if let Some(result) = detect_map(candidate, patterns) {
            return (result, DetectorId::Map);
        }
    }

    (DetectionResult::default(), DetectorId::Unknown)
}

/// Scan `[projectmap]` patterns; the first matching pattern names the project.
fn detect_map(path: &str, patterns: &[MapPattern]) -> Option<DetectionResult> {
    let name = match_pattern(path, patterns)?;

    Some(DetectionResult {
        project: name,
        ..Default::default()
    })
}

/// First map pattern matching `path`, if any.
pub fn match_pattern(path: &str, patterns: &[MapPattern]) -> Option<String> {
    patterns
        .iter()
        .find(|p| p.pattern.matches(path))
        .map(|p| p.name.clone())
}

/// Run the revision-control detectors over the candidate paths in order.
pub fn detect_with_rev_control(
    config: &ProjectConfig,
    project_from_git_remote: bool,
    candidates: &[Option<&str>],
) -> DetectionResult {
    for candidate in candidates.iter().flatten().copied() {
        if candidate.is_empty() {
            continue;
        }

        let git = Git {
            filepath: PathBuf::from(candidate),
            project_from_git_remote,
            submodule_disabled_patterns: config.submodules_disabled.clone(),
            submodule_map_patterns: config.submodule_map_patterns.clone(),
        };

        match git.detect() {
            Ok(Some(result)) => return result,
            Ok(None) => {}
            Err(err) => warn!("unexpected error in git detection: {err}"),
        }

        let mercurial = Mercurial::new(candidate);
        match mercurial.detect() {
            Ok(Some(result)) => return result,
            Ok(None) => {}
            Err(err) => warn!("unexpected error in mercurial detection: {err}"),
        }

        let subversion = Subversion::new(candidate);
        match subversion.detect() {
            Ok(Some(result)) => return result,
            Ok(None) => {}
            Err(err) => warn!("unexpected error in svn detection: {err}"),
        }

        let tfvc = Tfvc::new(candidate);
        match tfvc.detect() {
            Ok(Some(result)) => return result,
            Ok(None) => {}
            Err(err) => warn!("unexpected error in tfvc detection: {err}"),
        }
    }

    DetectionResult::default()
}

/// Drops heartbeats with an unknown project when configured to.
pub struct ProjectFiltering {
    pub exclude_unknown_project: bool,
}

impl Stage for ProjectFiltering {
    fn name(&self) -> &'static str {
        "project filtering"
    }

    fn process(&mut self, heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat> {
        if !self.exclude_unknown_project {
            return heartbeats;
        }

        heartbeats
            .into_iter()
            .filter(|h| match h.project.as_deref() {
                Some("") | None => {
                    debug!("skipping heartbeat with unknown project: {}", h.entity);
                    false
                }
                Some(_) => true,
            })
            .collect()
    }
}

/// Replace the project name with a generated one and persist it to a new
/// `.wakatime-project` file so future invocations agree on the name.
///
/// Never overwrites an existing project file.
fn obfuscate_project_name(folder: &str) -> String {
    if Path::new(folder).join(WAKATIME_PROJECT_FILE).exists() {
        return String::new();
    }

    let project = generate_project_name();

    if let Err(err) = write_project_file(Path::new(folder), &project) {
        warn!("failed to write: {err}");
    }

    project
}

/// Save the wakatime project file in `folder`.
pub fn write_project_file(folder: &Path, project: &str) -> std::io::Result<()> {
    std::fs::write(folder.join(WAKATIME_PROJECT_FILE), format!("{project}\n"))
}

/// A "Delicate River 42" style generated project name.
pub fn generate_project_name() -> String {
    let mut rng = rand::thread_rng();

    let adjective = words::ADJECTIVES[rng.gen_range(0..words::ADJECTIVES.len())];
    let noun = words::NOUNS[rng.gen_range(0..words::NOUNS.len())];
    let number: u32 = rng.gen_range(0..100);

    format!("{} {} {}", title_case(adjective), title_case(noun), number)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Number of slashes in a normalized folder path with exactly one trailing
/// slash.
pub fn count_slashes_in_project_folder(directory: &str) -> i32 {
    if directory.is_empty() {
        return 0;
    }

    let mut directory = directory.replace('\\', "/");
    if !directory.ends_with('/') {
        directory.push('/');
    }

    directory.matches('/').count() as i32
}

/// Absolute, symlink-resolved form of the folder path.
pub fn format_project_folder(folder: &str) -> String {
    if folder.is_empty() {
        return String::new();
    }

    crate::heartbeat::format::format_file_path(folder)
}

/// Search the directory and all parents for `filename`, starting from
/// `directory` (or its parent when `directory` is a file).
pub fn find_file_or_directory(directory: &Path, filename: &str) -> Option<PathBuf> {
    let mut current = if directory.is_file() {
        directory.parent()?.to_path_buf()
    } else {
        directory.to_path_buf()
    };

    for _ in 0..MAX_RECURSIVE_ITERATION {
        if is_root_path(&current) {
            return None;
        }

        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        current = match current.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return None,
        };
    }

    warn!("max {MAX_RECURSIVE_ITERATION} iterations reached without finding {filename}");

    None
}

fn is_root_path(directory: &Path) -> bool {
    directory.as_os_str().is_empty()
        || directory == Path::new(".")
        || directory.parent().is_none()
}
