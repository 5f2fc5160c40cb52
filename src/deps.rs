//! Per-language dependency extraction.
//!
//! Each scanner reads the file once and applies language-specific rules to
//! collect imported module names. Scanner selection follows the detected
//! language; files matching hide-file-name patterns are skipped entirely.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::heartbeat::{should_sanitize, EntityType, Heartbeat, SanitizeCheck};
use crate::matcher::Matcher;
use crate::pipeline::Stage;

/// Upper bound of scanned lines per file.
const MAX_LINES: usize = 2000;
/// Upper bound of collected dependencies per file.
const MAX_DEPENDENCIES: usize = 1000;

/// Dependency scanning options.
#[derive(Default, Clone)]
pub struct DepsConfig {
    /// Files matching these patterns are not scanned.
    pub file_patterns: Vec<Matcher>,
}

pub struct DependencyDetection {
    config: DepsConfig,
}

impl DependencyDetection {
    pub fn new(config: DepsConfig) -> Self {
        Self { config }
    }
}

impl Stage for DependencyDetection {
    fn name(&self) -> &'static str {
        "dependency detection"
    }

    fn process(&mut self, mut heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat> {
        for h in &mut heartbeats {
            if h.entity_type != EntityType::File {
                continue;
            }

            if h.is_unsaved_entity {
                continue;
            }

            let hidden = should_sanitize(
                &SanitizeCheck {
                    entity: &h.entity,
                    project_path: &h.project_path,
                    project_path_override: &h.project_path_override,
                },
                &self.config.file_patterns,
            );
            if hidden {
                continue;
            }

            let filepath = if h.local_file.is_empty() {
                h.entity.as_str()
            } else {
                h.local_file.as_str()
            };

            match parse(Path::new(filepath), h.language.as_deref()) {
                Ok(deps) if !deps.is_empty() => h.dependencies = Some(deps),
                Ok(_) => {}
                Err(err) => {
                    debug!("failed to detect dependencies on file {filepath:?}: {err}");
                }
            }
        }

        heartbeats
    }
}

/// Extract dependencies from a file given its detected language.
pub fn parse(path: &Path, language: Option<&str>) -> std::io::Result<Vec<String>> {
    let Some(language) = language else {
        return Ok(parse_unknown(path));
    };

    let scanner: fn(&str) -> Vec<String> = match language {
        "C" => scan_c,
        "C++" => scan_cpp,
        "C#" => scan_csharp,
        "Elm" => scan_elm,
        "Go" => scan_go,
        "Haskell" => scan_haskell,
        "Java" => scan_java,
        "Kotlin" => scan_kotlin,
        "Objective-C" | "Objective-C++" => scan_objective_c,
        "Python" => scan_python,
        "Rust" => scan_rust,
        "Swift" => scan_swift,
        _ => return Ok(parse_unknown(path)),
    };

    let mut dependencies = Vec::new();

    for line in read_capped_lines(path)? {
        for dep in scanner(&line) {
            if !dep.is_empty() && !dependencies.contains(&dep) {
                dependencies.push(dep);
            }

            if dependencies.len() >= MAX_DEPENDENCIES {
                return Ok(dependencies);
            }
        }
    }

    Ok(dependencies)
}

fn read_capped_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    Ok(reader
        .lines()
        .map_while(Result::ok)
        .take(MAX_LINES)
        .collect())
}

/// Heuristic for files without a detected language.
fn parse_unknown(path: &Path) -> Vec<String> {
    let Some(file) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Vec::new();
    };

    if file == "bower.json" {
        return vec!["bower".to_string()];
    }

    if file.starts_with("Gruntfile") {
        return vec!["grunt".to_string()];
    }

    Vec::new()
}

static GO_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*(?:import\s+)?(?:[\w.]+\s+)?"([^"]+)""#).unwrap());

fn scan_go(line: &str) -> Vec<String> {
    GO_IMPORT
        .captures(line)
        .map(|caps| vec![caps[1].to_string()])
        .unwrap_or_default()
}

static C_INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*#\s*include\s+[<"]([^>"]+)[>"]"#).unwrap());

fn scan_c(line: &str) -> Vec<String> {
    C_INCLUDE
        .captures(line)
        .map(|caps| {
            // strip the extension and any directory part: <sys/stat.h> -> stat
            let header = caps[1].rsplit('/').next().unwrap_or(&caps[1]);
            let name = header.split('.').next().unwrap_or(header);
            vec![name.to_string()]
        })
        .unwrap_or_default()
}

fn scan_cpp(line: &str) -> Vec<String> {
    scan_c(line)
}

static CSHARP_USING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*using\s+(?:static\s+)?([\w.]+)\s*;").unwrap());

fn scan_csharp(line: &str) -> Vec<String> {
    CSHARP_USING
        .captures(line)
        .map(|caps| {
            let first = caps[1].split('.').next().unwrap_or(&caps[1]);
            vec![first.to_string()]
        })
        .unwrap_or_default()
}

static ELM_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+([\w.]+)").unwrap());

fn scan_elm(line: &str) -> Vec<String> {
    ELM_IMPORT
        .captures(line)
        .map(|caps| vec![caps[1].to_string()])
        .unwrap_or_default()
}

static HASKELL_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(?:qualified\s+)?([\w.]+)").unwrap());

fn scan_haskell(line: &str) -> Vec<String> {
    HASKELL_IMPORT
        .captures(line)
        .map(|caps| vec![caps[1].to_string()])
        .unwrap_or_default()
}

static JAVA_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;").unwrap());

fn scan_java(line: &str) -> Vec<String> {
    JAVA_IMPORT
        .captures(line)
        .map(|caps| {
            // keep the top-level package, skipping the common reverse-domain prefix
            let mut parts = caps[1].split('.');
            let first = parts.next().unwrap_or_default();
            let name = match first {
                "com" | "org" | "net" | "io" => parts.next().unwrap_or(first),
                _ => first,
            };
            vec![name.to_string()]
        })
        .unwrap_or_default()
}

static KOTLIN_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+([\w.]+)").unwrap());

fn scan_kotlin(line: &str) -> Vec<String> {
    KOTLIN_IMPORT
        .captures(line)
        .map(|caps| vec![caps[1].to_string()])
        .unwrap_or_default()
}

static OBJC_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*#\s*(?:import|include)\s+[<"]([^>"/]+)"#).unwrap());

fn scan_objective_c(line: &str) -> Vec<String> {
    OBJC_IMPORT
        .captures(line)
        .map(|caps| {
            let name = caps[1].split('.').next().unwrap_or(&caps[1]);
            vec![name.to_string()]
        })
        .unwrap_or_default()
}

static PYTHON_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:from\s+([\w.]+)\s+import|import\s+([\w.,\s]+))").unwrap()
});

fn scan_python(line: &str) -> Vec<String> {
    let Some(caps) = PYTHON_IMPORT.captures(line) else {
        return Vec::new();
    };

    if let Some(from) = caps.get(1) {
        let root = from.as_str().split('.').next().unwrap_or_default();
        return vec![root.to_string()];
    }

    caps.get(2)
        .map(|list| {
            list.as_str()
                .split(',')
                .map(|module| {
                    module
                        .trim()
                        .split(['.', ' '])
                        .next()
                        .unwrap_or_default()
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default()
}

static RUST_USE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:pub\s+)?use\s+([\w:]+)").unwrap());

fn scan_rust(line: &str) -> Vec<String> {
    RUST_USE
        .captures(line)
        .map(|caps| {
            let root = caps[1].split("::").next().unwrap_or_default();
            match root {
                "crate" | "self" | "super" | "std" | "core" | "alloc" => Vec::new(),
                _ => vec![root.to_string()],
            }
        })
        .unwrap_or_default()
}

static SWIFT_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(?:\w+\s+)?([\w.]+)").unwrap());

fn scan_swift(line: &str) -> Vec<String> {
    SWIFT_IMPORT
        .captures(line)
        .map(|caps| {
            let root = caps[1].split('.').next().unwrap_or_default();
            vec![root.to_string()]
        })
        .unwrap_or_default()
}
