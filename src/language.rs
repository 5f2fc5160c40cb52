//! Language detection from file name, extension, and vim modeline.
//!
//! Special-cased filenames and ambiguous C-family extensions are resolved
//! first, then the extension table, then a vim modeline scan of the first
//! and last lines of the file. When nothing matches, the caller substitutes
//! the heartbeat's alternate language.

use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::heartbeat::{EntityType, Heartbeat};
use crate::pipeline::Stage;

/// Language detection options.
#[derive(Default, Clone)]
pub struct LanguageConfig {
    /// Read file contents when the filename is inconclusive.
    pub guess_language: bool,
}

pub struct LanguageDetection {
    config: LanguageConfig,
}

impl LanguageDetection {
    pub fn new(config: LanguageConfig) -> Self {
        Self { config }
    }
}

impl Stage for LanguageDetection {
    fn name(&self) -> &'static str {
        "language detection"
    }

    fn process(&mut self, mut heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat> {
        for h in &mut heartbeats {
            if h.language.is_some() {
                continue;
            }

            if h.entity_type != EntityType::File {
                continue;
            }

            let filepath = if h.local_file.is_empty() {
                h.entity.as_str()
            } else {
                h.local_file.as_str()
            };

            match detect(Path::new(filepath), self.config.guess_language) {
                Some(language) => h.language = Some(language.to_string()),
                None if !h.language_alternate.is_empty() => {
                    h.language = Some(h.language_alternate.clone());
                }
                None => {
                    debug!("failed to detect language on file entity {:?}", h.entity);
                }
            }
        }

        heartbeats
    }
}

/// Detect the language of a file, or `None` when unknown.
pub fn detect(path: &Path, guess_language: bool) -> Option<&'static str> {
    if let Some(language) = detect_special_cases(path) {
        return Some(language);
    }

    // a modeline outweighs an extension match but not an exact filename
    let (language, weight) = match detect_by_filename(path) {
        Some(language) => (Some(language), FILENAME_WEIGHT),
        None => match detect_by_extension(path) {
            Some(language) => (Some(language), EXTENSION_WEIGHT),
            None => (None, 0.0),
        },
    };

    if let Some(modeline) = detect_vim_modeline(path) {
        if MODELINE_WEIGHT > weight {
            return Some(modeline);
        }
    }

    // content-based guessing is slow; only when the name was inconclusive
    if language.is_none() && guess_language {
        if let Some(guessed) = detect_by_shebang(path) {
            return Some(guessed);
        }
    }

    language
}

const FILENAME_WEIGHT: f64 = 1.0;
const MODELINE_WEIGHT: f64 = 0.75;
const EXTENSION_WEIGHT: f64 = 0.5;

/// Exact filenames and ambiguous C-family extensions.
fn detect_special_cases(path: &Path) -> Option<&'static str> {
    let file = path.file_name()?.to_string_lossy();
    let ext = extension(path);

    match file.as_ref() {
        "go.mod" => return Some("Go"),
        "CMakeLists.txt" => return Some("CMake"),
        _ => {}
    }

    if ext == "h" || ext == "c" {
        if corresponding_file_exists(path, "c") {
            return Some("C");
        }
        if corresponding_file_exists(path, "m") {
            return Some("Objective-C");
        }
        if corresponding_file_exists(path, "mm") {
            return Some("Objective-C++");
        }
        if let Some(parent) = path.parent() {
            if folder_contains_cpp_files(parent) {
                return Some("C++");
            }
            if folder_contains_c_files(parent) {
                return Some("C");
            }
        }
    }

    if ext == "m" && corresponding_file_exists(path, "h") {
        return Some("Objective-C");
    }

    if ext == "mm" && corresponding_file_exists(path, "h") {
        return Some("Objective-C++");
    }

    None
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// True when a sibling with the same stem and the given extension exists,
/// lower- or upper-cased.
fn corresponding_file_exists(path: &Path, ext: &str) -> bool {
    let stem = path.with_extension("");

    stem.with_extension(ext).exists() || stem.with_extension(ext.to_uppercase()).exists()
}

fn folder_extensions(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| extension(&e.path()))
            .collect(),
        Err(err) => {
            debug!("failed loading folder extensions: {err}");
            Vec::new()
        }
    }
}

fn folder_contains_c_files(dir: &Path) -> bool {
    folder_extensions(dir).iter().any(|e| e == "c")
}

fn folder_contains_cpp_files(dir: &Path) -> bool {
    const CPP_EXTENSIONS: &[&str] = &[
        "cpp", "hpp", "c++", "h++", "cc", "hh", "cxx", "hxx", "cp",
    ];

    folder_extensions(dir)
        .iter()
        .any(|e| CPP_EXTENSIONS.contains(&e.as_str()))
}

fn detect_by_filename(path: &Path) -> Option<&'static str> {
    let file = path.file_name()?.to_string_lossy();

    let language = match file.as_ref() {
        "Dockerfile" => "Docker",
        "Makefile" | "makefile" | "GNUmakefile" => "Makefile",
        "Gemfile" | "Rakefile" => "Ruby",
        "Cargo.lock" => "TOML",
        ".vimrc" | "vimrc" => "VimL",
        ".bashrc" | ".bash_profile" => "Bash",
        ".zshrc" => "Zsh",
        _ => return None,
    };

    Some(language)
}

fn detect_by_extension(path: &Path) -> Option<&'static str> {
    let language = match extension(path).as_str() {
        "asm" | "s" => "Assembly",
        "c" => "C",
        "clj" | "cljs" => "Clojure",
        "cpp" | "cc" | "cxx" | "c++" | "hpp" | "hh" | "hxx" | "h++" | "cp" => "C++",
        "cs" => "C#",
        "css" => "CSS",
        "dart" => "Dart",
        "elm" => "Elm",
        "erl" | "hrl" => "Erlang",
        "ex" | "exs" => "Elixir",
        "fs" | "fsi" | "fsx" => "F#",
        "go" => "Go",
        "gradle" => "Groovy",
        "h" => "C",
        "hs" | "lhs" => "Haskell",
        "html" | "htm" => "HTML",
        "hx" => "Haxe",
        "ini" | "cfg" => "INI",
        "java" => "Java",
        "js" | "mjs" | "cjs" => "JavaScript",
        "json" => "JSON",
        "jsx" => "JSX",
        "kt" | "kts" => "Kotlin",
        "lua" => "Lua",
        "m" => "Objective-C",
        "md" | "markdown" => "Markdown",
        "ml" | "mli" => "OCaml",
        "mm" => "Objective-C++",
        "php" => "PHP",
        "pl" | "pm" => "Perl",
        "proto" => "Protocol Buffer",
        "ps1" => "PowerShell",
        "py" | "pyw" => "Python",
        "r" => "R",
        "rb" => "Ruby",
        "rs" => "Rust",
        "sass" | "scss" => "SCSS",
        "scala" => "Scala",
        "sh" | "bash" => "Bash",
        "sql" => "SQL",
        "svelte" => "Svelte",
        "swift" => "Swift",
        "tex" => "TeX",
        "tf" => "Terraform",
        "toml" => "TOML",
        "ts" | "mts" | "cts" => "TypeScript",
        "tsx" => "TSX",
        "vim" => "VimL",
        "vue" => "Vue.js",
        "xml" => "XML",
        "yaml" | "yml" => "YAML",
        "zig" => "Zig",
        "zsh" => "Zsh",
        _ => return None,
    };

    Some(language)
}

/// Guess from a shebang line, e.g. `#!/usr/bin/env python3`.
fn detect_by_shebang(path: &Path) -> Option<&'static str> {
    let file = std::fs::File::open(path).ok()?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).ok()?;

    let rest = first_line.strip_prefix("#!")?;
    let interpreter = rest
        .split_whitespace()
        .flat_map(|part| part.rsplit('/').next())
        .find(|part| *part != "env")?;

    let interpreter = interpreter.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');

    let language = match interpreter {
        "bash" | "sh" | "dash" => "Bash",
        "node" => "JavaScript",
        "perl" => "Perl",
        "python" => "Python",
        "ruby" => "Ruby",
        "zsh" => "Zsh",
        _ => return None,
    };

    Some(language)
}

/// Scan the first and last lines of the file for a `vim: ft=` modeline.
fn detect_vim_modeline(path: &Path) -> Option<&'static str> {
    const SCAN_LINES: usize = 5;

    let file = std::fs::File::open(path).ok()?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

    let head = lines.iter().take(SCAN_LINES);
    let tail = lines.iter().rev().take(SCAN_LINES);

    for line in head.chain(tail) {
        if let Some(filetype) = parse_modeline(line) {
            return modeline_language(&filetype);
        }
    }

    None
}

fn parse_modeline(line: &str) -> Option<String> {
    let rest = line.split("vim:").nth(1)?;
    let rest = rest.trim_start().trim_start_matches("set ");

    for option in rest.split([' ', ':', '\t']) {
        let option = option.trim();
        if let Some(value) = option
            .strip_prefix("ft=")
            .or_else(|| option.strip_prefix("filetype="))
        {
            return Some(value.to_string());
        }
    }

    None
}

fn modeline_language(filetype: &str) -> Option<&'static str> {
    let language = match filetype {
        "c" => "C",
        "cpp" => "C++",
        "go" => "Go",
        "haskell" => "Haskell",
        "java" => "Java",
        "javascript" => "JavaScript",
        "lua" => "Lua",
        "make" => "Makefile",
        "perl" => "Perl",
        "python" => "Python",
        "ruby" => "Ruby",
        "rust" => "Rust",
        "sh" => "Bash",
        "tex" => "TeX",
        "vim" => "VimL",
        "yaml" => "YAML",
        _ => return None,
    };

    Some(language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_extension() {
        assert_eq!(detect(Path::new("/tmp/main.go"), false), Some("Go"));
        assert_eq!(detect(Path::new("/tmp/lib.rs"), false), Some("Rust"));
        assert_eq!(detect(Path::new("/tmp/app.tsx"), false), Some("TSX"));
        assert_eq!(detect(Path::new("/tmp/noext"), false), None);
    }

    #[test]
    fn special_filenames_win() {
        assert_eq!(detect(Path::new("/tmp/go.mod"), false), Some("Go"));
        assert_eq!(detect(Path::new("/tmp/CMakeLists.txt"), false), Some("CMake"));
        assert_eq!(detect(Path::new("/tmp/Dockerfile"), false), Some("Docker"));
    }

    #[test]
    fn header_disambiguated_by_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("list.h");
        std::fs::write(&header, "").unwrap();
        std::fs::write(dir.path().join("list.m"), "").unwrap();

        assert_eq!(detect(&header, false), Some("Objective-C"));
    }

    #[test]
    fn header_disambiguated_by_folder_peers() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("list.h");
        std::fs::write(&header, "").unwrap();
        std::fs::write(dir.path().join("impl.cpp"), "").unwrap();

        assert_eq!(detect(&header, false), Some("C++"));
    }

    #[test]
    fn lone_header_defaults_to_c() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("list.h");
        std::fs::write(&header, "").unwrap();

        assert_eq!(detect(&header, false), Some("C"));
    }

    #[test]
    fn modeline_beats_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.conf");
        std::fs::write(&file, "# vim: ft=python\nprint('hi')\n").unwrap();

        assert_eq!(detect(&file, false), Some("Python"));
    }

    #[test]
    fn modeline_in_trailing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.conf");
        let body = "line\n".repeat(50) + "# vim: set ft=lua:\n";
        std::fs::write(&file, body).unwrap();

        assert_eq!(detect(&file, false), Some("Lua"));
    }

    #[test]
    fn modeline_beats_extension_but_not_exact_filename() {
        let dir = tempfile::tempdir().unwrap();

        let file = dir.path().join("main.conf.rs");
        std::fs::write(&file, "// vim: ft=python\nfn main() {}\n").unwrap();
        assert_eq!(detect(&file, false), Some("Python"));

        let makefile = dir.path().join("Makefile");
        std::fs::write(&makefile, "# vim: ft=python\nall:\n").unwrap();
        assert_eq!(detect(&makefile, false), Some("Makefile"));
    }

    #[test]
    fn shebang_guess_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("run");
        std::fs::write(&file, "#!/usr/bin/env python3\nprint('hi')\n").unwrap();

        assert_eq!(detect(&file, false), None);
        assert_eq!(detect(&file, true), Some("Python"));
    }

    #[test]
    fn stage_prefers_existing_and_alternate_language() {
        let explicit = Heartbeat {
            entity: "/tmp/main.unknownext".to_string(),
            entity_type: EntityType::File,
            language: Some("Go".to_string()),
            time: 1.0,
            ..Default::default()
        };
        let mut with_alternate = explicit.clone();
        with_alternate.language = None;
        with_alternate.language_alternate = "Pawn".to_string();

        let mut stage = LanguageDetection::new(LanguageConfig::default());
        let out = stage.process(vec![explicit, with_alternate]);

        assert_eq!(out[0].language.as_deref(), Some("Go"));
        assert_eq!(out[1].language.as_deref(), Some("Pawn"));
    }
}
