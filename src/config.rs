//! Resolved configuration for one invocation.
//!
//! CLI flags take precedence over environment variables, which take
//! precedence over the user config file (`~/.wakatime.cfg`). Only the
//! resolved [`Settings`] value enters the pipeline; nothing downstream
//! re-reads flags or files.
//!
//! The user config is INI with multi-line values (one POSIX regex per
//! line), a dialect the ini crate does not read, so a small lenient reader
//! handles it here. The internal state file sticks with the ini crate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::apikey::ApiKeyPattern;
use crate::cli::Cli;
use crate::error::Error;
use crate::matcher::{compile_lines, Matcher};
use crate::offline::{RATE_LIMIT_DEFAULT_SECS, SYNC_MAX_DEFAULT};
use crate::project::MapPattern;

/// Environment variable overriding the home directory used for the
/// resource directory.
pub const WAKATIME_HOME_ENV: &str = "WAKATIME_HOME";
/// Fallback api key source.
pub const API_KEY_ENV: &str = "WAKATIME_API_KEY";

const USER_CONFIG_FILENAME: &str = ".wakatime.cfg";
const INTERNAL_CONFIG_FILENAME: &str = "wakatime-internal.cfg";
const LOG_FILENAME: &str = "wakatime.log";

/// The resolved configuration entering the core.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub api_key: String,
    pub api_url: String,
    pub plugin: String,
    pub timeout: Duration,
    pub hostname: Option<String>,

    pub proxy: String,
    pub no_ssl_verify: bool,
    pub ssl_certs_file: Option<PathBuf>,

    pub exclude: Vec<Matcher>,
    pub include: Vec<Matcher>,
    pub include_only_with_project_file: bool,
    pub exclude_unknown_project: bool,

    pub hide_branch_names: Vec<Matcher>,
    pub hide_project_names: Vec<Matcher>,
    pub hide_file_names: Vec<Matcher>,
    pub hide_dependencies: Vec<Matcher>,
    pub hide_project_folder: bool,

    pub project_map: Vec<MapPattern>,
    pub api_key_map: Vec<ApiKeyPattern>,
    pub submodules_disabled: Vec<Matcher>,
    pub submodule_map: Vec<MapPattern>,
    pub project_from_git_remote: bool,

    pub guess_language: bool,
    pub offline_disabled: bool,
    pub rate_limit: Duration,
    pub sync_max: usize,
    pub queue_file: Option<PathBuf>,

    pub verbose: bool,
}

impl Settings {
    /// Merge CLI flags, environment, and the user config file.
    pub fn resolve(cli: &Cli) -> Result<Self, Error> {
        let file = match user_config_path(cli.config.as_deref()) {
            Ok(path) if path.exists() => parse_user_config(&std::fs::read_to_string(&path)?)?,
            _ => UserConfig::default(),
        };

        let settings_section = file.section("settings");

        let api_key = cli
            .key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
            .or_else(|| settings_section.get("api_key").cloned())
            .or_else(|| settings_section.get("apikey").cloned())
            .unwrap_or_default();

        let api_url = cli
            .api_url
            .clone()
            .or_else(|| settings_section.get("api_url").cloned())
            .unwrap_or_else(|| crate::api::BASE_URL.to_string());
        let api_url = api_url.trim_end_matches('/').to_string();

        let timeout_secs = cli
            .timeout
            .or_else(|| parse_number(settings_section.get("timeout")))
            .unwrap_or(crate::api::DEFAULT_TIMEOUT_SECS);

        let rate_limit_secs = cli
            .heartbeat_rate_limit_seconds
            .or_else(|| parse_number(settings_section.get("heartbeat_rate_limit_seconds")))
            .unwrap_or(RATE_LIMIT_DEFAULT_SECS);

        let git_section = file.section("git");

        let hide_file_names = flag_patterns(
            cli.hide_file_names,
            first_value(
                settings_section,
                &["hide_file_names", "hide_filenames", "hidefilenames"],
            ),
        );

        Ok(Settings {
            api_key,
            api_url,
            plugin: cli.plugin.clone().unwrap_or_default(),
            timeout: Duration::from_secs(timeout_secs),
            hostname: cli
                .hostname
                .clone()
                .or_else(|| settings_section.get("hostname").cloned()),

            proxy: cli
                .proxy
                .clone()
                .or_else(|| settings_section.get("proxy").cloned())
                .unwrap_or_default(),
            no_ssl_verify: cli.no_ssl_verify
                || parse_bool(settings_section.get("no_ssl_verify")).unwrap_or(false),
            ssl_certs_file: cli
                .ssl_certs_file
                .clone()
                .or_else(|| settings_section.get("ssl_certs_file").map(PathBuf::from)),

            exclude: cli
                .exclude
                .as_deref()
                .map(compile_lines)
                .unwrap_or_else(|| compile_lines(value_or_empty(settings_section, "exclude"))),
            include: cli
                .include
                .as_deref()
                .map(compile_lines)
                .unwrap_or_else(|| compile_lines(value_or_empty(settings_section, "include"))),
            include_only_with_project_file: cli.include_only_with_project_file
                || parse_bool(settings_section.get("include_only_with_project_file"))
                    .unwrap_or(false),
            exclude_unknown_project: cli.exclude_unknown_project
                || parse_bool(settings_section.get("exclude_unknown_project")).unwrap_or(false),

            hide_branch_names: flag_patterns(
                cli.hide_branch_names,
                first_value(settings_section, &["hide_branch_names", "hide_branchnames"]),
            ),
            hide_project_names: flag_patterns(
                cli.hide_project_names,
                first_value(settings_section, &["hide_project_names", "hide_projectnames"]),
            ),
            hide_file_names,
            hide_dependencies: flag_patterns(
                false,
                first_value(settings_section, &["hide_dependencies"]),
            ),
            hide_project_folder: cli.hide_project_folder
                || parse_bool(settings_section.get("hide_project_folder")).unwrap_or(false),

            project_map: map_patterns(file.section("projectmap")),
            api_key_map: api_key_patterns(file.section("project_api_key")),
            submodules_disabled: compile_lines(value_or_empty(git_section, "submodules_disabled")),
            submodule_map: map_patterns(file.section("git_submodule_projectmap")),
            project_from_git_remote: parse_bool(git_section.get("project_from_git_remote"))
                .unwrap_or(false),

            guess_language: parse_bool(settings_section.get("guess_language")).unwrap_or(false),
            offline_disabled: cli.disable_offline
                || !parse_bool(settings_section.get("offline")).unwrap_or(true),
            rate_limit: Duration::from_secs(rate_limit_secs),
            sync_max: cli
                .sync_offline_activity
                .or_else(|| parse_number(settings_section.get("sync_offline_activity")))
                .unwrap_or(SYNC_MAX_DEFAULT as u64) as usize,
            queue_file: cli.offline_queue_file.clone(),

            verbose: cli.verbose || parse_bool(settings_section.get("debug")).unwrap_or(false),
        })
    }

    /// The offline queue database path.
    pub fn queue_path(&self) -> Result<PathBuf, Error> {
        if let Some(path) = &self.queue_file {
            return Ok(path.clone());
        }

        Ok(resources_dir()?.join(crate::offline::DB_FILENAME))
    }

    /// The internal state file path.
    pub fn internal_config_path(&self) -> Result<PathBuf, Error> {
        Ok(resources_dir()?.join(INTERNAL_CONFIG_FILENAME))
    }
}

/// The resource directory (`$WAKATIME_HOME` or `~/.wakatime`), created on
/// first use.
pub fn resources_dir() -> Result<PathBuf, Error> {
    let dir = match std::env::var(WAKATIME_HOME_ENV) {
        Ok(home) if !home.is_empty() => PathBuf::from(home),
        _ => dirs::home_dir()
            .ok_or_else(|| Error::Generic("could not determine home directory".to_string()))?
            .join(".wakatime"),
    };

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}

/// The log file path inside the resource directory.
pub fn log_file_path() -> Result<PathBuf, Error> {
    Ok(resources_dir()?.join(LOG_FILENAME))
}

/// The user config path (`--config`, `$WAKATIME_HOME/.wakatime.cfg`, or
/// `~/.wakatime.cfg`).
pub fn user_config_path(explicit: Option<&std::path::Path>) -> Result<PathBuf, Error> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(home) = std::env::var(WAKATIME_HOME_ENV) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home).join(USER_CONFIG_FILENAME));
        }
    }

    Ok(dirs::home_dir()
        .ok_or_else(|| Error::Generic("could not determine home directory".to_string()))?
        .join(USER_CONFIG_FILENAME))
}

/// Parsed user config: section name -> ordered key/value pairs.
#[derive(Debug, Default)]
pub struct UserConfig {
    sections: HashMap<String, Vec<(String, String)>>,
}

impl UserConfig {
    fn section(&self, name: &str) -> ConfigSection<'_> {
        ConfigSection {
            entries: self.sections.get(name).map(Vec::as_slice).unwrap_or(&[]),
        }
    }
}

/// View over one config section.
#[derive(Debug, Clone, Copy)]
pub struct ConfigSection<'a> {
    entries: &'a [(String, String)],
}

impl<'a> ConfigSection<'a> {
    fn get(&self, key: &str) -> Option<&'a String> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
    }

    fn iter(&self) -> impl Iterator<Item = &'a (String, String)> {
        self.entries.iter()
    }
}

/// Parse the INI dialect of the user config file.
///
/// Unlike strict INI, values may continue over following indented lines
/// (one regex per line); continuation lines are appended with a newline.
pub fn parse_user_config(contents: &str) -> Result<UserConfig, Error> {
    let mut config = UserConfig::default();
    let mut current_section = String::new();

    for (lineno, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim_end();

        if line.trim().is_empty() || line.trim_start().starts_with([';', '#']) {
            continue;
        }

        let trimmed = line.trim_start();

        if trimmed.starts_with('[') {
            let name = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .ok_or_else(|| {
                    Error::ConfigFileParse(format!(
                        "malformed section header on line {}",
                        lineno + 1
                    ))
                })?;
            current_section = name.trim().to_string();
            continue;
        }

        let indented = line.starts_with([' ', '\t']);

        // an indented line continues a multi-line value, even when it
        // contains '=' itself (regexes may)
        if indented && append_continuation(&mut config, &current_section, trimmed) {
            continue;
        }

        if let Some((key, value)) = trimmed.split_once('=') {
            config
                .sections
                .entry(current_section.clone())
                .or_default()
                .push((key.trim().to_string(), value.trim().to_string()));
            continue;
        }

        return Err(Error::ConfigFileParse(format!(
            "unexpected line {} outside of a value",
            lineno + 1
        )));
    }

    Ok(config)
}

fn append_continuation(config: &mut UserConfig, section: &str, continuation: &str) -> bool {
    let Some(entries) = config.sections.get_mut(section) else {
        return false;
    };

    let Some((_, value)) = entries.last_mut() else {
        return false;
    };

    if !value.is_empty() {
        value.push('\n');
    }
    value.push_str(continuation);

    true
}

fn value_or_empty<'a>(section: ConfigSection<'a>, key: &str) -> &'a str {
    section.get(key).map(String::as_str).unwrap_or("")
}

fn first_value<'a>(section: ConfigSection<'a>, keys: &[&str]) -> Option<&'a String> {
    keys.iter().find_map(|key| section.get(key))
}

/// Patterns for a hide knob: a CLI boolean flag compiles to `true`
/// (hide everything); a config value may be a boolean or a pattern list.
fn flag_patterns(cli_flag: bool, config_value: Option<&String>) -> Vec<Matcher> {
    if cli_flag {
        return compile_lines("true");
    }

    match config_value {
        Some(value) => compile_lines(value),
        None => Vec::new(),
    }
}

fn parse_bool(value: Option<&String>) -> Option<bool> {
    match value?.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        other => {
            warn!("ignoring invalid boolean config value {other:?}");
            None
        }
    }
}

fn parse_number(value: Option<&String>) -> Option<u64> {
    value?.trim().parse().ok()
}

fn map_patterns(section: ConfigSection<'_>) -> Vec<MapPattern> {
    section
        .iter()
        .filter_map(|(pattern, name)| match Matcher::compile(pattern) {
            Ok(matcher) => Some(MapPattern {
                name: name.clone(),
                pattern: matcher,
            }),
            Err(err) => {
                warn!("skipping invalid projectmap pattern: {err}");
                None
            }
        })
        .collect()
}

fn api_key_patterns(section: ConfigSection<'_>) -> Vec<ApiKeyPattern> {
    section
        .iter()
        .filter_map(|(pattern, api_key)| match Matcher::compile(pattern) {
            Ok(matcher) => Some(ApiKeyPattern {
                api_key: api_key.clone(),
                pattern: matcher,
            }),
            Err(err) => {
                warn!("skipping invalid project_api_key pattern: {err}");
                None
            }
        })
        .collect()
}
