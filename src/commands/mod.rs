//! Command orchestrators, one per CLI verb.

pub mod heartbeat;
pub mod offline;
pub mod sync;

use crate::apikey::{ApiKeyConfig, ApiKeyReplacement};
use crate::config::Settings;
use crate::deps::{DependencyDetection, DepsConfig};
use crate::filestats::FileStats;
use crate::heartbeat::filter::{FilterConfig, Filtering};
use crate::heartbeat::format::Formatting;
use crate::heartbeat::modify::EntityModifier;
use crate::heartbeat::sanitize::{SanitizeConfig, Sanitization};
use crate::language::{LanguageConfig, LanguageDetection};
use crate::pipeline::{Pipeline, Sender};
use crate::project::{ProjectConfig, ProjectDetection, ProjectFiltering};
use crate::remote::{RemoteCleanup, RemoteDetection};

/// Compose the full enrichment pipeline in its fixed stage order, ending at
/// the given sender.
pub fn build_pipeline(settings: &Settings, sender: Box<dyn Sender>) -> Pipeline {
    Pipeline::new(sender)
        .with(Formatting)
        .with(EntityModifier)
        .with(Filtering::new(FilterConfig {
            exclude: settings.exclude.clone(),
            include: settings.include.clone(),
            include_only_with_project_file: settings.include_only_with_project_file,
        }))
        .with(RemoteDetection)
        .with(ApiKeyReplacement::new(ApiKeyConfig {
            default_api_key: settings.api_key.clone(),
            map_patterns: settings.api_key_map.clone(),
        }))
        .with(FileStats)
        .with(LanguageDetection::new(LanguageConfig {
            guess_language: settings.guess_language,
        }))
        .with(DependencyDetection::new(DepsConfig {
            file_patterns: settings.hide_file_names.clone(),
        }))
        .with(ProjectDetection::new(ProjectConfig {
            hide_project_names: settings.hide_project_names.clone(),
            map_patterns: settings.project_map.clone(),
            project_from_git_remote: settings.project_from_git_remote,
            submodules_disabled: settings.submodules_disabled.clone(),
            submodule_map_patterns: settings.submodule_map.clone(),
        }))
        .with(ProjectFiltering {
            exclude_unknown_project: settings.exclude_unknown_project,
        })
        .with(Sanitization::new(SanitizeConfig {
            branch_patterns: settings.hide_branch_names.clone(),
            dependency_patterns: settings.hide_dependencies.clone(),
            file_patterns: settings.hide_file_names.clone(),
            hide_project_folder: settings.hide_project_folder,
            project_patterns: settings.hide_project_names.clone(),
        }))
        .with(RemoteCleanup)
}
