//! Heartbeat filtering stage.
//!
//! Drops heartbeats matching exclude patterns (include overrides exclude)
//! and file heartbeats whose entity does not exist on disk. Remote and
//! unsaved entities are exempt from the existence check.

use std::path::Path;

use tracing::debug;

use crate::heartbeat::{EntityType, Heartbeat};
use crate::matcher::Matcher;
use crate::pipeline::Stage;
use crate::project;

/// Filtering configuration.
#[derive(Default, Clone)]
pub struct FilterConfig {
    pub exclude: Vec<Matcher>,
    pub include: Vec<Matcher>,
    pub include_only_with_project_file: bool,
}

pub struct Filtering {
    config: FilterConfig,
}

impl Filtering {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }
}

impl Stage for Filtering {
    fn name(&self) -> &'static str {
        "heartbeat filtering"
    }

    fn process(&mut self, heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat> {
        heartbeats
            .into_iter()
            .filter(|h| match filter(h, &self.config) {
                Ok(()) => true,
                Err(reason) => {
                    debug!("{reason}");
                    false
                }
            })
            .collect()
    }
}

/// Decide whether a heartbeat should be skipped. Returns the skip reason.
pub fn filter(h: &Heartbeat, config: &FilterConfig) -> Result<(), String> {
    filter_by_pattern(&h.entity, &config.include, &config.exclude)
        .map_err(|err| format!("filter by pattern: {err}"))?;

    filter_file_entity(h, config).map_err(|err| format!("filter file: {err}"))?;

    Ok(())
}

fn filter_by_pattern(entity: &str, include: &[Matcher], exclude: &[Matcher]) -> Result<(), String> {
    if entity.is_empty() {
        return Ok(());
    }

    // include overrides exclude
    if include.iter().any(|p| p.matches(entity)) {
        return Ok(());
    }

    for pattern in exclude {
        if pattern.matches(entity) {
            return Err(format!(
                "skipping because matches exclude pattern {:?}",
                pattern.as_str()
            ));
        }
    }

    Ok(())
}

fn filter_file_entity(h: &Heartbeat, config: &FilterConfig) -> Result<(), String> {
    if h.entity_type != EntityType::File {
        return Ok(());
    }

    if h.is_unsaved_entity {
        return Ok(());
    }

    if h.is_remote() {
        return Ok(());
    }

    let entity = if h.local_file.is_empty() {
        h.entity.as_str()
    } else {
        h.local_file.as_str()
    };

    if !Path::new(entity).exists() {
        return Err(format!("skipping because of non-existing file {entity:?}"));
    }

    if config.include_only_with_project_file
        && project::find_file_or_directory(Path::new(entity), project::WAKATIME_PROJECT_FILE)
            .is_none()
    {
        return Err("skipping because missing .wakatime-project file in parent path".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_heartbeat(entity: &str) -> Heartbeat {
        Heartbeat {
            entity: entity.to_string(),
            entity_type: EntityType::File,
            time: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn drops_nonexistent_file() {
        let h = file_heartbeat("/nonexistent/file.go");
        let err = filter(&h, &FilterConfig::default()).unwrap_err();
        assert!(err.contains("non-existing file"));
    }

    #[test]
    fn keeps_unsaved_entity_without_file() {
        let mut h = file_heartbeat("/nonexistent/file.go");
        h.is_unsaved_entity = true;
        assert!(filter(&h, &FilterConfig::default()).is_ok());
    }

    #[test]
    fn keeps_remote_entity_without_file() {
        let h = file_heartbeat("ssh://user@host/nonexistent/file.go");
        assert!(filter(&h, &FilterConfig::default()).is_ok());
    }

    #[test]
    fn exclude_pattern_drops_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("secret.go");
        std::fs::write(&file, "").unwrap();

        let config = FilterConfig {
            exclude: vec![Matcher::compile("secret").unwrap()],
            ..Default::default()
        };

        let h = file_heartbeat(file.to_str().unwrap());
        let err = filter(&h, &config).unwrap_err();
        assert!(err.contains("exclude pattern"));
    }

    #[test]
    fn include_overrides_exclude() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("secret.go");
        std::fs::write(&file, "").unwrap();

        let config = FilterConfig {
            exclude: vec![Matcher::compile("secret").unwrap()],
            include: vec![Matcher::compile(r"\.go$").unwrap()],
            ..Default::default()
        };

        let h = file_heartbeat(file.to_str().unwrap());
        assert!(filter(&h, &config).is_ok());
    }

    #[test]
    fn project_file_gate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.go");
        std::fs::write(&file, "").unwrap();

        let config = FilterConfig {
            include_only_with_project_file: true,
            ..Default::default()
        };

        let h = file_heartbeat(file.to_str().unwrap());
        assert!(filter(&h, &config).is_err());

        std::fs::write(dir.path().join(".wakatime-project"), "demo\n").unwrap();
        assert!(filter(&h, &config).is_ok());
    }

    #[test]
    fn stage_drops_and_keeps() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.go");
        std::fs::write(&file, "").unwrap();

        let mut stage = Filtering::new(FilterConfig::default());
        let out = stage.process(vec![
            file_heartbeat(file.to_str().unwrap()),
            file_heartbeat("/nonexistent/file.go"),
        ]);
        assert_eq!(out.len(), 1);
    }
}
