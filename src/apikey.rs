//! Per-entity api key replacement stage.
//!
//! `[project_api_key]` patterns map entity paths to alternate api keys;
//! heartbeats without a matching pattern keep the default key.

use tracing::debug;

use crate::heartbeat::Heartbeat;
use crate::matcher::Matcher;
use crate::pipeline::Stage;

/// A per-path api key.
#[derive(Debug, Clone)]
pub struct ApiKeyPattern {
    pub api_key: String,
    pub pattern: Matcher,
}

/// Api key replacement configuration.
#[derive(Default, Clone)]
pub struct ApiKeyConfig {
    pub default_api_key: String,
    pub map_patterns: Vec<ApiKeyPattern>,
}

pub struct ApiKeyReplacement {
    config: ApiKeyConfig,
}

impl ApiKeyReplacement {
    pub fn new(config: ApiKeyConfig) -> Self {
        Self { config }
    }
}

impl Stage for ApiKeyReplacement {
    fn name(&self) -> &'static str {
        "api key replacing"
    }

    fn process(&mut self, mut heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat> {
        for h in &mut heartbeats {
            h.api_key = match match_pattern(&h.entity, &self.config.map_patterns) {
                Some(key) => key,
                None => self.config.default_api_key.clone(),
            };
        }

        heartbeats
    }
}

/// First api key whose pattern matches the entity path.
pub fn match_pattern(path: &str, patterns: &[ApiKeyPattern]) -> Option<String> {
    for pattern in patterns {
        if pattern.pattern.matches(path) {
            debug!(
                "api key pattern {:?} matched path {path:?}",
                pattern.pattern.as_str()
            );
            return Some(pattern.api_key.clone());
        }
    }

    None
}
