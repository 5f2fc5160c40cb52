//! Regex matching with a two-engine fallback.
//!
//! Patterns compile with the standard [`regex`] engine first. Patterns the
//! standard engine rejects (lookaround, backreferences) are retried with
//! [`fancy_regex`]. Callers never see which engine matched.
//!
//! All patterns are case-insensitive unless they already carry an inline
//! flag group. The literals `true` and `false` compile to match-all and
//! match-none, which backs the hide-everything config knobs.

use std::fmt;

/// A compiled pattern backed by one of the two engines.
#[derive(Debug, Clone)]
pub struct Matcher {
    source: String,
    engine: Engine,
}

#[derive(Debug, Clone)]
enum Engine {
    Standard(regex::Regex),
    Fancy(fancy_regex::Regex),
    /// Matches every input (`true` literal).
    All,
    /// Matches no input (`false` literal, empty pattern).
    None,
}

impl Matcher {
    /// Compile a pattern, trying the standard engine first and falling back
    /// to the fancy engine on syntax rejection.
    pub fn compile(pattern: &str) -> Result<Self, String> {
        let trimmed = pattern.trim();

        match trimmed {
            "" => {
                return Ok(Matcher {
                    source: pattern.to_string(),
                    engine: Engine::None,
                })
            }
            "true" => {
                return Ok(Matcher {
                    source: pattern.to_string(),
                    engine: Engine::All,
                })
            }
            "false" => {
                return Ok(Matcher {
                    source: pattern.to_string(),
                    engine: Engine::None,
                })
            }
            _ => {}
        }

        let pattern = if trimmed.starts_with("(?i)") {
            trimmed.to_string()
        } else {
            format!("(?i){trimmed}")
        };

        if let Ok(rgx) = regex::Regex::new(&pattern) {
            return Ok(Matcher {
                source: pattern,
                engine: Engine::Standard(rgx),
            });
        }

        match fancy_regex::Regex::new(&pattern) {
            Ok(rgx) => Ok(Matcher {
                source: pattern,
                engine: Engine::Fancy(rgx),
            }),
            Err(err) => Err(format!("failed to compile regex {pattern:?}: {err}")),
        }
    }

    /// Whether the pattern matches anywhere in `s`.
    pub fn matches(&self, s: &str) -> bool {
        match &self.engine {
            Engine::Standard(rgx) => rgx.is_match(s),
            Engine::Fancy(rgx) => match rgx.is_match(s) {
                Ok(matched) => matched,
                Err(err) => {
                    tracing::warn!("failed to match string {s:?}: {err}");
                    false
                }
            },
            Engine::All => true,
            Engine::None => false,
        }
    }

    /// The full match followed by all capture groups, or empty when the
    /// pattern does not match.
    pub fn find_submatch(&self, s: &str) -> Vec<String> {
        match &self.engine {
            Engine::Standard(rgx) => match rgx.captures(s) {
                Some(caps) => caps
                    .iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect(),
                None => Vec::new(),
            },
            Engine::Fancy(rgx) => match rgx.captures(s) {
                Ok(Some(caps)) => caps
                    .iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect(),
                Ok(None) => Vec::new(),
                Err(err) => {
                    tracing::warn!("failed to find string match {s:?}: {err}");
                    Vec::new()
                }
            },
            Engine::All | Engine::None => Vec::new(),
        }
    }

    /// The source text the pattern was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile each line of a multi-line config value into a matcher.
///
/// Invalid lines are skipped with a warning so one bad pattern does not
/// disable the rest of the list.
pub fn compile_lines(value: &str) -> Vec<Matcher> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match Matcher::compile(line) {
            Ok(matcher) => Some(matcher),
            Err(err) => {
                tracing::warn!("skipping invalid pattern: {err}");
                None
            }
        })
        .collect()
}
