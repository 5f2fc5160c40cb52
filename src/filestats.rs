//! File statistics stage: counts lines when the plugin did not supply them.

use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::heartbeat::{EntityType, Heartbeat};
use crate::pipeline::Stage;

/// Files larger than this are not counted.
const MAX_FILE_SIZE: u64 = 32 * 1024 * 1024;

pub struct FileStats;

impl Stage for FileStats {
    fn name(&self) -> &'static str {
        "filestats detection"
    }

    fn process(&mut self, mut heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat> {
        for h in &mut heartbeats {
            if h.lines.is_some() {
                continue;
            }

            if h.entity_type != EntityType::File {
                continue;
            }

            if h.is_unsaved_entity {
                continue;
            }

            let filepath = if h.local_file.is_empty() {
                h.entity.as_str()
            } else {
                h.local_file.as_str()
            };

            match count_lines(Path::new(filepath)) {
                Ok(Some(lines)) => h.lines = Some(lines),
                Ok(None) => {}
                Err(err) => {
                    debug!("failed to count lines in file {filepath:?}: {err}");
                }
            }
        }

        heartbeats
    }
}

/// Count lines in a file; `None` for oversized files.
fn count_lines(path: &Path) -> std::io::Result<Option<i32>> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > MAX_FILE_SIZE {
        return Ok(None);
    }

    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut count = 0i32;
    for line in reader.split(b'\n') {
        line?;
        count += 1;
    }

    Ok(Some(count))
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
    fn counts_lines_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.go");
        std::fs::write(&path, "package main\n\nfunc main() {}\n").unwrap();

        let mut stage = FileStats;
        let out = stage.process(vec![file_heartbeat(path.to_str().unwrap())]);
        assert_eq!(out[0].lines, Some(3));
    }

    #[test]
    fn keeps_supplied_line_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.go");
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let mut h = file_heartbeat(path.to_str().unwrap());
        h.lines = Some(99);

        let mut stage = FileStats;
        let out = stage.process(vec![h]);
        assert_eq!(out[0].lines, Some(99));
    }

    #[test]
    fn skips_missing_and_unsaved_files() {
        let mut unsaved = file_heartbeat("/nonexistent/unsaved.go");
        unsaved.is_unsaved_entity = true;

        let mut stage = FileStats;
        let out = stage.process(vec![file_heartbeat("/nonexistent/file.go"), unsaved]);
        assert!(out[0].lines.is_none());
        assert!(out[1].lines.is_none());
    }
}
