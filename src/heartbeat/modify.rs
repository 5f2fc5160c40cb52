//! Entity modifier stage.
//!
//! Xcode playgrounds and projects arrive as directory paths; rewrite them
//! to the canonical inner file so the server sees a real source entity.

use std::path::Path;

use crate::heartbeat::{EntityType, Heartbeat};
use crate::pipeline::Stage;

pub struct EntityModifier;

impl Stage for EntityModifier {
    fn name(&self) -> &'static str {
        "heartbeat entity modifier"
    }

    fn process(&mut self, mut heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat> {
        for h in &mut heartbeats {
            if h.entity_type != EntityType::File {
                continue;
            }

            if is_xcode_playground(&h.entity) {
                h.entity = join(&h.entity, "Contents.swift");
            } else if is_xcode_project(&h.entity) {
                h.entity = join(&h.entity, "project.pbxproj");
            }
        }

        heartbeats
    }
}

fn join(dir: &str, file: &str) -> String {
    Path::new(dir).join(file).to_string_lossy().into_owned()
}

fn is_xcode_playground(path: &str) -> bool {
    let suffix_match = path.ends_with(".playground")
        || path.ends_with(".xcplayground")
        || path.ends_with(".xcplaygroundpage");

    suffix_match && Path::new(path).is_dir()
}

fn is_xcode_project(path: &str) -> bool {
    path.ends_with(".xcodeproj") && Path::new(path).is_dir()
}
