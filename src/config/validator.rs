//! Model metadata validation: referential integrity and path-safe names.

use crate::config::{AssociationKind, ModelDef};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("segment pattern compiles"))
}

/// True when `name` can be used as a single path segment.
pub fn is_path_segment(name: &str) -> bool {
    segment_pattern().is_match(name)
}

pub fn validate(models: &[ModelDef]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for m in models {
        if !names.insert(m.name.as_str()) {
            return Err(ConfigError::DuplicateModel(m.name.clone()));
        }
    }

    for m in models {
        for name in [&m.name, &m.singular, &m.plural] {
            if !name.is_empty() && !is_path_segment(name) {
                return Err(ConfigError::Load(format!(
                    "model name '{}' is not a valid path segment",
                    name
                )));
            }
        }

        let mut keys = HashSet::new();
        for a in &m.associations {
            let invalid = |message: &str| ConfigError::InvalidAssociation {
                model: m.name.clone(),
                key: a.key.clone(),
                message: message.to_string(),
            };
            if !keys.insert(a.key.as_str()) {
                return Err(invalid("duplicate association key"));
            }
            if !names.contains(a.target.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "model",
                    id: a.target.clone(),
                });
            }
            for name in [&a.key, &a.singular, &a.plural] {
                if !name.is_empty() && !is_path_segment(name) {
                    return Err(invalid("name is not a valid path segment"));
                }
            }
            match (a.kind, &a.through) {
                (AssociationKind::BelongsToMany, None) => {
                    return Err(invalid("BelongsToMany requires a junction table"));
                }
                (AssociationKind::BelongsToMany, Some(t)) if t.table.is_empty() => {
                    return Err(invalid("junction table name is empty"));
                }
                _ => {}
            }
        }
    }

    Ok(())
}
