//! Load per-model overrides from override files (glob patterns) or factory closures.

use crate::case::model_name_from_stem;
use crate::config::{ControllerOverride, ModelDef, ModelGraph};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

/// Model name -> raw override, plus the `_default` wildcard applied to every model.
#[derive(Clone, Debug, Default)]
pub struct OverrideRegistry {
    default: Option<ControllerOverride>,
    models: HashMap<String, ControllerOverride>,
}

impl OverrideRegistry {
    pub const DEFAULT_KEY: &'static str = "_default";

    pub fn insert(&mut self, name: &str, over: ControllerOverride) {
        if name == Self::DEFAULT_KEY || name == "*" {
            self.default = Some(over);
        } else {
            self.models.insert(name.to_string(), over);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ControllerOverride> {
        self.models.get(name)
    }

    pub fn default_override(&self) -> Option<&ControllerOverride> {
        self.default.as_ref()
    }

    pub fn len(&self) -> usize {
        self.models.len() + usize::from(self.default.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate a factory with the graph and the named model (None for `_default` or unknown names).
    pub fn register_factory<F>(&mut self, name: &str, graph: &ModelGraph, factory: F)
    where
        F: FnOnce(&ModelGraph, Option<&ModelDef>) -> ControllerOverride,
    {
        let model = graph.get(name).map(|m| m.as_ref());
        let over = factory(graph, model);
        self.insert(name, over);
    }

    /// Read every file matched by `patterns` as a JSON override.
    pub fn load_files(patterns: &[String], graph: &ModelGraph) -> Result<Self, ConfigError> {
        let mut registry = OverrideRegistry::default();
        for pattern in patterns {
            for entry in glob::glob(pattern)? {
                let path = entry.map_err(|e| ConfigError::Load(e.to_string()))?;
                if !path.is_file() {
                    continue;
                }
                let (name, over) = load_file(&path)?;
                if name != Self::DEFAULT_KEY && graph.get(&name).is_none() {
                    tracing::warn!(file = %path.display(), model = %name, "override file names an unknown model");
                }
                tracing::debug!(file = %path.display(), model = %name, "loaded override");
                registry.insert(&name, over);
            }
        }
        Ok(registry)
    }
}

fn load_file(path: &Path) -> Result<(String, ControllerOverride), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidOverride {
        path: path.display().to_string(),
        message,
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid("file name is not valid UTF-8".into()))?;
    let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;
    let over = ControllerOverride::from_value(&value).map_err(invalid)?;
    Ok((model_name_from_stem(stem), over))
}
