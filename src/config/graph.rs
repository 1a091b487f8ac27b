//! Model graph: metadata validated and normalized for route generation and stores.

use crate::config::{validate, AssociationDef, AssociationKind, ModelDef};
use crate::error::ConfigError;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct ModelGraph {
    models: IndexMap<String, Arc<ModelDef>>,
}

impl ModelGraph {
    /// Validate models, fill naming and key defaults, and compute stored columns.
    pub fn new(mut models: Vec<ModelDef>) -> Result<Self, ConfigError> {
        validate(&models)?;

        for m in models.iter_mut() {
            if m.singular.is_empty() {
                m.singular = m.name.clone();
            }
            if m.plural.is_empty() {
                m.plural = format!("{}s", m.name);
            }
            if m.table.is_empty() {
                m.table = m.name.clone();
            }
            let source = m.name.clone();
            for a in m.associations.iter_mut() {
                normalize_association(&source, a);
            }
        }

        // Foreign keys of HasOne/HasMany live on the target model.
        let mut foreign_columns: Vec<(String, String)> = Vec::new();
        for m in &models {
            for a in &m.associations {
                if matches!(a.kind, AssociationKind::HasOne | AssociationKind::HasMany) {
                    foreign_columns.push((a.target.clone(), a.foreign_key.clone()));
                }
            }
        }

        for m in models.iter_mut() {
            let mut columns = vec!["id".to_string()];
            columns.extend(m.attributes.iter().cloned());
            for a in &m.associations {
                if a.kind == AssociationKind::BelongsTo {
                    columns.push(a.foreign_key.clone());
                }
            }
            for (target, fk) in &foreign_columns {
                if *target == m.name {
                    columns.push(fk.clone());
                }
            }
            let mut seen = std::collections::HashSet::new();
            columns.retain(|c| seen.insert(c.clone()));
            m.columns = columns;
        }

        let models = models
            .into_iter()
            .map(|m| (m.name.clone(), Arc::new(m)))
            .collect();
        Ok(ModelGraph { models })
    }

    /// Parse a JSON array of model definitions.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let models: Vec<ModelDef> =
            serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::new(models)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ModelDef>> {
        self.models.get(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelDef>> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolve an `include` name against a model: association key first, then target model name.
    pub fn include_key(&self, model: &ModelDef, name: &str) -> Option<String> {
        if model.association(name).is_some() {
            return Some(name.to_string());
        }
        let mut by_target = model.associations.iter().filter(|a| a.target == name);
        match (by_target.next(), by_target.next()) {
            (Some(a), None) => Some(a.key.clone()),
            _ => None,
        }
    }
}

fn normalize_association(source: &str, a: &mut AssociationDef) {
    if a.singular.is_empty() {
        a.singular = a.key.clone();
    }
    if a.plural.is_empty() {
        a.plural = a.key.clone();
    }
    if a.foreign_key.is_empty() {
        a.foreign_key = match a.kind {
            AssociationKind::BelongsTo => format!("{}Id", a.key),
            _ => format!("{}Id", source),
        };
    }
    if let Some(through) = a.through.as_mut() {
        if through.source_key.is_empty() {
            through.source_key = format!("{}Id", source);
        }
        if through.target_key.is_empty() {
            through.target_key = format!("{}Id", a.target);
        }
    }
}
