//! Plugin options and the model metadata this crate reacts to.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Equality filter: column -> value. Arrays match by membership, `null` matches missing values.
pub type Where = IndexMap<String, serde_json::Value>;

/// Auth requirement for a route: `false`, `true` (strategy "default"), or a strategy name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthSetting {
    Enabled(bool),
    Strategy(String),
}

impl Default for AuthSetting {
    fn default() -> Self {
        AuthSetting::Enabled(false)
    }
}

impl AuthSetting {
    pub const DEFAULT_STRATEGY: &'static str = "default";

    pub fn strategy(&self) -> Option<&str> {
        match self {
            AuthSetting::Enabled(false) => None,
            AuthSetting::Enabled(true) => Some(Self::DEFAULT_STRATEGY),
            AuthSetting::Strategy(s) => Some(s.as_str()),
        }
    }
}

/// Options applied to every generated route.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    pub prefix: String,
    pub scope_prefix: String,
    pub snake_case: bool,
    /// Model names that never get routes.
    pub private: Vec<String>,
    pub auth: AuthSetting,
    /// Glob patterns of per-model override files.
    pub controllers: Vec<String>,
    pub body_limit: usize,
}

impl Default for PluginOptions {
    fn default() -> Self {
        PluginOptions {
            prefix: String::new(),
            scope_prefix: "s".into(),
            snake_case: false,
            private: Vec::new(),
            auth: AuthSetting::default(),
            controllers: vec!["controllers/**/*.json".into()],
            body_limit: 1024 * 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

/// Route surface of an association: singular relation or plural relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

impl AssociationKind {
    pub fn cardinality(self) -> Cardinality {
        match self {
            AssociationKind::BelongsTo | AssociationKind::HasOne => Cardinality::One,
            AssociationKind::HasMany | AssociationKind::BelongsToMany => Cardinality::Many,
        }
    }
}

/// Junction table of a BelongsToMany association.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Through {
    pub table: String,
    #[serde(default)]
    pub source_key: String,
    #[serde(default)]
    pub target_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssociationDef {
    /// Name of the association on its source model (e.g. "tags", "productCategory").
    pub key: String,
    #[serde(rename = "type")]
    pub kind: AssociationKind,
    /// Target model name.
    pub target: String,
    #[serde(default)]
    pub singular: String,
    #[serde(default)]
    pub plural: String,
    /// On the source for BelongsTo, on the target for HasOne/HasMany.
    #[serde(default)]
    pub foreign_key: String,
    #[serde(default)]
    pub through: Option<Through>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    #[serde(default)]
    pub singular: String,
    #[serde(default)]
    pub plural: String,
    #[serde(default)]
    pub table: String,
    /// Declared columns besides `id`. Empty means the model accepts any column.
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub scopes: IndexMap<String, Where>,
    #[serde(default)]
    pub associations: Vec<AssociationDef>,
    /// `id`, attributes and foreign keys stored on this model. Filled by the model graph.
    #[serde(skip)]
    pub columns: Vec<String>,
}

impl ModelDef {
    /// Pivot models declare a singular name different from their internal name.
    pub fn is_join_model(&self) -> bool {
        self.singular != self.name
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.attributes.is_empty() || self.columns.iter().any(|c| c == column)
    }

    pub fn association(&self, key: &str) -> Option<&AssociationDef> {
        self.associations.iter().find(|a| a.key == key)
    }

    pub fn scope_names(&self) -> Vec<String> {
        self.scopes.keys().cloned().collect()
    }
}
