//! Typed controller override tree and its key-by-key merge.
//!
//! Shape accepted from JSON (every level optional):
//! `{ "*": bool|{method: flag}, <crudMethod>: flag,
//!    "associations": bool|{ "*": bool|{ "*": flag, <method>: flag }, <name>: bool|{ "*": flag, <method>: flag } } }`
//! where a flag is `false`, `true`, or an overlay object.

use crate::config::AuthSetting;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Route method keys shared by CRUD and association controllers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Index,
    Get,
    Scope,
    Create,
    Update,
    UpdateMany,
    Destroy,
    DestroyMany,
    Count,
}

impl Action {
    pub const CRUD: [Action; 7] = [
        Action::Index,
        Action::Get,
        Action::Scope,
        Action::Create,
        Action::Update,
        Action::Destroy,
        Action::Count,
    ];
    pub const ONE_TO_ONE: [Action; 4] = [Action::Index, Action::Create, Action::Update, Action::Destroy];
    pub const ONE_TO_MANY: [Action; 7] = [
        Action::Index,
        Action::Create,
        Action::Update,
        Action::UpdateMany,
        Action::Destroy,
        Action::DestroyMany,
        Action::Count,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Action::Index => "index",
            Action::Get => "get",
            Action::Scope => "scope",
            Action::Create => "create",
            Action::Update => "update",
            Action::UpdateMany => "updateMany",
            Action::Destroy => "destroy",
            Action::DestroyMany => "destroyMany",
            Action::Count => "count",
        }
    }

    pub fn from_key(key: &str) -> Option<Action> {
        [
            Action::Index,
            Action::Get,
            Action::Scope,
            Action::Create,
            Action::Update,
            Action::UpdateMany,
            Action::Destroy,
            Action::DestroyMany,
            Action::Count,
        ]
        .into_iter()
        .find(|a| a.key() == key)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Where a pre-handler's value is assigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreAssign {
    /// Pre-resolved instance used instead of loading by id.
    #[default]
    Model,
    /// Scope name(s) applied to the route's queries.
    Scope,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreStep {
    /// Name of a registered pre-handler.
    pub method: String,
    #[serde(default)]
    pub assign: PreAssign,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub auth: Option<AuthSetting>,
    #[serde(default)]
    pub pre: Vec<PreStep>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-route configuration carried by an enabled flag given as an object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteOverlay {
    /// Replaces the generated path template.
    #[serde(default)]
    pub path: Option<String>,
    /// Name of a registered custom handler replacing the built-in one.
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub config: RouteConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RouteOverlay {
    /// Key-by-key merge; `over` wins on scalars, arrays are replaced.
    pub fn merged(&self, over: &RouteOverlay) -> RouteOverlay {
        RouteOverlay {
            path: over.path.clone().or_else(|| self.path.clone()),
            handler: over.handler.clone().or_else(|| self.handler.clone()),
            config: RouteConfig {
                auth: over.config.auth.clone().or_else(|| self.config.auth.clone()),
                pre: if over.config.pre.is_empty() {
                    self.config.pre.clone()
                } else {
                    over.config.pre.clone()
                },
                description: over
                    .config
                    .description
                    .clone()
                    .or_else(|| self.config.description.clone()),
                tags: if over.config.tags.is_empty() {
                    self.config.tags.clone()
                } else {
                    over.config.tags.clone()
                },
                extra: merge_maps(&self.config.extra, &over.config.extra),
            },
            extra: merge_maps(&self.extra, &over.extra),
        }
    }
}

/// Recursive JSON merge: objects merge key-by-key, anything else is replaced.
pub fn merge_json(base: &Value, over: &Value) -> Value {
    match (base, over) {
        (Value::Object(b), Value::Object(o)) => Value::Object(merge_maps(b, o)),
        (_, o) => o.clone(),
    }
}

fn merge_maps(base: &Map<String, Value>, over: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (k, v) in over {
        let merged = match out.get(k) {
            Some(b) => merge_json(b, v),
            None => v.clone(),
        };
        out.insert(k.clone(), merged);
    }
    out
}

/// A single method flag.
#[derive(Clone, Debug, PartialEq)]
pub enum Setting {
    Disabled,
    Enabled,
    Configured(RouteOverlay),
}

impl Setting {
    /// `false` disables, `true` enables, objects become overlays; anything else enables with no overlay.
    pub fn from_value(value: &Value, at: &str) -> Setting {
        match value {
            Value::Bool(false) => Setting::Disabled,
            Value::Bool(true) => Setting::Enabled,
            Value::Object(_) => match serde_json::from_value::<RouteOverlay>(value.clone()) {
                Ok(overlay) => Setting::Configured(overlay),
                Err(e) => {
                    tracing::warn!(at = %at, error = %e, "malformed route overlay; enabling without it");
                    Setting::Enabled
                }
            },
            other => {
                tracing::warn!(at = %at, value = %other, "non-boolean, non-object flag; treating as enabled");
                Setting::Enabled
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Setting::Disabled)
    }

    pub fn merge(base: &Setting, over: &Setting) -> Setting {
        match (base, over) {
            (Setting::Configured(b), Setting::Configured(o)) => Setting::Configured(b.merged(o)),
            (_, o) => o.clone(),
        }
    }
}

/// `false` / `true` / nested table.
#[derive(Clone, Debug, PartialEq)]
pub enum Branch<T> {
    Disabled,
    Enabled,
    Nested(T),
}

impl<T> Branch<T> {
    fn from_value(value: &Value, at: &str, nested: impl FnOnce(&Map<String, Value>, &str) -> T) -> Self {
        match value {
            Value::Bool(false) => Branch::Disabled,
            Value::Object(map) => Branch::Nested(nested(map, at)),
            Value::Bool(true) => Branch::Enabled,
            other => {
                tracing::warn!(at = %at, value = %other, "non-boolean, non-object branch; treating as enabled");
                Branch::Enabled
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Branch::Disabled)
    }

    pub fn nested(&self) -> Option<&T> {
        match self {
            Branch::Nested(t) => Some(t),
            _ => None,
        }
    }
}

impl<T: Clone> Branch<T> {
    fn merge(base: &Branch<T>, over: &Branch<T>, nested: impl FnOnce(&T, &T) -> T) -> Branch<T> {
        match (base, over) {
            (Branch::Nested(b), Branch::Nested(o)) => Branch::Nested(nested(b, o)),
            (_, o) => o.clone(),
        }
    }
}

fn merge_opt<T: Clone>(base: &Option<T>, over: &Option<T>, merge: impl FnOnce(&T, &T) -> T) -> Option<T> {
    match (base, over) {
        (Some(b), Some(o)) => Some(merge(b, o)),
        (None, Some(o)) => Some(o.clone()),
        (b, None) => b.clone(),
    }
}

fn merge_settings(base: &IndexMap<Action, Setting>, over: &IndexMap<Action, Setting>) -> IndexMap<Action, Setting> {
    let mut out = base.clone();
    for (action, setting) in over {
        let merged = match out.get(action) {
            Some(b) => Setting::merge(b, setting),
            None => setting.clone(),
        };
        out.insert(*action, merged);
    }
    out
}

/// `{ "*": flag, <method>: flag }`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MethodTable {
    pub all: Option<Setting>,
    pub methods: IndexMap<Action, Setting>,
}

impl MethodTable {
    fn from_map(map: &Map<String, Value>, at: &str) -> MethodTable {
        let mut table = MethodTable::default();
        for (key, value) in map {
            let here = format!("{}.{}", at, key);
            if key == "*" {
                table.all = Some(Setting::from_value(value, &here));
            } else if let Some(action) = Action::from_key(key) {
                table.methods.insert(action, Setting::from_value(value, &here));
            } else {
                tracing::warn!(at = %here, "unknown route method key; ignored");
            }
        }
        table
    }

    pub fn get(&self, action: Action) -> Option<&Setting> {
        self.methods.get(&action)
    }

    pub fn merge(base: &MethodTable, over: &MethodTable) -> MethodTable {
        MethodTable {
            all: merge_opt(&base.all, &over.all, Setting::merge),
            methods: merge_settings(&base.methods, &over.methods),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssociationsOverride {
    /// `associations['*']`
    pub all: Option<Branch<MethodTable>>,
    pub by_name: IndexMap<String, Branch<MethodTable>>,
}

impl AssociationsOverride {
    fn from_map(map: &Map<String, Value>, at: &str) -> AssociationsOverride {
        let mut out = AssociationsOverride::default();
        for (key, value) in map {
            let here = format!("{}.{}", at, key);
            let branch = Branch::from_value(value, &here, MethodTable::from_map);
            if key == "*" {
                out.all = Some(branch);
            } else {
                out.by_name.insert(key.clone(), branch);
            }
        }
        out
    }

    pub fn merge(base: &AssociationsOverride, over: &AssociationsOverride) -> AssociationsOverride {
        let mut by_name = base.by_name.clone();
        for (name, branch) in &over.by_name {
            let merged = match by_name.get(name) {
                Some(b) => Branch::merge(b, branch, MethodTable::merge),
                None => branch.clone(),
            };
            by_name.insert(name.clone(), merged);
        }
        AssociationsOverride {
            all: merge_opt(&base.all, &over.all, |b, o| Branch::merge(b, o, MethodTable::merge)),
            by_name,
        }
    }
}

/// Raw override for one model (or the `_default` wildcard).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControllerOverride {
    /// Top-level `'*'`.
    pub all: Option<Branch<MethodTable>>,
    /// CRUD method flags.
    pub methods: IndexMap<Action, Setting>,
    pub associations: Option<Branch<AssociationsOverride>>,
}

impl ControllerOverride {
    pub fn from_value(value: &Value) -> Result<ControllerOverride, String> {
        let map = value
            .as_object()
            .ok_or_else(|| format!("override must be a JSON object, got {}", json_type(value)))?;
        let mut out = ControllerOverride::default();
        for (key, value) in map {
            match key.as_str() {
                "*" => out.all = Some(Branch::from_value(value, "*", MethodTable::from_map)),
                "associations" => {
                    out.associations = Some(Branch::from_value(
                        value,
                        "associations",
                        AssociationsOverride::from_map,
                    ))
                }
                other => match Action::from_key(other) {
                    Some(action) => {
                        out.methods.insert(action, Setting::from_value(value, other));
                    }
                    None => tracing::warn!(key = %other, "unknown override key; ignored"),
                },
            }
        }
        Ok(out)
    }

    /// Apply `over` on top of `self`.
    pub fn merge(&self, over: &ControllerOverride) -> ControllerOverride {
        ControllerOverride {
            all: merge_opt(&self.all, &over.all, |b, o| Branch::merge(b, o, MethodTable::merge)),
            methods: merge_settings(&self.methods, &over.methods),
            associations: merge_opt(&self.associations, &over.associations, |b, o| {
                Branch::merge(b, o, AssociationsOverride::merge)
            }),
        }
    }
}

impl<'de> Deserialize<'de> for ControllerOverride {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        ControllerOverride::from_value(&v).map_err(serde::de::Error::custom)
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_flags_overlays_and_branches() {
        let o = ControllerOverride::from_value(&json!({
            "destroy": false,
            "count": { "handler": "nullCount", "config": { "auth": "token" } },
            "associations": { "tags": { "destroyMany": false }, "products": false }
        }))
        .unwrap();

        assert_eq!(o.methods.get(&Action::Destroy), Some(&Setting::Disabled));
        match o.methods.get(&Action::Count) {
            Some(Setting::Configured(overlay)) => {
                assert_eq!(overlay.handler.as_deref(), Some("nullCount"));
                assert_eq!(overlay.config.auth, Some(AuthSetting::Strategy("token".into())));
            }
            other => panic!("expected overlay, got {:?}", other),
        }
        let assoc = o.associations.as_ref().and_then(|a| a.nested()).unwrap();
        assert_eq!(assoc.by_name.get("products"), Some(&Branch::Disabled));
        let tags = assoc.by_name.get("tags").and_then(|b| b.nested()).unwrap();
        assert_eq!(tags.get(Action::DestroyMany), Some(&Setting::Disabled));
    }

    #[test]
    fn malformed_flags_enable_without_overlay() {
        let o = ControllerOverride::from_value(&json!({ "get": 3, "index": "yes", "update": { "path": 5 } })).unwrap();
        assert_eq!(o.methods.get(&Action::Get), Some(&Setting::Enabled));
        assert_eq!(o.methods.get(&Action::Index), Some(&Setting::Enabled));
        assert_eq!(o.methods.get(&Action::Update), Some(&Setting::Enabled));
    }

    #[test]
    fn non_object_override_is_rejected() {
        assert!(ControllerOverride::from_value(&json!([1, 2])).is_err());
        assert!(serde_json::from_str::<ControllerOverride>("false").is_err());
    }

    #[test]
    fn merge_override_wins_and_nested_objects_merge() {
        let base = ControllerOverride::from_value(&json!({
            "destroy": false,
            "count": { "config": { "description": "base", "tags": ["api"] } },
            "associations": { "*": { "destroy": false } }
        }))
        .unwrap();
        let over = ControllerOverride::from_value(&json!({
            "destroy": true,
            "count": { "handler": "custom" },
            "associations": { "*": { "count": false } }
        }))
        .unwrap();

        let merged = base.merge(&over);
        assert_eq!(merged.methods.get(&Action::Destroy), Some(&Setting::Enabled));
        match merged.methods.get(&Action::Count) {
            Some(Setting::Configured(overlay)) => {
                assert_eq!(overlay.handler.as_deref(), Some("custom"));
                assert_eq!(overlay.config.description.as_deref(), Some("base"));
                assert_eq!(overlay.config.tags, vec!["api".to_string()]);
            }
            other => panic!("expected merged overlay, got {:?}", other),
        }
        let wildcard = merged
            .associations
            .as_ref()
            .and_then(|a| a.nested())
            .and_then(|a| a.all.as_ref())
            .and_then(|b| b.nested())
            .unwrap();
        assert_eq!(wildcard.get(Action::Destroy), Some(&Setting::Disabled));
        assert_eq!(wildcard.get(Action::Count), Some(&Setting::Disabled));
    }

    #[test]
    fn json_merge_is_recursive() {
        let merged = merge_json(
            &json!({ "a": { "b": 1, "c": [1] }, "d": true }),
            &json!({ "a": { "c": [2], "e": "x" } }),
        );
        assert_eq!(merged, json!({ "a": { "b": 1, "c": [2], "e": "x" }, "d": true }));
    }
}
