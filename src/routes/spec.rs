//! Route definitions produced by the builders: method, path template, operation, validation, overlay.

use crate::case::NameCase;
use crate::config::{
    Action, AssociationDef, AssociationKind, Cardinality, ModelDef, ModelGraph, PluginOptions, RouteOverlay,
};
use crate::query::QueryRules;
use crate::store::Accessor;
use axum::http::Method;
use indexmap::IndexMap;
use std::sync::Arc;

/// What a route does when no custom handler replaces it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Crud(Action),
    /// Association route; the accessor is fixed when the route is built.
    Relation { action: Action, accessor: Accessor },
}

impl Operation {
    pub fn action(self) -> Action {
        match self {
            Operation::Crud(a) | Operation::Relation { action: a, .. } => a,
        }
    }
}

/// Accessor behind an association route, by relation family.
pub fn relation_accessor(kind: AssociationKind, action: Action) -> Option<Accessor> {
    let accessor = match (kind.cardinality(), action) {
        (_, Action::Index) => Accessor::Get,
        (_, Action::Create) => Accessor::Create,
        (Cardinality::One, Action::Update | Action::Destroy) => Accessor::Set,
        (Cardinality::Many, Action::Update) => Accessor::Add,
        (Cardinality::Many, Action::UpdateMany) => Accessor::AddMany,
        (Cardinality::Many, Action::Destroy) => Accessor::Remove,
        (Cardinality::Many, Action::DestroyMany) => Accessor::RemoveMany,
        (Cardinality::Many, Action::Count) => Accessor::Count,
        _ => return None,
    };
    Some(accessor)
}

/// Path parameter rules. Ids are positive integers; `scope` must name a live scope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamRules {
    pub id: bool,
    pub aid: bool,
    pub scopes: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Validation {
    pub params: ParamRules,
    pub query: QueryRules,
    /// Route reads a JSON object body.
    pub body: bool,
}

#[derive(Clone, Debug)]
pub struct RouteSpec {
    pub method: Method,
    /// Template with `{id}`, `{aid}` and `{scope}` parameters.
    pub path: String,
    pub model: Arc<ModelDef>,
    pub association: Option<AssociationDef>,
    pub operation: Operation,
    pub validation: Validation,
    pub overlay: RouteOverlay,
}

impl RouteSpec {
    /// `"METHOD /path"`, used in logs and errors.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Inputs shared by the route builders.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub graph: &'a ModelGraph,
    pub options: &'a PluginOptions,
}

impl BuildContext<'_> {
    pub fn case(&self) -> NameCase {
        NameCase::from_snake_flag(self.options.snake_case)
    }
}

/// Names used in paths, after optional snake-casing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayNames {
    pub singular: String,
    pub plural: String,
}

impl DisplayNames {
    pub fn of_model(model: &ModelDef, case: NameCase) -> Self {
        DisplayNames {
            singular: case.apply(&model.singular),
            plural: case.apply(&model.plural),
        }
    }

    pub fn of_association(assoc: &AssociationDef, case: NameCase) -> Self {
        DisplayNames {
            singular: case.apply(&assoc.singular),
            plural: case.apply(&assoc.plural),
        }
    }

    /// Relation segment: singular for one-to-one, plural for one-to-many.
    pub fn relation(&self, kind: AssociationKind) -> &str {
        match kind.cardinality() {
            Cardinality::One => &self.singular,
            Cardinality::Many => &self.plural,
        }
    }
}

/// Accepted `include` names of a model: association keys, plus target model names that are unambiguous.
pub fn include_names(graph: &ModelGraph, model: &ModelDef) -> IndexMap<String, String> {
    let candidates = model
        .associations
        .iter()
        .flat_map(|a| [a.key.clone(), a.target.clone()]);
    let mut out = IndexMap::new();
    for name in candidates {
        if let Some(key) = graph.include_key(model, &name) {
            out.entry(name).or_insert(key);
        }
    }
    out
}

/// Join `prefix` and segments into a path starting with `/`.
pub fn join_path(prefix: &str, segments: &[&str]) -> String {
    let mut path = String::new();
    let prefix = prefix.trim_matches('/');
    if !prefix.is_empty() {
        path.push('/');
        path.push_str(prefix);
    }
    for s in segments {
        path.push('/');
        path.push_str(s);
    }
    path
}

/// Assemble a route; the overlay may replace the generated path.
pub(crate) fn route(
    method: Method,
    path: String,
    model: &Arc<ModelDef>,
    association: Option<&AssociationDef>,
    operation: Operation,
    validation: Validation,
    overlay: &RouteOverlay,
) -> RouteSpec {
    RouteSpec {
        method,
        path: overlay.path.clone().unwrap_or(path),
        model: Arc::clone(model),
        association: association.cloned(),
        operation,
        validation,
        overlay: overlay.clone(),
    }
}
