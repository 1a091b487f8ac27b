//! Relationship routes of one association edge, shaped by its cardinality.

use super::spec::{
    include_names, join_path, relation_accessor, route, BuildContext, DisplayNames, Operation, ParamRules, RouteSpec,
    Validation,
};
use crate::config::{Action, AssociationDef, Cardinality, EffectiveAssociationOptions, ModelDef};
use crate::query::{IdList, QueryRules};
use axum::http::Method;
use std::sync::Arc;

/// Route methods of a relation family.
pub fn family_actions(assoc: &AssociationDef) -> &'static [Action] {
    match assoc.kind.cardinality() {
        Cardinality::One => &Action::ONE_TO_ONE,
        Cardinality::Many => &Action::ONE_TO_MANY,
    }
}

/// Routes for every enabled method of the association `assoc` on `source`.
pub fn build_association_routes(
    ctx: BuildContext<'_>,
    source: &Arc<ModelDef>,
    assoc: &AssociationDef,
    effective: &EffectiveAssociationOptions,
) -> Vec<RouteSpec> {
    let case = ctx.case();
    let src = DisplayNames::of_model(source, case);
    let rel_names = DisplayNames::of_association(assoc, case);
    let rel = rel_names.relation(assoc.kind);
    let prefix = ctx.options.prefix.as_str();
    let base = [src.plural.as_str(), "{id}", rel];
    let with_aid = [src.plural.as_str(), "{id}", rel, "{aid}"];

    let include = ctx
        .graph
        .get(&assoc.target)
        .map(|target| include_names(ctx.graph, target))
        .unwrap_or_default();
    let source_id = ParamRules {
        id: true,
        ..Default::default()
    };
    let both_ids = ParamRules {
        id: true,
        aid: true,
        ..Default::default()
    };
    let one = assoc.kind.cardinality() == Cardinality::One;

    let mut routes = Vec::new();
    for &action in family_actions(assoc) {
        let Some(overlay) = effective.method(action).overlay().cloned() else {
            continue;
        };
        let Some(accessor) = relation_accessor(assoc.kind, action) else {
            continue;
        };
        let (method, path, validation) = match (action, one) {
            (Action::Index, _) => (
                Method::GET,
                join_path(prefix, &base),
                Validation {
                    params: source_id.clone(),
                    query: QueryRules {
                        strict: true,
                        filter: !one,
                        paging: !one,
                        include: include.clone(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ),
            (Action::Create, _) => (
                Method::POST,
                join_path(prefix, &base),
                Validation {
                    params: source_id.clone(),
                    body: true,
                    ..Default::default()
                },
            ),
            (Action::Update, _) => (
                Method::PUT,
                join_path(prefix, &with_aid),
                Validation {
                    params: both_ids.clone(),
                    ..Default::default()
                },
            ),
            (Action::Destroy, true) => (
                Method::DELETE,
                join_path(prefix, &base),
                Validation {
                    params: source_id.clone(),
                    ..Default::default()
                },
            ),
            (Action::Destroy, false) => (
                Method::DELETE,
                join_path(prefix, &with_aid),
                Validation {
                    params: both_ids.clone(),
                    ..Default::default()
                },
            ),
            (Action::UpdateMany, _) => (
                Method::PUT,
                join_path(prefix, &base),
                Validation {
                    params: source_id.clone(),
                    query: QueryRules {
                        strict: true,
                        ids: IdList::Required,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ),
            (Action::DestroyMany, _) => (
                Method::DELETE,
                join_path(prefix, &base),
                Validation {
                    params: source_id.clone(),
                    query: QueryRules {
                        strict: true,
                        ids: IdList::Optional,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ),
            (Action::Count, _) => (
                Method::GET,
                join_path(prefix, &[src.plural.as_str(), "{id}", rel, "count"]),
                Validation {
                    params: source_id.clone(),
                    query: QueryRules {
                        strict: true,
                        filter: true,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ),
            (Action::Get | Action::Scope, _) => continue,
        };
        let operation = Operation::Relation { action, accessor };
        routes.push(route(method, path, source, Some(assoc), operation, validation, &overlay));
    }
    routes
}
