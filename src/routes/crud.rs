//! CRUD routes of one model: list, get, scope, create, update, destroy, count.

use super::spec::{include_names, join_path, route, BuildContext, DisplayNames, Operation, ParamRules, RouteSpec, Validation};
use crate::config::{Action, EffectiveOptions, ModelDef};
use crate::query::QueryRules;
use axum::http::Method;
use std::sync::Arc;

/// Routes for every enabled CRUD method of `model`. Disabled methods produce no route at all.
pub fn build_crud_routes(ctx: BuildContext<'_>, model: &Arc<ModelDef>, effective: &EffectiveOptions) -> Vec<RouteSpec> {
    let names = DisplayNames::of_model(model, ctx.case());
    let plural = names.plural.as_str();
    let include = include_names(ctx.graph, model);
    let listing = QueryRules {
        strict: true,
        filter: true,
        paging: true,
        include: include.clone(),
        ..Default::default()
    };
    let by_id = ParamRules {
        id: true,
        ..Default::default()
    };

    let mut routes = Vec::new();
    for action in Action::CRUD {
        let Some(overlay) = effective.crud(action).overlay().cloned() else {
            continue;
        };
        let (method, path, validation) = match action {
            Action::Index => (
                Method::GET,
                join_path(&ctx.options.prefix, &[plural]),
                Validation {
                    query: listing.clone(),
                    ..Default::default()
                },
            ),
            Action::Get => (
                Method::GET,
                join_path(&ctx.options.prefix, &[plural, "{id}"]),
                Validation {
                    params: by_id.clone(),
                    query: QueryRules {
                        strict: true,
                        include: include.clone(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ),
            Action::Scope => {
                if model.scopes.is_empty() {
                    continue;
                }
                (
                    Method::GET,
                    join_path(&ctx.options.prefix, &[plural, ctx.options.scope_prefix.as_str(), "{scope}"]),
                    Validation {
                        params: ParamRules {
                            scopes: Some(model.scope_names()),
                            ..Default::default()
                        },
                        query: listing.clone(),
                        ..Default::default()
                    },
                )
            }
            Action::Create => (
                Method::POST,
                join_path(&ctx.options.prefix, &[plural]),
                Validation {
                    body: true,
                    ..Default::default()
                },
            ),
            Action::Update => (
                Method::PUT,
                join_path(&ctx.options.prefix, &[plural, "{id}"]),
                Validation {
                    params: by_id.clone(),
                    body: true,
                    ..Default::default()
                },
            ),
            Action::Destroy => (
                Method::DELETE,
                join_path(&ctx.options.prefix, &[plural, "{id}"]),
                Validation {
                    params: by_id.clone(),
                    ..Default::default()
                },
            ),
            Action::Count => (
                Method::GET,
                join_path(&ctx.options.prefix, &[plural, "count"]),
                Validation {
                    query: QueryRules {
                        strict: true,
                        filter: true,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ),
            Action::UpdateMany | Action::DestroyMany => continue,
        };
        routes.push(route(method, path, model, None, Operation::Crud(action), validation, &overlay));
    }
    routes
}
