//! Built-in association operations: resolve the source, then invoke the route's accessor.

use super::Prepared;
use crate::config::Action;
use crate::error::AppError;
use crate::response;
use crate::routes::RouteSpec;
use crate::state::AppState;
use crate::store::{Accessor, AccessorCall, FindOptions};
use axum::response::Response;

pub(super) async fn serve(
    state: &AppState,
    spec: &RouteSpec,
    action: Action,
    accessor: Accessor,
    mut req: Prepared,
) -> Result<Response, AppError> {
    let model = spec.model.as_ref();
    let association = spec
        .association
        .as_ref()
        .ok_or_else(|| AppError::NotFound(spec.label()))?;
    // Pre-hook scopes narrow the source lookup; the target query is unscoped.
    let source_options = FindOptions {
        scopes: std::mem::take(&mut req.scopes),
        ..Default::default()
    };
    let source = req.instance(state, model, &source_options).await?;

    let aid = || {
        req.aid
            .ok_or_else(|| AppError::BadRequest("path parameter 'aid' is required".into()))
    };
    let call = match accessor {
        Accessor::Get => AccessorCall::Get(req.find_options()),
        Accessor::Count => AccessorCall::Count(FindOptions {
            where_: req.query.where_.clone(),
            ..Default::default()
        }),
        Accessor::Create => AccessorCall::Create(std::mem::take(&mut req.body)),
        Accessor::Set if action == Action::Update => AccessorCall::Set(vec![aid()?]),
        Accessor::Set => AccessorCall::Set(Vec::new()),
        Accessor::Add => AccessorCall::Add(aid()?),
        Accessor::AddMany => AccessorCall::AddMany(req.query.ids.clone().unwrap_or_default()),
        Accessor::Remove => AccessorCall::Remove(aid()?),
        // No ids clears the whole relation.
        Accessor::RemoveMany => match req.query.ids.clone() {
            Some(ids) => AccessorCall::RemoveMany(ids),
            None => AccessorCall::Set(Vec::new()),
        },
    };

    tracing::debug!(route = %spec.label(), accessor = call.accessor().name(), "association call");
    let output = state.store.relation(model, &source, association, call).await?;
    let body = output.into_json();
    Ok(if accessor == Accessor::Create {
        response::created(body)
    } else {
        response::ok(body)
    })
}
