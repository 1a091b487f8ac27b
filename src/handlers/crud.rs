//! Built-in CRUD operations.

use super::Prepared;
use crate::config::Action;
use crate::error::AppError;
use crate::response;
use crate::routes::RouteSpec;
use crate::state::AppState;
use crate::store::FindOptions;
use axum::response::Response;
use serde_json::{json, Value};

pub(super) async fn serve(state: &AppState, spec: &RouteSpec, action: Action, req: Prepared) -> Result<Response, AppError> {
    let model = spec.model.as_ref();
    let store = state.store.as_ref();
    let find = req.find_options();
    // Lookups by id honor scopes and include, never paging.
    let lookup = FindOptions {
        offset: None,
        limit: None,
        ..find.clone()
    };

    match action {
        Action::Index | Action::Scope => {
            let rows = store.find_all(model, &find).await?;
            Ok(response::ok(Value::Array(rows)))
        }
        Action::Get => Ok(response::ok(req.instance(state, model, &lookup).await?)),
        Action::Create => Ok(response::created(store.create(model, req.body).await?)),
        Action::Update => {
            let instance = req.instance(state, model, &lookup).await?;
            Ok(response::ok(store.update(model, &instance, req.body).await?))
        }
        Action::Destroy => {
            let instance = req.instance(state, model, &lookup).await?;
            Ok(response::ok(store.destroy(model, &instance).await?))
        }
        Action::Count => {
            let n = store.count(model, &find).await?;
            Ok(response::ok(json!({ "count": n })))
        }
        Action::UpdateMany | Action::DestroyMany => Err(AppError::NotFound(spec.label())),
    }
}
