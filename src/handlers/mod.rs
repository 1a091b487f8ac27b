//! Request pipeline of generated routes: auth, validation, pre hooks, then the route's operation.

mod association;
mod crud;

use crate::config::{ModelDef, PreAssign};
use crate::error::AppError;
use crate::extensions::RouteRequest;
use crate::query::{parse_id, parse_query, prepare_scopes, QueryDescriptor};
use crate::response;
use crate::routes::{BoundRoute, Operation};
use crate::state::AppState;
use crate::store::FindOptions;
use axum::{
    body::Bytes,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A validated request, ready for a built-in operation.
#[derive(Debug, Default)]
pub(crate) struct Prepared {
    pub id: Option<i64>,
    pub aid: Option<i64>,
    pub scopes: Vec<String>,
    pub query: QueryDescriptor,
    /// Whether `offset`/`limit` apply to this route.
    pub paged: bool,
    pub body: Map<String, Value>,
    /// Instance supplied by a pre hook; used instead of loading by id.
    pub instance: Option<Value>,
}

impl Prepared {
    pub fn find_options(&self) -> FindOptions {
        FindOptions {
            scopes: self.scopes.clone(),
            where_: self.query.where_.clone(),
            offset: self.paged.then_some(self.query.offset),
            limit: self.paged.then_some(self.query.limit),
            include: self.query.include.clone(),
        }
    }

    /// The route's instance: pre-resolved, or loaded by `id` under `options`. Missing is a 404.
    pub async fn instance(&self, state: &AppState, model: &ModelDef, options: &FindOptions) -> Result<Value, AppError> {
        if let Some(instance) = &self.instance {
            return Ok(instance.clone());
        }
        let id = self
            .id
            .ok_or_else(|| AppError::BadRequest("path parameter 'id' is required".into()))?;
        state
            .store
            .find_by_id(model, id, options)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", model.name, id)))
    }
}

fn path_id(params: &HashMap<String, String>, name: &str) -> Result<i64, AppError> {
    let raw = params
        .get(name)
        .ok_or_else(|| AppError::BadRequest(format!("path parameter '{}' is required", name)))?;
    parse_id(name, raw)
}

/// Request body as a JSON object; an empty body is `{}`.
fn object_body(bytes: &Bytes) -> Result<Map<String, Value>, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::BadRequest("body must be a JSON object".into())),
        Err(e) => Err(AppError::BadRequest(format!("invalid JSON body: {}", e))),
    }
}

/// Serve one request on `route`. Errors render through [`AppError`].
pub async fn dispatch(
    route: &BoundRoute,
    state: AppState,
    params: HashMap<String, String>,
    raw_query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match serve(route, &state, params, raw_query, headers, body).await {
        Ok(r) => r,
        Err(e) => e.into_response(),
    }
}

async fn serve(
    route: &BoundRoute,
    state: &AppState,
    params: HashMap<String, String>,
    raw_query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let spec = &route.spec;
    if let Some(auth) = &route.auth {
        auth.authenticate(&headers).await?;
    }

    let rules = &spec.validation;
    let mut prepared = Prepared {
        paged: rules.query.paging,
        ..Default::default()
    };
    if rules.params.id {
        prepared.id = Some(path_id(&params, "id")?);
    }
    if rules.params.aid {
        prepared.aid = Some(path_id(&params, "aid")?);
    }
    if let Some(allowed) = &rules.params.scopes {
        let scope = params
            .get("scope")
            .ok_or_else(|| AppError::BadRequest("path parameter 'scope' is required".into()))?;
        if !allowed.contains(scope) {
            return Err(AppError::BadRequest(format!("unknown scope '{}'", scope)));
        }
        prepared.scopes.push(scope.clone());
    }
    prepared.query = parse_query(raw_query.as_deref().unwrap_or(""), &rules.query)?;

    let body_value = if rules.body {
        prepared.body = object_body(&body)?;
        Value::Object(prepared.body.clone())
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };

    let request = RouteRequest {
        method: spec.method.clone(),
        path: spec.path.clone(),
        model: spec.model.clone(),
        association: spec.association.clone(),
        params,
        raw_query,
        headers,
        body: body_value,
    };

    for (hook, assign) in &route.pre {
        let value = hook.run(state, &request).await?;
        match assign {
            PreAssign::Model if !value.is_null() => prepared.instance = Some(value),
            PreAssign::Model => {}
            PreAssign::Scope => prepared.scopes.extend(prepare_scopes(&value)),
        }
    }

    if let Some(handler) = &route.handler {
        tracing::debug!(route = %spec.label(), "custom handler");
        let value = handler.handle(state, &request).await?;
        return Ok(response::ok(value));
    }

    match spec.operation {
        Operation::Crud(action) => crud::serve(state, spec, action, prepared).await,
        Operation::Relation { action, accessor } => association::serve(state, spec, action, accessor, prepared).await,
    }
}
