//! Registered routes: conflict detection, introspection, and mounting onto axum.

use super::spec::RouteSpec;
use crate::config::PreAssign;
use crate::error::ConfigError;
use crate::extensions::{Authenticator, CustomHandler, PreHandler};
use crate::handlers::dispatch;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method},
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// A route with its overlay's extension names resolved.
pub struct BoundRoute {
    pub spec: RouteSpec,
    pub handler: Option<Arc<dyn CustomHandler>>,
    pub pre: Vec<(Arc<dyn PreHandler>, PreAssign)>,
    pub auth: Option<Arc<dyn Authenticator>>,
}

impl std::fmt::Debug for BoundRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundRoute")
            .field("route", &self.spec.label())
            .field("custom_handler", &self.handler.is_some())
            .field("pre", &self.pre.len())
            .field("auth", &self.auth.is_some())
            .finish()
    }
}

/// Path segment, with parameters reduced to a placeholder and their name.
enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
}

fn segments(path: &str) -> Vec<Segment<'_>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Segment::Param(name)
            } else if let Some(name) = s.strip_prefix(':') {
                Segment::Param(name)
            } else {
                Segment::Static(s)
            }
        })
        .collect()
}

/// Path with parameter names erased, e.g. `/products/{}/tags`.
fn normalized(path: &str) -> String {
    let mut out = String::new();
    for seg in segments(path) {
        out.push('/');
        match seg {
            Segment::Static(s) => out.push_str(s),
            Segment::Param(_) => out.push_str("{}"),
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Axum path syntax: `{id}` becomes `:id`.
fn axum_path(path: &str) -> String {
    let mut out = String::new();
    for seg in segments(path) {
        out.push('/');
        match seg {
            Segment::Static(s) => out.push_str(s),
            Segment::Param(name) => {
                out.push(':');
                out.push_str(name);
            }
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn method_filter(method: &Method) -> Option<MethodFilter> {
    match *method {
        Method::GET => Some(MethodFilter::GET),
        Method::POST => Some(MethodFilter::POST),
        Method::PUT => Some(MethodFilter::PUT),
        Method::PATCH => Some(MethodFilter::PATCH),
        Method::DELETE => Some(MethodFilter::DELETE),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<BoundRoute>>,
    /// (method, normalized path) of every route.
    keys: HashSet<(Method, String)>,
    /// Normalized prefix -> parameter name used right after it.
    params: HashMap<String, String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a group of routes atomically: on the first conflict nothing is inserted.
    pub fn insert_all(&mut self, group: Vec<BoundRoute>) -> Result<usize, ConfigError> {
        let mut keys = HashSet::new();
        let mut params: HashMap<String, String> = HashMap::new();
        for route in &group {
            let spec = &route.spec;
            let conflict = || ConfigError::RouteConflict {
                method: spec.method.to_string(),
                path: spec.path.clone(),
            };
            if method_filter(&spec.method).is_none() {
                return Err(conflict());
            }
            let key = (spec.method.clone(), normalized(&spec.path));
            if self.keys.contains(&key) || !keys.insert(key) {
                return Err(conflict());
            }
            let mut prefix = String::new();
            for seg in segments(&spec.path) {
                match seg {
                    Segment::Static(s) => {
                        prefix.push('/');
                        prefix.push_str(s);
                    }
                    Segment::Param(name) => {
                        let known = self.params.get(&prefix).or_else(|| params.get(&prefix));
                        match known {
                            Some(existing) if existing != name => return Err(conflict()),
                            Some(_) => {}
                            None => {
                                params.insert(prefix.clone(), name.to_string());
                            }
                        }
                        prefix.push_str("/{}");
                    }
                }
            }
        }

        let n = group.len();
        self.keys.extend(keys);
        self.params.extend(params);
        self.routes.extend(group.into_iter().map(Arc::new));
        Ok(n)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteSpec> {
        self.routes.iter().map(|r| &r.spec)
    }

    /// `"{path}|{method}"` for every registered route, in registration order.
    pub fn route_strings(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|r| format!("{}|{}", r.spec.path, r.spec.method))
            .collect()
    }

    /// Mount every route; requests are served by [`dispatch`].
    pub fn into_router(self, state: AppState, body_limit: usize) -> Router {
        let mut by_path: IndexMap<String, MethodRouter<AppState>> = IndexMap::new();
        for route in self.routes {
            let Some(filter) = method_filter(&route.spec.method) else {
                continue;
            };
            let path = axum_path(&route.spec.path);
            let handler = move |State(state): State<AppState>,
                                params: Option<Path<HashMap<String, String>>>,
                                RawQuery(query): RawQuery,
                                headers: HeaderMap,
                                body: Bytes| {
                let route = Arc::clone(&route);
                async move {
                    let params = params.map(|Path(p)| p).unwrap_or_default();
                    dispatch(&route, state, params, query, headers, body).await
                }
            };
            let method_router = match by_path.shift_remove(&path) {
                Some(existing) => existing.on(filter, handler),
                None => on(filter, handler),
            };
            by_path.insert(path, method_router);
        }

        let mut router = Router::new();
        for (path, method_router) in by_path {
            router = router.route(&path, method_router);
        }
        router
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(TraceLayer::new_for_http())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Action, ModelDef, RouteOverlay};
    use crate::routes::{Operation, Validation};

    fn bound(method: Method, path: &str) -> BoundRoute {
        BoundRoute {
            spec: RouteSpec {
                method,
                path: path.to_string(),
                model: Arc::new(ModelDef::default()),
                association: None,
                operation: Operation::Crud(Action::Index),
                validation: Validation::default(),
                overlay: RouteOverlay::default(),
            },
            handler: None,
            pre: Vec::new(),
            auth: None,
        }
    }

    #[test]
    fn paths_convert_to_axum_syntax() {
        assert_eq!(axum_path("/products/{id}/tags/{aid}"), "/products/:id/tags/:aid");
        assert_eq!(normalized("/products/:id/tags"), "/products/{}/tags");
    }

    #[test]
    fn duplicate_method_and_path_conflict() {
        let mut table = RouteTable::new();
        table.insert_all(vec![bound(Method::GET, "/products/{id}")]).unwrap();
        let err = table.insert_all(vec![bound(Method::GET, "/products/{pid}")]);
        assert!(matches!(err, Err(ConfigError::RouteConflict { .. })));
        table.insert_all(vec![bound(Method::DELETE, "/products/{id}")]).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn group_insert_is_atomic() {
        let mut table = RouteTable::new();
        table.insert_all(vec![bound(Method::GET, "/users/{id}/friends")]).unwrap();
        let group = vec![
            bound(Method::POST, "/users/{id}/friends"),
            bound(Method::GET, "/users/{id}/friends"),
        ];
        assert!(table.insert_all(group).is_err());
        assert_eq!(table.route_strings(), vec!["/users/{id}/friends|GET"]);
    }

    #[test]
    fn differing_parameter_names_at_one_position_conflict() {
        let mut table = RouteTable::new();
        table.insert_all(vec![bound(Method::GET, "/products/{id}")]).unwrap();
        assert!(table.insert_all(vec![bound(Method::GET, "/products/{pid}/tags")]).is_err());
        assert!(table.insert_all(vec![bound(Method::GET, "/products/{id}/tags")]).is_ok());
    }
}
