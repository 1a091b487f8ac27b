//! Named extension points that route overlays refer to: custom handlers, pre hooks, authenticators.

use crate::config::{AssociationDef, ModelDef};
use crate::error::{AppError, ConfigError};
use crate::state::AppState;
use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What an extension sees of the request being served.
#[derive(Clone, Debug)]
pub struct RouteRequest {
    pub method: Method,
    /// Registered path template.
    pub path: String,
    pub model: Arc<ModelDef>,
    pub association: Option<AssociationDef>,
    /// Path parameters by name (`id`, `aid`, `scope`).
    pub params: HashMap<String, String>,
    pub raw_query: Option<String>,
    pub headers: HeaderMap,
    /// Parsed JSON body; `Value::Null` when the request has none.
    pub body: Value,
}

/// Replaces the built-in behavior of a route. The returned value is the response body.
#[async_trait]
pub trait CustomHandler: Send + Sync {
    async fn handle(&self, state: &AppState, request: &RouteRequest) -> Result<Value, AppError>;
}

/// Runs before the route handler; its value is assigned as the route's instance or scope.
#[async_trait]
pub trait PreHandler: Send + Sync {
    async fn run(&self, state: &AppState, request: &RouteRequest) -> Result<Value, AppError>;
}

/// Decides whether a request may reach a route that requires auth.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<(), AppError>;
}

/// Accepts `Authorization: Bearer <token>` for any of the configured tokens.
#[derive(Clone, Debug, Default)]
pub struct BearerTokenAuth {
    tokens: HashSet<String>,
}

impl BearerTokenAuth {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BearerTokenAuth {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuth {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let authz = headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("missing authorization header".into()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("invalid authorization header".into()))?;
        let token = authz
            .strip_prefix("Bearer ")
            .or_else(|| authz.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Unauthorized("unsupported authorization scheme".into()))?
            .trim();
        if self.tokens.contains(token) {
            Ok(())
        } else {
            Err(AppError::Unauthorized("invalid token".into()))
        }
    }
}

/// Extensions by name. Lookups fail at registration time, never per request.
#[derive(Clone, Default)]
pub struct Extensions {
    handlers: HashMap<String, Arc<dyn CustomHandler>>,
    pre: HashMap<String, Arc<dyn PreHandler>>,
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, name: &str, handler: impl CustomHandler + 'static) -> Self {
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn with_pre(mut self, name: &str, hook: impl PreHandler + 'static) -> Self {
        self.pre.insert(name.to_string(), Arc::new(hook));
        self
    }

    /// Register the authenticator for a strategy; `true` auth settings use strategy `default`.
    pub fn with_authenticator(mut self, strategy: &str, auth: impl Authenticator + 'static) -> Self {
        self.authenticators.insert(strategy.to_string(), Arc::new(auth));
        self
    }

    pub fn handler(&self, name: &str, route: &str) -> Result<Arc<dyn CustomHandler>, ConfigError> {
        self.handlers.get(name).cloned().ok_or_else(|| unknown("handler", name, route))
    }

    pub fn pre(&self, name: &str, route: &str) -> Result<Arc<dyn PreHandler>, ConfigError> {
        self.pre.get(name).cloned().ok_or_else(|| unknown("pre handler", name, route))
    }

    pub fn authenticator(&self, strategy: &str, route: &str) -> Result<Arc<dyn Authenticator>, ConfigError> {
        self.authenticators
            .get(strategy)
            .cloned()
            .ok_or_else(|| unknown("auth strategy", strategy, route))
    }
}

fn unknown(kind: &'static str, name: &str, route: &str) -> ConfigError {
    ConfigError::UnknownExtension {
        kind,
        name: name.to_string(),
        route: route.to_string(),
    }
}
