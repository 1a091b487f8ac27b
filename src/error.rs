//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while building the model graph, loading overrides, or registering routes.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate model: {0}")]
    DuplicateModel(String),
    #[error("association {model}.{key}: {message}")]
    InvalidAssociation {
        model: String,
        key: String,
        message: String,
    },
    #[error("override file {path}: {message}")]
    InvalidOverride { path: String, message: String },
    #[error("unknown {kind} '{name}' referenced by {route}")]
    UnknownExtension {
        kind: &'static str,
        name: String,
        route: String,
    },
    #[error("route conflict: {method} {path}")]
    RouteConflict { method: String, path: String },
    #[error("glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("config load: {0}")]
    Load(String),
}

/// Errors returned by a [`crate::store::Store`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("unknown attribute '{attribute}' on {model}")]
    UnknownAttribute { model: String, attribute: String },
    #[error("unknown scope '{scope}' on {model}")]
    UnknownScope { model: String, scope: String },
    #[error("unknown association '{key}' on {model}")]
    UnknownAssociation { model: String, key: String },
    #[error("{model} {id} not found")]
    TargetNotFound { model: String, id: i64 },
    #[error("accessor '{accessor}' is not available on {kind:?} associations")]
    UnsupportedAccessor {
        accessor: &'static str,
        kind: crate::config::AssociationKind,
    },
    #[error("instance has no integer id")]
    MissingId,
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(ConfigError::RouteConflict { .. }) => (StatusCode::CONFLICT, "conflict"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Store(e) => match e {
                StoreError::UnknownAttribute { .. }
                | StoreError::UnknownScope { .. }
                | StoreError::UnknownAssociation { .. } => {
                    (StatusCode::BAD_REQUEST, "bad_request")
                }
                StoreError::TargetNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                StoreError::Db(sqlx::Error::RowNotFound) => (StatusCode::NOT_FOUND, "not_found"),
                StoreError::UnknownModel(_)
                | StoreError::UnsupportedAccessor { .. }
                | StoreError::MissingId
                | StoreError::Db(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
                }
            },
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes_map_correctly() {
        let cases = [
            (AppError::NotFound("product 9".into()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("limit".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("no token".into()), StatusCode::UNAUTHORIZED),
            (
                AppError::Store(StoreError::UnknownScope {
                    model: "product".into(),
                    scope: "nope".into(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Store(StoreError::TargetNotFound {
                    model: "tag".into(),
                    id: 4,
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Store(StoreError::Db(sqlx::Error::PoolClosed)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn display_includes_message() {
        let err = AppError::BadRequest("limit must be at most 100".into());
        assert!(err.to_string().contains("limit must be at most 100"));
    }
}
