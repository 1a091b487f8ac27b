//! Model CRUD: REST CRUD and association routes generated from ORM model metadata.

pub mod case;
pub mod config;
pub mod error;
pub mod extensions;
pub mod handlers;
pub mod query;
pub mod response;
pub mod routes;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{
    AssociationDef, AssociationKind, AuthSetting, ControllerOverride, ModelDef, ModelGraph, OptionResolver,
    OverrideRegistry, PluginOptions,
};
pub use error::{AppError, ConfigError, StoreError};
pub use extensions::{Authenticator, BearerTokenAuth, CustomHandler, Extensions, PreHandler, RouteRequest};
pub use query::prepare_scopes;
pub use routes::{register_all, ModelReport, ModelState, Registration, RegistrationContext};
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Store};
