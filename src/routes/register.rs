//! Registration: walk the model graph once and fill the route table, model by model.

use super::association::{build_association_routes, family_actions};
use super::crud::build_crud_routes;
use super::spec::{BuildContext, RouteSpec};
use super::table::{BoundRoute, RouteTable};
use crate::config::{ModelGraph, OptionResolver, PluginOptions};
use crate::error::ConfigError;
use crate::extensions::Extensions;
use crate::state::AppState;
use axum::Router;

/// Everything registration reads besides the model graph.
#[derive(Clone, Copy)]
pub struct RegistrationContext<'a> {
    pub options: &'a PluginOptions,
    pub resolver: &'a OptionResolver,
    pub extensions: &'a Extensions,
}

/// Final state of one model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelState {
    CrudRegistered,
    AssociationsRegistered,
    Skipped(String),
    /// CRUD routes collided with already registered routes.
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssociationState {
    /// Number of routes added.
    Registered(usize),
    Disabled,
    /// Route collision; the edge was skipped.
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelReport {
    pub model: String,
    pub state: ModelState,
    pub routes: usize,
    /// Association key -> outcome.
    pub associations: Vec<(String, AssociationState)>,
}

#[derive(Debug)]
pub struct Registration {
    pub routes: RouteTable,
    pub report: Vec<ModelReport>,
}

impl Registration {
    pub fn route_strings(&self) -> Vec<String> {
        self.routes.route_strings()
    }

    pub fn model(&self, name: &str) -> Option<&ModelReport> {
        self.report.iter().find(|r| r.model == name)
    }

    pub fn into_router(self, state: AppState, body_limit: usize) -> Router {
        self.routes.into_router(state, body_limit)
    }
}

/// Resolve the overlay's handler, pre hooks and auth strategy. Unknown names are fatal.
fn bind(spec: RouteSpec, ctx: RegistrationContext<'_>) -> Result<BoundRoute, ConfigError> {
    let label = spec.label();
    let overlay = &spec.overlay;
    let handler = overlay
        .handler
        .as_deref()
        .map(|name| ctx.extensions.handler(name, &label))
        .transpose()?;
    let pre = overlay
        .config
        .pre
        .iter()
        .map(|step| ctx.extensions.pre(&step.method, &label).map(|hook| (hook, step.assign)))
        .collect::<Result<Vec<_>, _>>()?;
    let auth_setting = overlay.config.auth.as_ref().unwrap_or(&ctx.options.auth);
    let auth = auth_setting
        .strategy()
        .map(|strategy| ctx.extensions.authenticator(strategy, &label))
        .transpose()?;
    Ok(BoundRoute {
        spec,
        handler,
        pre,
        auth,
    })
}

fn bind_all(specs: Vec<RouteSpec>, ctx: RegistrationContext<'_>) -> Result<Vec<BoundRoute>, ConfigError> {
    specs.into_iter().map(|spec| bind(spec, ctx)).collect()
}

/// Insert a group; a route conflict is reported, anything else aborts registration.
fn insert_group(table: &mut RouteTable, group: Vec<BoundRoute>) -> Result<Result<usize, String>, ConfigError> {
    match table.insert_all(group) {
        Ok(n) => Ok(Ok(n)),
        Err(e @ ConfigError::RouteConflict { .. }) => Ok(Err(e.to_string())),
        Err(e) => Err(e),
    }
}

/// Build CRUD then association routes for every exposed model.
pub fn register_all(graph: &ModelGraph, ctx: RegistrationContext<'_>) -> Result<Registration, ConfigError> {
    let build = BuildContext {
        graph,
        options: ctx.options,
    };
    let mut table = RouteTable::new();
    let mut report = Vec::with_capacity(graph.len());

    for model in graph.models() {
        let name = model.name.clone();
        let skipped = |reason: &str| ModelReport {
            model: model.name.clone(),
            state: ModelState::Skipped(reason.to_string()),
            routes: 0,
            associations: Vec::new(),
        };
        if ctx.options.private.contains(&name) {
            tracing::debug!(model = %name, "private model skipped");
            report.push(skipped("private"));
            continue;
        }
        if model.is_join_model() {
            tracing::debug!(model = %name, "join model skipped");
            report.push(skipped("join model"));
            continue;
        }
        let effective = ctx.resolver.resolve(&name);
        if !effective.enabled {
            tracing::debug!(model = %name, "model disabled by override");
            report.push(skipped("disabled"));
            continue;
        }

        let crud = bind_all(build_crud_routes(build, model, &effective), ctx)?;
        let mut routes = match insert_group(&mut table, crud)? {
            Ok(n) => n,
            Err(conflict) => {
                tracing::warn!(model = %name, error = %conflict, "CRUD routes conflict; model skipped");
                report.push(ModelReport {
                    model: name,
                    state: ModelState::Failed(conflict),
                    routes: 0,
                    associations: Vec::new(),
                });
                continue;
            }
        };
        let mut state = ModelState::CrudRegistered;
        let mut associations = Vec::new();

        if effective.associations_enabled {
            for assoc in &model.associations {
                if !effective.association_enabled(&assoc.key) {
                    associations.push((assoc.key.clone(), AssociationState::Disabled));
                    continue;
                }
                let options = effective.association(&assoc.key, family_actions(assoc));
                let group = bind_all(build_association_routes(build, model, assoc, &options), ctx)?;
                let outcome = match insert_group(&mut table, group)? {
                    Ok(n) => {
                        routes += n;
                        AssociationState::Registered(n)
                    }
                    Err(conflict) => {
                        tracing::warn!(model = %name, association = %assoc.key, error = %conflict, "association routes conflict; association skipped");
                        AssociationState::Failed(conflict)
                    }
                };
                associations.push((assoc.key.clone(), outcome));
            }
            state = ModelState::AssociationsRegistered;
        } else {
            associations.extend(model.associations.iter().map(|a| (a.key.clone(), AssociationState::Disabled)));
        }

        tracing::info!(model = %name, routes, state = ?state, "registered model routes");
        report.push(ModelReport {
            model: name,
            state,
            routes,
            associations,
        });
    }

    tracing::info!(models = report.len(), routes = table.len(), "route registration complete");
    Ok(Registration { routes: table, report })
}
