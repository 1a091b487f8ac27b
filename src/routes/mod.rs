//! Route generation: CRUD and association route specs, the route table, and registration.

pub mod association;
pub mod crud;
pub mod register;
pub mod spec;
pub mod table;

pub use association::{build_association_routes, family_actions};
pub use crud::build_crud_routes;
pub use register::{register_all, AssociationState, ModelReport, ModelState, Registration, RegistrationContext};
pub use spec::{relation_accessor, BuildContext, DisplayNames, Operation, ParamRules, RouteSpec, Validation};
pub use table::{BoundRoute, RouteTable};
