//! ORM collaborator: the operations generated routes call, plus two implementations.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::{AssociationDef, ModelDef, Through, Where};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Options for list/lookup/count queries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    /// Named scopes of the queried model, applied before `where_`.
    pub scopes: Vec<String>,
    pub where_: Where,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    /// Association keys to eager-load onto each result.
    pub include: Vec<String>,
}

/// Relationship operation an association exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Accessor {
    Get,
    Create,
    Add,
    AddMany,
    Remove,
    RemoveMany,
    Set,
    Count,
}

impl Accessor {
    pub fn name(self) -> &'static str {
        match self {
            Accessor::Get => "get",
            Accessor::Create => "create",
            Accessor::Add => "add",
            Accessor::AddMany => "addMany",
            Accessor::Remove => "remove",
            Accessor::RemoveMany => "removeMultiple",
            Accessor::Set => "set",
            Accessor::Count => "count",
        }
    }
}

/// An accessor invocation with its arguments.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessorCall {
    Get(FindOptions),
    Create(Map<String, Value>),
    Add(i64),
    AddMany(Vec<i64>),
    Remove(i64),
    RemoveMany(Vec<i64>),
    /// Replace the relation: `[]` clears it, one id sets a singular relation.
    Set(Vec<i64>),
    Count(FindOptions),
}

impl AccessorCall {
    pub fn accessor(&self) -> Accessor {
        match self {
            AccessorCall::Get(_) => Accessor::Get,
            AccessorCall::Create(_) => Accessor::Create,
            AccessorCall::Add(_) => Accessor::Add,
            AccessorCall::AddMany(_) => Accessor::AddMany,
            AccessorCall::Remove(_) => Accessor::Remove,
            AccessorCall::RemoveMany(_) => Accessor::RemoveMany,
            AccessorCall::Set(_) => Accessor::Set,
            AccessorCall::Count(_) => Accessor::Count,
        }
    }
}

/// Result of an accessor call.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessorOutput {
    /// Singular relation (or a created target); `None` when unset.
    One(Option<Value>),
    Many(Vec<Value>),
    Count(u64),
}

impl AccessorOutput {
    pub fn into_json(self) -> Value {
        match self {
            AccessorOutput::One(v) => v.unwrap_or(Value::Null),
            AccessorOutput::Many(v) => Value::Array(v),
            AccessorOutput::Count(n) => serde_json::json!({ "count": n }),
        }
    }
}

/// Model operations consumed by the generated handlers. Instances are JSON objects with an integer `id`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_all(&self, model: &ModelDef, options: &FindOptions) -> Result<Vec<Value>, StoreError>;

    async fn find_by_id(&self, model: &ModelDef, id: i64, options: &FindOptions) -> Result<Option<Value>, StoreError>;

    async fn count(&self, model: &ModelDef, options: &FindOptions) -> Result<u64, StoreError>;

    async fn create(&self, model: &ModelDef, values: Map<String, Value>) -> Result<Value, StoreError>;

    /// Partial update of a loaded instance; returns the updated instance.
    async fn update(&self, model: &ModelDef, instance: &Value, values: Map<String, Value>) -> Result<Value, StoreError>;

    /// Delete a loaded instance; returns it.
    async fn destroy(&self, model: &ModelDef, instance: &Value) -> Result<Value, StoreError>;

    /// Invoke a relationship accessor on a loaded source instance.
    /// Mutating calls return the relation as it stands afterwards.
    async fn relation(
        &self,
        source_model: &ModelDef,
        source: &Value,
        association: &AssociationDef,
        call: AccessorCall,
    ) -> Result<AccessorOutput, StoreError>;
}

/// Integer `id` of an instance.
pub fn instance_id(instance: &Value) -> Result<i64, StoreError> {
    instance.get("id").and_then(Value::as_i64).ok_or(StoreError::MissingId)
}

/// Junction table of a BelongsToMany association.
pub(crate) fn junction<'a>(source_model: &ModelDef, association: &'a AssociationDef) -> Result<&'a Through, StoreError> {
    association.through.as_ref().ok_or_else(|| StoreError::UnknownAssociation {
        model: source_model.name.clone(),
        key: association.key.clone(),
    })
}

/// Keep only writable columns of `model`; `id` is never written.
pub fn writable_values(model: &ModelDef, values: Map<String, Value>) -> Map<String, Value> {
    values
        .into_iter()
        .filter(|(k, _)| {
            let keep = k != "id" && model.has_column(k);
            if !keep {
                tracing::debug!(model = %model.name, attribute = %k, "dropping unknown attribute");
            }
            keep
        })
        .collect()
}

/// Reject filter keys that are not columns of `model`.
pub fn check_where(model: &ModelDef, where_: &Where) -> Result<(), StoreError> {
    match where_.keys().find(|k| k.as_str() != "id" && !model.has_column(k)) {
        Some(k) => Err(StoreError::UnknownAttribute {
            model: model.name.clone(),
            attribute: k.clone(),
        }),
        None => Ok(()),
    }
}

/// Scope filters followed by the request filter; later keys win.
pub fn effective_where(model: &ModelDef, options: &FindOptions) -> Result<Where, StoreError> {
    check_where(model, &options.where_)?;
    let mut out = Where::new();
    for scope in &options.scopes {
        let filter = model.scopes.get(scope).ok_or_else(|| StoreError::UnknownScope {
            model: model.name.clone(),
            scope: scope.clone(),
        })?;
        out.extend(filter.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    out.extend(options.where_.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product() -> ModelDef {
        let mut scopes = indexmap::IndexMap::new();
        scopes.insert("outOfStock".to_string(), [("inventory".to_string(), json!(0))].into_iter().collect());
        ModelDef {
            name: "product".into(),
            attributes: vec!["name".into(), "inventory".into()],
            columns: vec!["id".into(), "name".into(), "inventory".into()],
            scopes,
            ..Default::default()
        }
    }

    #[test]
    fn scopes_and_filters_combine() {
        let options = FindOptions {
            scopes: vec!["outOfStock".into()],
            where_: [("name".to_string(), json!("x"))].into_iter().collect(),
            ..Default::default()
        };
        let w = effective_where(&product(), &options).unwrap();
        assert_eq!(w.get("inventory"), Some(&json!(0)));
        assert_eq!(w.get("name"), Some(&json!("x")));
    }

    #[test]
    fn unknown_scope_and_attribute_are_errors() {
        let bad_scope = FindOptions {
            scopes: vec!["nope".into()],
            ..Default::default()
        };
        assert!(matches!(effective_where(&product(), &bad_scope), Err(StoreError::UnknownScope { .. })));

        let bad_filter = FindOptions {
            where_: [("secret".to_string(), json!(1))].into_iter().collect(),
            ..Default::default()
        };
        assert!(matches!(effective_where(&product(), &bad_filter), Err(StoreError::UnknownAttribute { .. })));
    }

    #[test]
    fn writable_values_drop_id_and_unknown_columns() {
        let body = json!({ "id": 9, "name": "a", "bogus": true });
        let kept = writable_values(&product(), body.as_object().cloned().unwrap());
        assert_eq!(Value::Object(kept), json!({ "name": "a" }));
    }

    #[test]
    fn count_output_renders_as_object() {
        assert_eq!(AccessorOutput::Count(3).into_json(), json!({ "count": 3 }));
        assert_eq!(AccessorOutput::One(None).into_json(), Value::Null);
    }
}
