//! In-process store: one table per model (and per junction), rows keyed by id.

use super::{effective_where, instance_id, junction, writable_values, AccessorCall, AccessorOutput, FindOptions, Store};
use crate::config::{AssociationDef, AssociationKind, Cardinality, ModelDef, ModelGraph, Where};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Row = Map<String, Value>;

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Row>,
}

impl Table {
    fn insert(&mut self, mut row: Row) -> Row {
        self.next_id += 1;
        let id = self.next_id;
        row.insert("id".into(), Value::from(id));
        self.rows.insert(id, row.clone());
        row
    }
}

type Tables = HashMap<String, Table>;

/// Store backed by process memory. Used by tests and the demo server.
pub struct MemoryStore {
    graph: Arc<ModelGraph>,
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new(graph: Arc<ModelGraph>) -> Self {
        MemoryStore {
            graph,
            tables: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    fn model(&self, name: &str) -> Result<&ModelDef, StoreError> {
        self.graph
            .get(name)
            .map(|m| m.as_ref())
            .ok_or_else(|| StoreError::UnknownModel(name.to_string()))
    }

    fn new_row(model: &ModelDef, values: Map<String, Value>) -> Row {
        let mut row: Row = model
            .columns
            .iter()
            .filter(|c| c.as_str() != "id")
            .map(|c| (c.clone(), Value::Null))
            .collect();
        row.extend(writable_values(model, values));
        row
    }

    /// Rows of `model` matching `options`, paged, with includes attached.
    fn select(
        &self,
        tables: &Tables,
        model: &ModelDef,
        candidates: impl Iterator<Item = Row>,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let filter = effective_where(model, options)?;
        let offset = options.offset.unwrap_or(0) as usize;
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        candidates
            .filter(|row| matches_where(row, &filter))
            .skip(offset)
            .take(limit)
            .map(|row| self.with_includes(tables, model, row, &options.include))
            .collect()
    }

    fn with_includes(&self, tables: &Tables, model: &ModelDef, mut row: Row, include: &[String]) -> Result<Value, StoreError> {
        for key in include {
            let assoc = model.association(key).ok_or_else(|| StoreError::UnknownAssociation {
                model: model.name.clone(),
                key: key.clone(),
            })?;
            let related = self.related_rows(tables, model, &row, assoc)?;
            let value = match assoc.kind.cardinality() {
                Cardinality::One => related.into_iter().next().map(Value::Object).unwrap_or(Value::Null),
                Cardinality::Many => Value::Array(related.into_iter().map(Value::Object).collect()),
            };
            row.insert(key.clone(), value);
        }
        Ok(Value::Object(row))
    }

    /// Current members of an association, ordered by id.
    fn related_rows(&self, tables: &Tables, source_model: &ModelDef, source: &Row, assoc: &AssociationDef) -> Result<Vec<Row>, StoreError> {
        let target = self.model(&assoc.target)?;
        let Some(target_table) = tables.get(&target.table) else {
            return Ok(Vec::new());
        };
        let sid = source.get("id").and_then(Value::as_i64).ok_or(StoreError::MissingId)?;
        let rows = match assoc.kind {
            AssociationKind::BelongsTo => match source.get(&assoc.foreign_key).and_then(Value::as_i64) {
                Some(tid) => target_table.rows.get(&tid).cloned().into_iter().collect(),
                None => Vec::new(),
            },
            AssociationKind::HasOne | AssociationKind::HasMany => target_table
                .rows
                .values()
                .filter(|r| r.get(&assoc.foreign_key).and_then(Value::as_i64) == Some(sid))
                .cloned()
                .collect(),
            AssociationKind::BelongsToMany => {
                let through = junction(source_model, assoc)?;
                let ids: Vec<i64> = tables
                    .get(&through.table)
                    .map(|j| {
                        j.rows
                            .values()
                            .filter(|r| r.get(&through.source_key).and_then(Value::as_i64) == Some(sid))
                            .filter_map(|r| r.get(&through.target_key).and_then(Value::as_i64))
                            .collect()
                    })
                    .unwrap_or_default();
                target_table
                    .rows
                    .iter()
                    .filter(|(id, _)| ids.contains(id))
                    .map(|(_, r)| r.clone())
                    .collect()
            }
        };
        Ok(rows)
    }

    /// Every id must name an existing target row. Checked before any write so a miss changes nothing.
    fn ensure_targets(&self, tables: &Tables, assoc: &AssociationDef, ids: &[i64]) -> Result<(), StoreError> {
        let target = self.model(&assoc.target)?;
        let rows = tables.get(&target.table);
        match ids.iter().find(|&&tid| !rows.map(|t| t.rows.contains_key(&tid)).unwrap_or(false)) {
            Some(&tid) => Err(StoreError::TargetNotFound {
                model: target.name.clone(),
                id: tid,
            }),
            None => Ok(()),
        }
    }

    fn link(&self, tables: &mut Tables, source_model: &ModelDef, sid: i64, assoc: &AssociationDef, tid: i64) -> Result<(), StoreError> {
        self.ensure_targets(tables, assoc, &[tid])?;
        let target = self.model(&assoc.target)?;
        match assoc.kind {
            AssociationKind::BelongsTo => {
                set_column(tables, &source_model.table, sid, &assoc.foreign_key, Value::from(tid));
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                set_column(tables, &target.table, tid, &assoc.foreign_key, Value::from(sid));
            }
            AssociationKind::BelongsToMany => {
                let through = junction(source_model, assoc)?;
                let junction = tables.entry(through.table.clone()).or_default();
                let present = junction.rows.values().any(|r| {
                    r.get(&through.source_key).and_then(Value::as_i64) == Some(sid)
                        && r.get(&through.target_key).and_then(Value::as_i64) == Some(tid)
                });
                if !present {
                    let mut row = Row::new();
                    row.insert(through.source_key.clone(), Value::from(sid));
                    row.insert(through.target_key.clone(), Value::from(tid));
                    junction.insert(row);
                }
            }
        }
        Ok(())
    }

    /// Remove `tid` from the relation, or every member when `tid` is None.
    fn unlink(&self, tables: &mut Tables, source_model: &ModelDef, sid: i64, assoc: &AssociationDef, tid: Option<i64>) -> Result<(), StoreError> {
        let target = self.model(&assoc.target)?;
        match assoc.kind {
            AssociationKind::BelongsTo => {
                let current = tables
                    .get(&source_model.table)
                    .and_then(|t| t.rows.get(&sid))
                    .and_then(|r| r.get(&assoc.foreign_key))
                    .and_then(Value::as_i64);
                if tid.is_none() || tid == current {
                    set_column(tables, &source_model.table, sid, &assoc.foreign_key, Value::Null);
                }
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                if let Some(table) = tables.get_mut(&target.table) {
                    for (id, row) in table.rows.iter_mut() {
                        let member = row.get(&assoc.foreign_key).and_then(Value::as_i64) == Some(sid);
                        if member && tid.map_or(true, |t| t == *id) {
                            row.insert(assoc.foreign_key.clone(), Value::Null);
                        }
                    }
                }
            }
            AssociationKind::BelongsToMany => {
                let through = junction(source_model, assoc)?;
                if let Some(junction) = tables.get_mut(&through.table) {
                    junction.rows.retain(|_, r| {
                        let member = r.get(&through.source_key).and_then(Value::as_i64) == Some(sid);
                        let target_id = r.get(&through.target_key).and_then(Value::as_i64);
                        !(member && tid.map_or(true, |t| Some(t) == target_id))
                    });
                }
            }
        }
        Ok(())
    }

    /// The relation as the accessor output its cardinality calls for.
    fn current(&self, tables: &Tables, source_model: &ModelDef, sid: i64, assoc: &AssociationDef) -> Result<AccessorOutput, StoreError> {
        let source = load(tables, source_model, sid)?;
        let rows = self.related_rows(tables, source_model, &source, assoc)?;
        Ok(match assoc.kind.cardinality() {
            Cardinality::One => AccessorOutput::One(rows.into_iter().next().map(Value::Object)),
            Cardinality::Many => AccessorOutput::Many(rows.into_iter().map(Value::Object).collect()),
        })
    }
}

fn load(tables: &Tables, model: &ModelDef, id: i64) -> Result<Row, StoreError> {
    tables
        .get(&model.table)
        .and_then(|t| t.rows.get(&id))
        .cloned()
        .ok_or_else(|| StoreError::TargetNotFound {
            model: model.name.clone(),
            id,
        })
}

fn set_column(tables: &mut Tables, table: &str, id: i64, column: &str, value: Value) {
    if let Some(row) = tables.get_mut(table).and_then(|t| t.rows.get_mut(&id)) {
        row.insert(column.to_string(), value);
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

/// Scalars compare by equality, arrays by membership, `null` matches missing or null columns.
fn matches_where(row: &Row, filter: &Where) -> bool {
    filter.iter().all(|(column, expected)| {
        let actual = row.get(column).unwrap_or(&Value::Null);
        match expected {
            Value::Array(items) => items.iter().any(|item| value_eq(actual, item)),
            Value::Null => actual.is_null(),
            _ => value_eq(actual, expected),
        }
    })
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_all(&self, model: &ModelDef, options: &FindOptions) -> Result<Vec<Value>, StoreError> {
        tracing::debug!(model = %model.name, ?options, "find_all");
        let tables = self.read();
        let rows: Vec<Row> = tables
            .get(&model.table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default();
        self.select(&tables, model, rows.into_iter(), options)
    }

    async fn find_by_id(&self, model: &ModelDef, id: i64, options: &FindOptions) -> Result<Option<Value>, StoreError> {
        tracing::debug!(model = %model.name, id, "find_by_id");
        let tables = self.read();
        let row = tables.get(&model.table).and_then(|t| t.rows.get(&id)).cloned();
        let lookup = FindOptions {
            offset: None,
            limit: None,
            ..options.clone()
        };
        Ok(self.select(&tables, model, row.into_iter(), &lookup)?.into_iter().next())
    }

    async fn count(&self, model: &ModelDef, options: &FindOptions) -> Result<u64, StoreError> {
        tracing::debug!(model = %model.name, ?options, "count");
        let filter = effective_where(model, options)?;
        let tables = self.read();
        let n = tables
            .get(&model.table)
            .map(|t| t.rows.values().filter(|r| matches_where(r, &filter)).count())
            .unwrap_or(0);
        Ok(n as u64)
    }

    async fn create(&self, model: &ModelDef, values: Map<String, Value>) -> Result<Value, StoreError> {
        let row = Self::new_row(model, values);
        let mut tables = self.write();
        let created = tables.entry(model.table.clone()).or_default().insert(row);
        tracing::debug!(model = %model.name, id = ?created.get("id"), "create");
        Ok(Value::Object(created))
    }

    async fn update(&self, model: &ModelDef, instance: &Value, values: Map<String, Value>) -> Result<Value, StoreError> {
        let id = instance_id(instance)?;
        tracing::debug!(model = %model.name, id, "update");
        let mut tables = self.write();
        let row = tables
            .get_mut(&model.table)
            .and_then(|t| t.rows.get_mut(&id))
            .ok_or_else(|| StoreError::TargetNotFound {
                model: model.name.clone(),
                id,
            })?;
        row.extend(writable_values(model, values));
        Ok(Value::Object(row.clone()))
    }

    async fn destroy(&self, model: &ModelDef, instance: &Value) -> Result<Value, StoreError> {
        let id = instance_id(instance)?;
        tracing::debug!(model = %model.name, id, "destroy");
        let mut tables = self.write();
        tables
            .get_mut(&model.table)
            .and_then(|t| t.rows.remove(&id))
            .map(Value::Object)
            .ok_or_else(|| StoreError::TargetNotFound {
                model: model.name.clone(),
                id,
            })
    }

    async fn relation(
        &self,
        source_model: &ModelDef,
        source: &Value,
        association: &AssociationDef,
        call: AccessorCall,
    ) -> Result<AccessorOutput, StoreError> {
        let sid = instance_id(source)?;
        let accessor = call.accessor();
        tracing::debug!(model = %source_model.name, id = sid, association = %association.key, accessor = accessor.name(), "relation");
        let target = self.model(&association.target)?;
        let one = association.kind.cardinality() == Cardinality::One;
        let unsupported = || StoreError::UnsupportedAccessor {
            accessor: accessor.name(),
            kind: association.kind,
        };

        match call {
            AccessorCall::Get(options) => {
                let tables = self.read();
                let source_row = load(&tables, source_model, sid)?;
                let related = self.related_rows(&tables, source_model, &source_row, association)?;
                let rows = self.select(&tables, target, related.into_iter(), &options)?;
                Ok(if one {
                    AccessorOutput::One(rows.into_iter().next())
                } else {
                    AccessorOutput::Many(rows)
                })
            }
            AccessorCall::Count(options) => {
                if one {
                    return Err(unsupported());
                }
                let filter = effective_where(target, &options)?;
                let tables = self.read();
                let source_row = load(&tables, source_model, sid)?;
                let related = self.related_rows(&tables, source_model, &source_row, association)?;
                Ok(AccessorOutput::Count(related.iter().filter(|r| matches_where(r, &filter)).count() as u64))
            }
            AccessorCall::Create(values) => {
                let mut tables = self.write();
                load(&tables, source_model, sid)?;
                let row = Self::new_row(target, values);
                let created = tables.entry(target.table.clone()).or_default().insert(row);
                let tid = created.get("id").and_then(Value::as_i64).ok_or(StoreError::MissingId)?;
                if association.kind == AssociationKind::HasOne {
                    self.unlink(&mut tables, source_model, sid, association, None)?;
                }
                self.link(&mut tables, source_model, sid, association, tid)?;
                let created = load(&tables, target, tid)?;
                Ok(AccessorOutput::One(Some(Value::Object(created))))
            }
            AccessorCall::Set(ids) => {
                let mut tables = self.write();
                load(&tables, source_model, sid)?;
                let ids: Vec<i64> = if one { ids.into_iter().take(1).collect() } else { ids };
                self.ensure_targets(&tables, association, &ids)?;
                self.unlink(&mut tables, source_model, sid, association, None)?;
                for tid in ids {
                    self.link(&mut tables, source_model, sid, association, tid)?;
                }
                self.current(&tables, source_model, sid, association)
            }
            AccessorCall::Add(_) | AccessorCall::AddMany(_) | AccessorCall::Remove(_) | AccessorCall::RemoveMany(_) if one => {
                Err(unsupported())
            }
            AccessorCall::Add(tid) => self.add(source_model, sid, association, &[tid]),
            AccessorCall::AddMany(ids) => self.add(source_model, sid, association, &ids),
            AccessorCall::Remove(tid) => self.remove(source_model, sid, association, &[tid]),
            AccessorCall::RemoveMany(ids) => self.remove(source_model, sid, association, &ids),
        }
    }
}

impl MemoryStore {
    fn add(&self, source_model: &ModelDef, sid: i64, assoc: &AssociationDef, ids: &[i64]) -> Result<AccessorOutput, StoreError> {
        let mut tables = self.write();
        load(&tables, source_model, sid)?;
        self.ensure_targets(&tables, assoc, ids)?;
        for &tid in ids {
            self.link(&mut tables, source_model, sid, assoc, tid)?;
        }
        self.current(&tables, source_model, sid, assoc)
    }

    fn remove(&self, source_model: &ModelDef, sid: i64, assoc: &AssociationDef, ids: &[i64]) -> Result<AccessorOutput, StoreError> {
        let mut tables = self.write();
        load(&tables, source_model, sid)?;
        for &tid in ids {
            self.unlink(&mut tables, source_model, sid, assoc, Some(tid))?;
        }
        self.current(&tables, source_model, sid, assoc)
    }
}
