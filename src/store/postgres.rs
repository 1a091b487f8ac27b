//! PostgreSQL store: model metadata rendered through the SQL builder, executed with sqlx.

use super::{effective_where, instance_id, junction, writable_values, AccessorCall, AccessorOutput, FindOptions, Store};
use crate::config::{AssociationDef, AssociationKind, Cardinality, ModelDef, ModelGraph, Where};
use crate::error::StoreError;
use crate::sql::{self, bind_all, row_to_json, Membership, Page, QueryBuf};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool, Row};
use std::sync::Arc;

pub struct PgStore {
    pool: PgPool,
    graph: Arc<ModelGraph>,
}

async fn fetch_all(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<Value>, StoreError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let rows = bind_all(sqlx::query(&q.sql), &q.params).fetch_all(conn).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

async fn fetch_optional(conn: &mut PgConnection, q: &QueryBuf) -> Result<Option<Value>, StoreError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let row = bind_all(sqlx::query(&q.sql), &q.params).fetch_optional(conn).await?;
    Ok(row.as_ref().map(row_to_json))
}

async fn fetch_count(conn: &mut PgConnection, q: &QueryBuf) -> Result<u64, StoreError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let row = bind_all(sqlx::query(&q.sql), &q.params).fetch_one(conn).await?;
    let n: i64 = row.try_get("count")?;
    Ok(u64::try_from(n).unwrap_or(0))
}

async fn execute(conn: &mut PgConnection, q: &QueryBuf) -> Result<u64, StoreError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    let result = bind_all(sqlx::query(&q.sql), &q.params).execute(conn).await?;
    Ok(result.rows_affected())
}

fn by_id(id: i64) -> Where {
    let mut w = Where::new();
    w.insert("id".into(), Value::from(id));
    w
}

/// Typed primary-key match; filter conditions compare as text.
fn by_id_membership(id: i64) -> Membership<'static> {
    Membership::Column { column: "id", value: id }
}

fn page(options: &FindOptions) -> Page {
    Page {
        limit: options.limit,
        offset: options.offset,
    }
}

impl PgStore {
    pub fn new(pool: PgPool, graph: Arc<ModelGraph>) -> Self {
        PgStore { pool, graph }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn model(&self, name: &str) -> Result<&ModelDef, StoreError> {
        self.graph
            .get(name)
            .map(|m| m.as_ref())
            .ok_or_else(|| StoreError::UnknownModel(name.to_string()))
    }

    async fn load(&self, conn: &mut PgConnection, model: &ModelDef, id: i64) -> Result<Value, StoreError> {
        let q = sql::select(model, &Where::new(), Some(by_id_membership(id)), Page::default());
        fetch_optional(conn, &q).await?.ok_or_else(|| StoreError::TargetNotFound {
            model: model.name.clone(),
            id,
        })
    }

    /// Query restricting the target model to the members of `assoc`; None when a BelongsTo is unset.
    fn membership<'a>(source_model: &ModelDef, source: &Value, assoc: &'a AssociationDef) -> Result<Option<Membership<'a>>, StoreError> {
        let sid = instance_id(source)?;
        Ok(match assoc.kind {
            AssociationKind::BelongsTo => source
                .get(&assoc.foreign_key)
                .and_then(Value::as_i64)
                .map(|fk| Membership::Column { column: "id", value: fk }),
            AssociationKind::HasOne | AssociationKind::HasMany => Some(Membership::Column {
                column: &assoc.foreign_key,
                value: sid,
            }),
            AssociationKind::BelongsToMany => Some(Membership::Through {
                through: junction(source_model, assoc)?,
                source_id: sid,
            }),
        })
    }

    async fn related(
        &self,
        conn: &mut PgConnection,
        source_model: &ModelDef,
        source: &Value,
        assoc: &AssociationDef,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let target = self.model(&assoc.target)?;
        let filter = effective_where(target, options)?;
        let Some(membership) = Self::membership(source_model, source, assoc)? else {
            return Ok(Vec::new());
        };
        let q = sql::select(target, &filter, Some(membership), page(options));
        fetch_all(conn, &q).await
    }

    async fn attach_includes(
        &self,
        conn: &mut PgConnection,
        model: &ModelDef,
        rows: &mut [Value],
        include: &[String],
    ) -> Result<(), StoreError> {
        for key in include {
            let assoc = model.association(key).ok_or_else(|| StoreError::UnknownAssociation {
                model: model.name.clone(),
                key: key.clone(),
            })?;
            for row in rows.iter_mut() {
                let related = self.related(conn, model, row, assoc, &FindOptions::default()).await?;
                let value = match assoc.kind.cardinality() {
                    Cardinality::One => related.into_iter().next().unwrap_or(Value::Null),
                    Cardinality::Many => Value::Array(related),
                };
                if let Value::Object(map) = row {
                    map.insert(key.clone(), value);
                }
            }
        }
        Ok(())
    }

    async fn link(&self, conn: &mut PgConnection, source_model: &ModelDef, sid: i64, assoc: &AssociationDef, tid: i64) -> Result<(), StoreError> {
        let target = self.model(&assoc.target)?;
        self.load(conn, target, tid).await?;
        let q = match assoc.kind {
            AssociationKind::BelongsTo => {
                let set = Map::from_iter([(assoc.foreign_key.clone(), Value::from(tid))]);
                sql::update(&source_model.table, &set, &by_id(sid))
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                let set = Map::from_iter([(assoc.foreign_key.clone(), Value::from(sid))]);
                sql::update(&target.table, &set, &by_id(tid))
            }
            AssociationKind::BelongsToMany => sql::link_through(junction(source_model, assoc)?, sid, tid),
        };
        execute(conn, &q).await?;
        Ok(())
    }

    /// Remove `tid` from the relation, or every member when `tid` is None.
    async fn unlink(&self, conn: &mut PgConnection, source_model: &ModelDef, sid: i64, assoc: &AssociationDef, tid: Option<i64>) -> Result<(), StoreError> {
        let target = self.model(&assoc.target)?;
        let clear = Map::from_iter([(assoc.foreign_key.clone(), Value::Null)]);
        let q = match assoc.kind {
            AssociationKind::BelongsTo => {
                let mut filter = by_id(sid);
                if let Some(tid) = tid {
                    filter.insert(assoc.foreign_key.clone(), Value::from(tid));
                }
                sql::update(&source_model.table, &clear, &filter)
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                let mut filter = Where::new();
                filter.insert(assoc.foreign_key.clone(), Value::from(sid));
                if let Some(tid) = tid {
                    filter.insert("id".into(), Value::from(tid));
                }
                sql::update(&target.table, &clear, &filter)
            }
            AssociationKind::BelongsToMany => {
                let through = junction(source_model, assoc)?;
                let mut filter = Where::new();
                filter.insert(through.source_key.clone(), Value::from(sid));
                if let Some(tid) = tid {
                    filter.insert(through.target_key.clone(), Value::from(tid));
                }
                sql::delete(&through.table, &filter)
            }
        };
        execute(conn, &q).await?;
        Ok(())
    }

    async fn current(&self, conn: &mut PgConnection, source_model: &ModelDef, sid: i64, assoc: &AssociationDef) -> Result<AccessorOutput, StoreError> {
        let source = self.load(conn, source_model, sid).await?;
        let rows = self.related(conn, source_model, &source, assoc, &FindOptions::default()).await?;
        Ok(match assoc.kind.cardinality() {
            Cardinality::One => AccessorOutput::One(rows.into_iter().next()),
            Cardinality::Many => AccessorOutput::Many(rows),
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_all(&self, model: &ModelDef, options: &FindOptions) -> Result<Vec<Value>, StoreError> {
        let filter = effective_where(model, options)?;
        let mut conn = self.pool.acquire().await?;
        let q = sql::select(model, &filter, None, page(options));
        let mut rows = fetch_all(&mut conn, &q).await?;
        self.attach_includes(&mut conn, model, &mut rows, &options.include).await?;
        Ok(rows)
    }

    async fn find_by_id(&self, model: &ModelDef, id: i64, options: &FindOptions) -> Result<Option<Value>, StoreError> {
        let filter = effective_where(model, options)?;
        let mut conn = self.pool.acquire().await?;
        let q = sql::select(model, &filter, Some(by_id_membership(id)), Page::default());
        let mut rows: Vec<Value> = fetch_optional(&mut conn, &q).await?.into_iter().collect();
        self.attach_includes(&mut conn, model, &mut rows, &options.include).await?;
        Ok(rows.pop())
    }

    async fn count(&self, model: &ModelDef, options: &FindOptions) -> Result<u64, StoreError> {
        let filter = effective_where(model, options)?;
        let mut conn = self.pool.acquire().await?;
        fetch_count(&mut conn, &sql::count(model, &filter, None)).await
    }

    async fn create(&self, model: &ModelDef, values: Map<String, Value>) -> Result<Value, StoreError> {
        let values = writable_values(model, values);
        let mut conn = self.pool.acquire().await?;
        fetch_optional(&mut conn, &sql::insert(&model.table, &values))
            .await?
            .ok_or(StoreError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(&self, model: &ModelDef, instance: &Value, values: Map<String, Value>) -> Result<Value, StoreError> {
        let id = instance_id(instance)?;
        let values = writable_values(model, values);
        let mut conn = self.pool.acquire().await?;
        fetch_optional(&mut conn, &sql::update(&model.table, &values, &by_id(id)))
            .await?
            .ok_or_else(|| StoreError::TargetNotFound {
                model: model.name.clone(),
                id,
            })
    }

    async fn destroy(&self, model: &ModelDef, instance: &Value) -> Result<Value, StoreError> {
        let id = instance_id(instance)?;
        let mut conn = self.pool.acquire().await?;
        fetch_optional(&mut conn, &sql::delete(&model.table, &by_id(id)))
            .await?
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
        let unsupported = StoreError::UnsupportedAccessor {
            accessor: accessor.name(),
            kind: association.kind,
        };

        match call {
            AccessorCall::Get(options) => {
                let mut conn = self.pool.acquire().await?;
                let fresh = self.load(&mut conn, source_model, sid).await?;
                let mut rows = self.related(&mut conn, source_model, &fresh, association, &options).await?;
                self.attach_includes(&mut conn, target, &mut rows, &options.include).await?;
                Ok(if one {
                    AccessorOutput::One(rows.into_iter().next())
                } else {
                    AccessorOutput::Many(rows)
                })
            }
            AccessorCall::Count(options) => {
                if one {
                    return Err(unsupported);
                }
                let filter = effective_where(target, &options)?;
                let mut conn = self.pool.acquire().await?;
                let Some(membership) = Self::membership(source_model, source, association)? else {
                    return Ok(AccessorOutput::Count(0));
                };
                let n = fetch_count(&mut conn, &sql::count(target, &filter, Some(membership))).await?;
                Ok(AccessorOutput::Count(n))
            }
            AccessorCall::Create(values) => {
                let mut values = writable_values(target, values);
                let mut tx = self.pool.begin().await?;
                self.load(&mut tx, source_model, sid).await?;
                match association.kind {
                    AssociationKind::HasOne => {
                        self.unlink(&mut tx, source_model, sid, association, None).await?;
                        values.insert(association.foreign_key.clone(), Value::from(sid));
                    }
                    AssociationKind::HasMany => {
                        values.insert(association.foreign_key.clone(), Value::from(sid));
                    }
                    AssociationKind::BelongsTo | AssociationKind::BelongsToMany => {}
                }
                let created = fetch_optional(&mut tx, &sql::insert(&target.table, &values))
                    .await?
                    .ok_or(StoreError::Db(sqlx::Error::RowNotFound))?;
                if matches!(association.kind, AssociationKind::BelongsTo | AssociationKind::BelongsToMany) {
                    let tid = instance_id(&created)?;
                    self.link(&mut tx, source_model, sid, association, tid).await?;
                }
                tx.commit().await?;
                Ok(AccessorOutput::One(Some(created)))
            }
            AccessorCall::Set(ids) => {
                let ids: Vec<i64> = if one { ids.into_iter().take(1).collect() } else { ids };
                let mut tx = self.pool.begin().await?;
                self.unlink(&mut tx, source_model, sid, association, None).await?;
                for tid in ids {
                    self.link(&mut tx, source_model, sid, association, tid).await?;
                }
                let out = self.current(&mut tx, source_model, sid, association).await?;
                tx.commit().await?;
                Ok(out)
            }
            AccessorCall::Add(_) | AccessorCall::AddMany(_) | AccessorCall::Remove(_) | AccessorCall::RemoveMany(_) if one => {
                Err(unsupported)
            }
            AccessorCall::Add(tid) => self.add(source_model, sid, association, &[tid]).await,
            AccessorCall::AddMany(ids) => self.add(source_model, sid, association, &ids).await,
            AccessorCall::Remove(tid) => self.remove(source_model, sid, association, &[tid]).await,
            AccessorCall::RemoveMany(ids) => self.remove(source_model, sid, association, &ids).await,
        }
    }
}

impl PgStore {
    async fn add(&self, source_model: &ModelDef, sid: i64, assoc: &AssociationDef, ids: &[i64]) -> Result<AccessorOutput, StoreError> {
        let mut tx = self.pool.begin().await?;
        for &tid in ids {
            self.link(&mut tx, source_model, sid, assoc, tid).await?;
        }
        let out = self.current(&mut tx, source_model, sid, assoc).await?;
        tx.commit().await?;
        Ok(out)
    }

    async fn remove(&self, source_model: &ModelDef, sid: i64, assoc: &AssociationDef, ids: &[i64]) -> Result<AccessorOutput, StoreError> {
        let mut tx = self.pool.begin().await?;
        for &tid in ids {
            self.unlink(&mut tx, source_model, sid, assoc, Some(tid)).await?;
        }
        let out = self.current(&mut tx, source_model, sid, assoc).await?;
        tx.commit().await?;
        Ok(out)
    }
}
