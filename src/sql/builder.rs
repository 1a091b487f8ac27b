//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from model metadata.

use crate::config::{ModelDef, Through, Where};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from model metadata).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn push_param(&mut self, v: Value) -> String {
        self.params.push(v);
        format!("${}", self.params.len())
    }

    /// Render a filter as conditions. Arrays become `IN`, `null` becomes `IS NULL`.
    ///
    /// With `as_text`, both sides compare as text: filter values arrive untyped from the query
    /// string, so `5` must match a text column and `"5"` an integer one.
    fn conditions(&mut self, filter: &Where, alias: Option<&str>, as_text: bool) -> Vec<String> {
        filter
            .iter()
            .map(|(col, val)| {
                let col = match alias {
                    Some(a) => format!("{}.{}", a, quoted(col)),
                    None => quoted(col),
                };
                let cast = if as_text { "::text" } else { "" };
                let mut bind = |v: &Value| {
                    let v = if as_text { text_form(v) } else { v.clone() };
                    self.push_param(v)
                };
                match val {
                    Value::Null => format!("{} IS NULL", col),
                    Value::Array(items) if items.is_empty() => "FALSE".to_string(),
                    Value::Array(items) => {
                        let phs: Vec<String> = items.iter().map(&mut bind).collect();
                        format!("{}{} IN ({})", col, cast, phs.join(", "))
                    }
                    v => format!("{}{} = {}", col, cast, bind(v)),
                }
            })
            .collect()
    }
}

/// The text Postgres prints for a scalar: strings as-is, numbers and booleans in literal form.
fn text_form(v: &Value) -> Value {
    match v {
        Value::String(_) => v.clone(),
        other => Value::String(other.to_string()),
    }
}

/// Restricts a target-model query to the members of one relation.
#[derive(Clone, Copy, Debug)]
pub enum Membership<'a> {
    /// `column = value` on the target (HasOne/HasMany foreign key, or `id` for BelongsTo and lookups by id).
    Column { column: &'a str, value: i64 },
    /// Target ids listed in a junction table for `source_id`.
    Through { through: &'a Through, source_id: i64 },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

const ALIAS: &str = "main";

/// SELECT list: declared columns, or every column for models without declared attributes.
fn select_column_list(model: &ModelDef) -> String {
    if model.attributes.is_empty() {
        return format!("{}.*", ALIAS);
    }
    model
        .columns
        .iter()
        .map(|c| format!("{}.{}", ALIAS, quoted(c)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_clause(q: &mut QueryBuf, filter: &Where, membership: Option<Membership<'_>>) -> String {
    let mut parts = q.conditions(filter, Some(ALIAS), true);
    match membership {
        Some(Membership::Column { column, value }) => {
            let ph = q.push_param(Value::from(value));
            parts.push(format!("{}.{} = {}", ALIAS, quoted(column), ph));
        }
        Some(Membership::Through { through, source_id }) => {
            let ph = q.push_param(Value::from(source_id));
            parts.push(format!(
                "{}.{} IN (SELECT {} FROM {} WHERE {} = {})",
                ALIAS,
                quoted("id"),
                quoted(&through.target_key),
                quoted(&through.table),
                quoted(&through.source_key),
                ph
            ));
        }
        None => {}
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT rows matching `filter` (and a relation, if given), ORDER BY id, with optional LIMIT/OFFSET.
pub fn select(model: &ModelDef, filter: &Where, membership: Option<Membership<'_>>, page: Page) -> QueryBuf {
    let mut q = QueryBuf::default();
    let where_clause = where_clause(&mut q, filter, membership);
    let limit_clause = page.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = page.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {} {}{} ORDER BY {}.{}{}{}",
        select_column_list(model),
        quoted(&model.table),
        ALIAS,
        where_clause,
        ALIAS,
        quoted("id"),
        limit_clause,
        offset_clause
    );
    q
}

pub fn count(model: &ModelDef, filter: &Where, membership: Option<Membership<'_>>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let where_clause = where_clause(&mut q, filter, membership);
    q.sql = format!(
        "SELECT COUNT(*) AS {} FROM {} {}{}",
        quoted("count"),
        quoted(&model.table),
        ALIAS,
        where_clause
    );
    q
}

/// INSERT into `table`; null values are left to the column default.
pub fn insert(table: &str, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (name, val) in body {
        if val.is_null() {
            continue;
        }
        cols.push(quoted(name));
        placeholders.push(q.push_param(val.clone()));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quoted(table))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            quoted(table),
            cols.join(", "),
            placeholders.join(", ")
        )
    };
    q
}

/// UPDATE rows of `table` matching `filter`. Null values are written as literal NULL.
pub fn update(table: &str, body: &Map<String, Value>, filter: &Where) -> QueryBuf {
    let mut q = QueryBuf::default();
    let sets: Vec<String> = body
        .iter()
        .map(|(k, v)| match v {
            Value::Null => format!("{} = NULL", quoted(k)),
            v => {
                let ph = q.push_param(v.clone());
                format!("{} = {}", quoted(k), ph)
            }
        })
        .collect();
    let conditions = q.conditions(filter, None, false);
    if sets.is_empty() {
        q.sql = format!("SELECT * FROM {} WHERE {}", quoted(table), conditions.join(" AND "));
        return q;
    }
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING *",
        quoted(table),
        sets.join(", "),
        conditions.join(" AND ")
    );
    q
}

/// DELETE rows of `table` matching `filter`.
pub fn delete(table: &str, filter: &Where) -> QueryBuf {
    let mut q = QueryBuf::default();
    let conditions = q.conditions(filter, None, false);
    q.sql = format!(
        "DELETE FROM {} WHERE {} RETURNING *",
        quoted(table),
        conditions.join(" AND ")
    );
    q
}

/// Insert a junction row unless the pair is already linked.
pub fn link_through(through: &Through, source_id: i64, target_id: i64) -> QueryBuf {
    let mut q = QueryBuf::default();
    let s = q.push_param(Value::from(source_id));
    let t = q.push_param(Value::from(target_id));
    q.sql = format!(
        "INSERT INTO {table} ({sk}, {tk}) SELECT {s}, {t} WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {sk} = {s} AND {tk} = {t})",
        table = quoted(&through.table),
        sk = quoted(&through.source_key),
        tk = quoted(&through.target_key),
        s = s,
        t = t
    );
    q
}
