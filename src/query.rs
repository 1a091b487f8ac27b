//! Query parameter translation: raw query string -> canonical query descriptor.
//! Supports bracket nesting (`filter[name]=x`) and list notation (`id=1&id=2`, `id[]=1`, `id[0]=1`).

use crate::config::Where;
use crate::error::AppError;
use indexmap::IndexMap;
use serde_json::Value;

pub const DEFAULT_OFFSET: u32 = 0;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// One decoded query parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryValue {
    Str(String),
    List(Vec<String>),
    Map(IndexMap<String, QueryValue>),
}

/// Decode `a=1&b[c]=2&d[]=3&d[]=4` into a nested map. Later scalars for the same key become a list.
pub fn decode(raw: &str) -> IndexMap<String, QueryValue> {
    let mut out = IndexMap::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        let segments = split_key(&key);
        insert(&mut out, &segments, value.into_owned());
    }
    out
}

fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 || !key.ends_with(']') {
        return vec![key.to_string()];
    }
    let mut segments = vec![key[..open].to_string()];
    for part in key[open + 1..key.len() - 1].split("][") {
        if part.contains('[') || part.contains(']') {
            return vec![key.to_string()];
        }
        segments.push(part.to_string());
    }
    segments
}

fn insert(target: &mut IndexMap<String, QueryValue>, segments: &[String], value: String) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let is_list_index = |s: &str| s.is_empty() || s.chars().all(|c| c.is_ascii_digit());

    match rest.first() {
        None => push_scalar(target, head, value),
        Some(next) if rest.len() == 1 && is_list_index(next) => match target.get_mut(head) {
            Some(QueryValue::List(items)) => items.push(value),
            Some(QueryValue::Str(first)) => {
                let first = std::mem::take(first);
                target.insert(head.clone(), QueryValue::List(vec![first, value]));
            }
            Some(QueryValue::Map(_)) => {
                tracing::debug!(key = %head, "query key used as both map and list; ignored");
            }
            None => {
                target.insert(head.clone(), QueryValue::List(vec![value]));
            }
        },
        Some(_) => {
            let entry = target
                .entry(head.clone())
                .or_insert_with(|| QueryValue::Map(IndexMap::new()));
            match entry {
                QueryValue::Map(inner) => insert(inner, rest, value),
                _ => tracing::debug!(key = %head, "query key used as both scalar and map; ignored"),
            }
        }
    }
}

fn push_scalar(target: &mut IndexMap<String, QueryValue>, key: &str, value: String) {
    match target.get_mut(key) {
        None => {
            target.insert(key.to_string(), QueryValue::Str(value));
        }
        Some(QueryValue::Str(first)) => {
            let first = std::mem::take(first);
            target.insert(key.to_string(), QueryValue::List(vec![first, value]));
        }
        Some(QueryValue::List(items)) => items.push(value),
        Some(QueryValue::Map(_)) => {
            tracing::debug!(key = %key, "query key used as both map and scalar; ignored");
        }
    }
}

/// Whether a route accepts an `id` list in its query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdList {
    #[default]
    NotAccepted,
    Optional,
    Required,
}

/// Query validation rules of one route.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryRules {
    /// Unknown keys are rejected when set; otherwise the query is ignored except for known keys.
    pub strict: bool,
    pub filter: bool,
    pub paging: bool,
    /// Accepted include name -> association key. Empty means `include` is not accepted.
    pub include: IndexMap<String, String>,
    pub ids: IdList,
}

/// Canonical query consumed by the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryDescriptor {
    pub where_: Where,
    pub offset: u32,
    pub limit: u32,
    /// Association keys to eager-load.
    pub include: Vec<String>,
    pub ids: Option<Vec<i64>>,
}

/// Translate a raw query string under `rules`.
pub fn parse_query(raw: &str, rules: &QueryRules) -> Result<QueryDescriptor, AppError> {
    let decoded = decode(raw);
    let mut q = QueryDescriptor {
        offset: DEFAULT_OFFSET,
        limit: DEFAULT_LIMIT,
        ..Default::default()
    };

    for (key, value) in &decoded {
        match key.as_str() {
            "filter" if rules.filter => q.where_ = parse_filter(value)?,
            "offset" if rules.paging => q.offset = parse_bounded("offset", value, 0, u32::MAX)?,
            "limit" if rules.paging => q.limit = parse_bounded("limit", value, 1, MAX_LIMIT)?,
            "include" if !rules.include.is_empty() => {
                let name = single("include", value)?;
                let key = rules
                    .include
                    .get(name)
                    .ok_or_else(|| AppError::BadRequest(format!("include '{}' is not a related model", name)))?;
                q.include = vec![key.clone()];
            }
            "id" if rules.ids != IdList::NotAccepted => q.ids = Some(parse_ids(value)?),
            other if rules.strict => {
                return Err(AppError::BadRequest(format!("query parameter '{}' is not allowed", other)));
            }
            _ => {}
        }
    }

    if rules.ids == IdList::Required && q.ids.is_none() {
        return Err(AppError::BadRequest("query parameter 'id' is required".into()));
    }
    Ok(q)
}

/// Filter values are JSON-parsed when possible and kept as raw strings otherwise.
pub fn parse_filter(value: &QueryValue) -> Result<Where, AppError> {
    match value {
        QueryValue::Map(map) => Ok(map.iter().map(|(k, v)| (k.clone(), filter_value(v))).collect()),
        QueryValue::Str(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(obj)) => Ok(obj.into_iter().collect()),
            _ => Err(AppError::BadRequest("filter must be an object".into())),
        },
        QueryValue::List(_) => Err(AppError::BadRequest("filter must be an object".into())),
    }
}

fn json_or_string(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}

fn filter_value(v: &QueryValue) -> Value {
    match v {
        QueryValue::Str(s) => json_or_string(s),
        QueryValue::List(items) => Value::Array(items.iter().map(|s| json_or_string(s)).collect()),
        QueryValue::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), filter_value(v))).collect()),
    }
}

fn single<'a>(name: &str, value: &'a QueryValue) -> Result<&'a str, AppError> {
    match value {
        QueryValue::Str(s) => Ok(s.as_str()),
        _ => Err(AppError::BadRequest(format!("{} must be a single value", name))),
    }
}

fn parse_bounded(name: &str, value: &QueryValue, min: u32, max: u32) -> Result<u32, AppError> {
    let raw = single(name, value)?;
    let n: i64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("{} must be an integer", name)))?;
    if n < i64::from(min) {
        return Err(AppError::BadRequest(format!("{} must be at least {}", name, min)));
    }
    if n > i64::from(max) {
        return Err(AppError::BadRequest(format!("{} must be at most {}", name, max)));
    }
    Ok(n as u32)
}

/// Positive integer id from a path or query value.
pub fn parse_id(name: &str, raw: &str) -> Result<i64, AppError> {
    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(AppError::BadRequest(format!("{} must be a positive integer", name))),
    }
}

fn parse_ids(value: &QueryValue) -> Result<Vec<i64>, AppError> {
    match value {
        QueryValue::Str(s) => Ok(vec![parse_id("id", s)?]),
        QueryValue::List(items) => items.iter().map(|s| parse_id("id", s)).collect(),
        QueryValue::Map(_) => Err(AppError::BadRequest("id must be a list of integers".into())),
    }
}

/// Flatten nested scope lists and drop nulls. Objects naming a scope via `method` are kept by name.
pub fn prepare_scopes(scopes: &Value) -> Vec<String> {
    fn collect(v: &Value, depth: usize, out: &mut Vec<String>) {
        match v {
            Value::String(s) if !s.is_empty() => out.push(s.clone()),
            Value::Array(items) if depth < 2 => items.iter().for_each(|i| collect(i, depth + 1, out)),
            Value::Object(obj) => {
                if let Some(Value::String(s)) = obj.get("method") {
                    out.push(s.clone());
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    collect(scopes, 0, &mut out);
    out
}
