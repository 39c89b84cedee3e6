//! Key-value store backed by a three-column table.
//!
//! Rows are `(key TEXT PRIMARY KEY, value BLOB, updated INTEGER)`. Scalars
//! read back unchanged, booleans and `u64` included; arrays and objects
//! are stored as JSON text and come back from [`KvStore::get`] as that
//! text.
//!
//! List and counter operations are read-modify-write. Without locking,
//! two writers touching the same key can lose an update.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::types::Value;
use serde_json::Value as Json;

use crate::sql::ident::placeholders;
use crate::sql::{Db, DbResult, Executor, Ident, Inserts, Order, Params, Raw};
use crate::store::codec::{
    as_list, as_number, from_column, from_number, to_exact_column, unix_now,
};

/// Rows per bulk REPLACE; three bound values each keeps a statement under
/// SQLite's 999-variable floor.
const BULK_ROWS: usize = 300;

/// Keys per `IN (...)` lookup.
const BULK_KEYS: usize = 900;

/// Key-value access to one table.
#[derive(Debug, Clone)]
pub struct KvStore {
    db: Arc<Db>,
    table: Ident,
    locking: bool,
}

impl KvStore {
    pub fn new(db: Arc<Db>, table: Ident) -> Self {
        Self {
            db,
            table,
            locking: false,
        }
    }

    /// Run list and counter operations inside [`Db::atomic`].
    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }

    /// Same connection and settings, another table.
    pub fn using(&self, table: Ident) -> Self {
        Self {
            db: self.db.clone(),
            table,
            locking: self.locking,
        }
    }

    pub fn table(&self) -> &Ident {
        &self.table
    }

    /// Create the backing table if it does not exist.
    pub fn create(&self) -> DbResult<bool> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\"key\" TEXT NOT NULL PRIMARY KEY, \"value\" BLOB, \"updated\" INTEGER)",
            self.table
        );
        Ok(self.db.execute(&sql, Params::None)?.is_some())
    }

    /// Store one value, replacing any previous one.
    pub fn set(&self, key: &str, value: &Json) -> DbResult<bool> {
        self.set_in(&*self.db, vec![(key.to_string(), value.clone())])
    }

    /// Store many values, a few hundred rows per statement. A failing
    /// statement leaves earlier rows written unless locking is on.
    pub fn set_many(&self, pairs: impl IntoIterator<Item = (String, Json)>) -> DbResult<bool> {
        self.set_in(&*self.db, pairs.into_iter().collect())
    }

    /// The stored scalar for `key`, or `None` when absent.
    pub fn get(&self, key: &str) -> DbResult<Option<Json>> {
        self.get_in(&*self.db, key)
    }

    /// Like [`get`](Self::get), decoding stored JSON arrays and objects.
    pub fn get_json(&self, key: &str) -> DbResult<Option<Json>> {
        Ok(self.get(key)?.map(|value| match &value {
            Json::String(text) => match serde_json::from_str::<Json>(text) {
                Ok(decoded @ (Json::Array(_) | Json::Object(_))) => decoded,
                _ => value,
            },
            _ => value,
        }))
    }

    /// Values for every key that exists. Missing keys are left out.
    pub fn get_many(&self, keys: &[&str]) -> DbResult<BTreeMap<String, Json>> {
        self.get_many_in(&*self.db, keys)
    }

    /// True iff every key exists.
    pub fn has(&self, keys: &[&str]) -> DbResult<bool> {
        let wanted = distinct(keys);
        let found = self.get_many(&wanted)?;
        Ok(found.len() == wanted.len())
    }

    /// Delete keys.
    pub fn del(&self, keys: &[&str]) -> DbResult<bool> {
        let filter = Raw::new(format!("\"key\" IN {}", placeholders(keys.len())));
        let params = keys.iter().map(|k| Value::Text((*k).to_string())).collect();
        Ok(self.db.delete(&self.table, Some(&filter), params)?.is_some())
    }

    /// Keys matching a SQL `LIKE` pattern, most recently updated first
    /// (or last, with [`Order::Asc`]).
    pub fn fget(&self, pattern: &str, limit: u32, order: Order) -> DbResult<Vec<(String, Json)>> {
        let extra = Raw::new(format!(
            "WHERE \"key\" LIKE ? ORDER BY \"updated\" {} LIMIT ?",
            order.as_sql()
        ));
        let params = vec![Value::Text(pattern.to_string()), Value::Integer(i64::from(limit))];
        self.pairs(Some(&extra), params)
    }

    /// Up to `limit` entries ordered by update time.
    pub fn all(&self, limit: u32, order: Order) -> DbResult<Vec<(String, Json)>> {
        let extra = Raw::new(format!("ORDER BY \"updated\" {} LIMIT ?", order.as_sql()));
        self.pairs(Some(&extra), vec![Value::Integer(i64::from(limit))])
    }

    /// Append values to the list stored at `key`.
    pub fn push(&self, key: &str, values: Vec<Json>) -> DbResult<bool> {
        self.modify_list(key, |list| list.extend(values))
    }

    /// Drop `count` values from the end of the list.
    pub fn pop(&self, key: &str, count: usize) -> DbResult<bool> {
        self.modify_list(key, |list| {
            let keep = list.len().saturating_sub(count);
            list.truncate(keep);
        })
    }

    /// Drop `count` values from the front of the list.
    pub fn shift(&self, key: &str, count: usize) -> DbResult<bool> {
        self.modify_list(key, |list| {
            let n = count.min(list.len());
            list.drain(..n);
        })
    }

    /// Prepend values to the list stored at `key`.
    pub fn unshift(&self, key: &str, values: Vec<Json>) -> DbResult<bool> {
        self.modify_list(key, |list| {
            let tail = std::mem::replace(list, values);
            list.extend(tail);
        })
    }

    /// Add `|by|` to each key.
    ///
    /// When not every key exists, a single key is set straight to `|by|`
    /// without reading it; with several keys the missing ones start at 0.
    pub fn increment(&self, keys: &[&str], by: i64) -> DbResult<bool> {
        self.adjust(keys, by.unsigned_abs() as f64, 1.0)
    }

    /// Subtract `|by|` from each key.
    ///
    /// Seeding follows [`increment`](Self::increment): a single missing key
    /// is set to `|by|`, not `-|by|`.
    pub fn decrement(&self, keys: &[&str], by: i64) -> DbResult<bool> {
        self.adjust(keys, by.unsigned_abs() as f64, -1.0)
    }

    fn adjust(&self, keys: &[&str], magnitude: f64, sign: f64) -> DbResult<bool> {
        let keys = distinct(keys);
        if keys.is_empty() {
            return Ok(true);
        }
        self.read_modify_write(|ex| {
            let mut values = self.get_many_in(ex, &keys)?;
            if values.len() != keys.len() {
                if let [only] = keys.as_slice() {
                    return self.set_in(ex, vec![(only.to_string(), from_number(magnitude))]);
                }
                for key in &keys {
                    values.entry(key.to_string()).or_insert(Json::from(0));
                }
            }
            let updated = values
                .into_iter()
                .map(|(k, v)| (k, from_number(as_number(&v) + sign * magnitude)))
                .collect();
            self.set_in(ex, updated)
        })
    }

    fn modify_list(&self, key: &str, f: impl FnOnce(&mut Vec<Json>)) -> DbResult<bool> {
        self.read_modify_write(|ex| {
            let mut list = as_list(self.get_in(ex, key)?.as_ref());
            f(&mut list);
            self.set_in(ex, vec![(key.to_string(), Json::Array(list))])
        })
    }

    fn read_modify_write<T>(&self, f: impl FnOnce(&dyn Executor) -> DbResult<T>) -> DbResult<T> {
        if self.locking {
            self.db.atomic(|session| f(session))
        } else {
            f(&*self.db)
        }
    }

    fn set_in(&self, ex: &dyn Executor, pairs: Vec<(String, Json)>) -> DbResult<bool> {
        let now = unix_now();
        let columns = vec![
            Ident::new("key")?,
            Ident::new("value")?,
            Ident::new("updated")?,
        ];
        for chunk in pairs.chunks(BULK_ROWS) {
            let rows = chunk
                .iter()
                .map(|(k, v)| {
                    Ok(vec![
                        Value::Text(k.clone()),
                        to_exact_column(v)?,
                        Value::Integer(now),
                    ])
                })
                .collect::<DbResult<Vec<_>>>()?;
            let inserts = Inserts::Bulk {
                columns: columns.clone(),
                rows,
            };
            if ex.insert(&self.table, &inserts, true)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn get_in(&self, ex: &dyn Executor, key: &str) -> DbResult<Option<Json>> {
        let extra = Raw::new("WHERE \"key\" = ? LIMIT 1");
        let result = ex.select(
            &self.table,
            &Raw::new("\"value\""),
            Some(&extra),
            Params::from(Value::Text(key.to_string())),
        )?;
        Ok(result
            .and_then(|r| r.rows.into_iter().next())
            .and_then(|row| row.into_iter().next())
            .map(from_column))
    }

    fn get_many_in(&self, ex: &dyn Executor, keys: &[&str]) -> DbResult<BTreeMap<String, Json>> {
        let mut found = BTreeMap::new();
        for chunk in keys.chunks(BULK_KEYS) {
            let extra = Raw::new(format!("WHERE \"key\" IN {}", placeholders(chunk.len())));
            let params: Vec<Value> = chunk.iter().map(|k| Value::Text((*k).to_string())).collect();
            let result = ex.select(
                &self.table,
                &Raw::new("\"key\", \"value\""),
                Some(&extra),
                Params::from(params),
            )?;
            if let Some(result) = result {
                found.extend(result.key_pairs().into_iter().map(|(k, v)| (k, from_column(v))));
            }
        }
        Ok(found)
    }

    fn pairs(&self, extra: Option<&Raw>, params: Vec<Value>) -> DbResult<Vec<(String, Json)>> {
        let result = self.db.select(
            &self.table,
            &Raw::new("\"key\", \"value\""),
            extra,
            Params::from(params),
        )?;
        Ok(result
            .map(|r| {
                r.rows
                    .into_iter()
                    .filter_map(|row| {
                        let mut cells = row.into_iter();
                        match (cells.next(), cells.next()) {
                            (Some(Value::Text(k)), Some(v)) => Some((k, from_column(v))),
                            _ => None,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn distinct<'a>(keys: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::with_capacity(keys.len());
    for key in keys {
        if !out.contains(key) {
            out.push(key);
        }
    }
    out
}
