//! Schemaless JSON documents stored as compressed blobs.
//!
//! # Responsibilities
//! - Keep one row per document in the main table
//!   (`aid`, `cid`, `updated`, `type`, `body`)
//! - Mirror selected fields into `index_<field>` tables so they can be
//!   joined and filtered in SQL
//! - Encode bodies as zlib-compressed JSON and decode them on read
//!
//! # Data Flow
//! ```text
//! put({"_id", "_index", "_type", ...fields})
//!     → strip reserved keys, insert "id"
//!     → INSERT main row (body = zlib(json))
//!     → INSERT one row per declared index field
//! get(DocQuery)
//!     → SELECT main.* FROM main LEFT JOIN index_<f> AS jt_<i> ... [WHERE cid = ?] [extra]
//!     → DocRecord { body decoded }
//! ```
//!
//! # Design Decisions
//! - The main insert and the index inserts are separate statements. A
//!   failure between them leaves the indexes out of step with the main
//!   table.
//! - Deleting a document relies on `ON DELETE CASCADE` (foreign keys must
//!   be enabled on the connection) to clear its index rows.

use std::sync::Arc;

use rusqlite::types::Value;
use serde_json::{Map, Value as Json};

use crate::sql::ident::placeholders;
use crate::sql::{Db, DbError, DbResult, Executor, Ident, Inserts, Params, Raw};
use crate::store::codec::{decode_body, encode_body, generate_id, to_column, unix_now};

/// Default length of generated document ids.
pub const DEFAULT_ID_LENGTH: usize = 15;

/// Shortest and longest generated document id.
pub const ID_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 8..=40;

/// Reserved keys read from documents passed to [`DocStore::put`] and
/// [`DocStore::edit`].
pub const RESERVED_ID: &str = "_id";
pub const RESERVED_INDEX: &str = "_index";
pub const RESERVED_TYPE: &str = "_type";

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocRecord {
    pub aid: i64,
    pub cid: String,
    pub updated: i64,
    pub doc_type: String,
    pub body: Json,
}

/// Parameters for [`DocStore::get`].
#[derive(Debug, Clone, Default)]
pub struct DocQuery {
    pub id: Option<String>,
    pub index: Vec<String>,
    /// Appended verbatim after the joins and the optional id filter.
    pub sql: Option<Raw>,
    pub params: Vec<Value>,
}

impl DocQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Join `index_<name>`; it is reachable in `sql` as `jt_<n>` where `n`
    /// is the join's position.
    pub fn join(mut self, name: impl Into<String>) -> Self {
        self.index.push(name.into());
        self
    }

    /// Extra SQL with its bound values, e.g. `WHERE jt_0."tag" = ?`.
    ///
    /// When an id is also set the statement already has a `WHERE`, so the
    /// extra SQL should start with `AND`.
    pub fn filter(mut self, sql: impl Into<Raw>, params: Vec<Value>) -> Self {
        self.sql = Some(sql.into());
        self.params = params;
        self
    }
}

/// The reserved keys of a document, separated from its fields.
struct Parts {
    id: Option<String>,
    index: Vec<String>,
    doc_type: String,
    body: Map<String, Json>,
}

impl Parts {
    fn split(doc: Json) -> DbResult<Self> {
        let Json::Object(mut body) = doc else {
            return Err(DbError::InvalidDocument("documents must be json objects".into()));
        };

        let id = match body.remove(RESERVED_ID) {
            None | Some(Json::Null) => None,
            Some(Json::String(s)) if s.is_empty() => None,
            Some(Json::String(s)) => Some(s),
            Some(Json::Number(n)) => Some(n.to_string()),
            Some(other) => {
                return Err(DbError::InvalidDocument(format!("unusable {RESERVED_ID}: {other}")))
            }
        };

        let index = match body.remove(RESERVED_INDEX) {
            None | Some(Json::Null) => Vec::new(),
            Some(Json::String(s)) if s.is_empty() => Vec::new(),
            Some(Json::String(s)) => vec![s],
            Some(Json::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Json::String(s) => Ok(s),
                    other => Err(DbError::InvalidDocument(format!(
                        "{RESERVED_INDEX} entries must be strings, got {other}"
                    ))),
                })
                .collect::<DbResult<_>>()?,
            Some(other) => {
                return Err(DbError::InvalidDocument(format!(
                    "unusable {RESERVED_INDEX}: {other}"
                )))
            }
        };

        let doc_type = match body.remove(RESERVED_TYPE) {
            Some(Json::String(s)) => s,
            None | Some(Json::Null) => String::new(),
            Some(other) => other.to_string(),
        };

        Ok(Self {
            id,
            index,
            doc_type,
            body,
        })
    }

    /// The body as stored, with `id` added unless the document has its own.
    fn stored_body(&self, id: &str) -> Json {
        let mut body = self.body.clone();
        body.entry("id").or_insert_with(|| Json::String(id.to_string()));
        Json::Object(body)
    }
}

/// Document collection bound to one main table.
#[derive(Debug, Clone)]
pub struct DocStore {
    db: Arc<Db>,
    table: Ident,
    id_length: usize,
}

impl DocStore {
    pub fn new(db: Arc<Db>, table: Ident) -> Self {
        Self {
            db,
            table,
            id_length: DEFAULT_ID_LENGTH,
        }
    }

    /// Length of generated ids, clamped to [`ID_LENGTH_RANGE`].
    pub fn with_id_length(mut self, id_length: usize) -> Self {
        self.id_length = id_length.clamp(*ID_LENGTH_RANGE.start(), *ID_LENGTH_RANGE.end());
        self
    }

    /// Same connection and settings, another main table.
    pub fn using(&self, table: Ident) -> Self {
        Self {
            db: self.db.clone(),
            table,
            id_length: self.id_length,
        }
    }

    pub fn table(&self) -> &Ident {
        &self.table
    }

    /// Create the main table and its `updated` index if missing.
    pub fn create(&self) -> DbResult<bool> {
        let table = &self.table;
        let created = self.db.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 \"aid\" INTEGER PRIMARY KEY AUTOINCREMENT, \
                 \"cid\" TEXT NOT NULL UNIQUE, \
                 \"updated\" INTEGER, \
                 \"type\" TEXT, \
                 \"body\" BLOB)"
            ),
            Params::None,
        )?;
        let by_updated = Ident::new(format!("{}_updated", table.as_str()))?;
        let indexed = self.db.execute(
            &format!("CREATE INDEX IF NOT EXISTS {by_updated} ON {table} (\"updated\")"),
            Params::None,
        )?;
        Ok(created.is_some() && indexed.is_some())
    }

    /// Create `index_<name>` with a `<name>` column of `sql_type`.
    pub fn index(&self, name: &str, sql_type: &Raw) -> DbResult<bool> {
        let column = Ident::new(name)?;
        let index_table = index_table(name)?;
        let sql_type = if sql_type.is_empty() {
            "TEXT"
        } else {
            sql_type.as_str()
        };
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {index_table} (\
             \"cid\" TEXT NOT NULL PRIMARY KEY, \
             {column} {sql_type}, \
             FOREIGN KEY (\"cid\") REFERENCES {} (\"cid\") ON DELETE CASCADE)",
            self.table
        );
        let created = self.db.execute(&sql, Params::None)?.is_some();
        tracing::debug!(index = %name, created, "Document index table");
        Ok(created)
    }

    /// Drop `index_<name>` if it exists.
    pub fn drop_index(&self, name: &str) -> DbResult<bool> {
        let sql = format!("DROP TABLE IF EXISTS {}", index_table(name)?);
        Ok(self.db.execute(&sql, Params::None)?.is_some())
    }

    /// Store a new document and its index rows.
    ///
    /// Returns the document id when every statement ran, `None` when one
    /// of them could not be prepared (missing table, for instance).
    pub fn put(&self, doc: Json) -> DbResult<Option<String>> {
        let parts = Parts::split(doc)?;
        let id = parts
            .id
            .clone()
            .unwrap_or_else(|| generate_id(self.id_length));
        let body = parts.stored_body(&id);

        let main = Inserts::Single(vec![
            (Ident::new("cid")?, Value::Text(id.clone())),
            (Ident::new("updated")?, Value::Integer(unix_now())),
            (Ident::new("type")?, Value::Text(parts.doc_type.clone())),
            (Ident::new("body")?, Value::Blob(encode_body(&body)?)),
        ]);
        let mut complete = self.db.insert(&self.table, &main, false)?.is_some();

        for name in &parts.index {
            let row = Inserts::Single(vec![
                (Ident::new("cid")?, Value::Text(id.clone())),
                (Ident::new(name.as_str())?, index_value(&body, name)?),
            ]);
            complete &= self.db.insert(&index_table(name)?, &row, false)?.is_some();
        }

        tracing::debug!(id = %id, indexes = parts.index.len(), complete, "Document stored");
        Ok(complete.then_some(id))
    }

    /// Rewrite an existing document and its declared index rows.
    ///
    /// Returns `false` without touching anything when the document has no
    /// `_id`.
    pub fn edit(&self, doc: Json) -> DbResult<bool> {
        let parts = Parts::split(doc)?;
        let Some(id) = parts.id.clone() else {
            return Ok(false);
        };
        let body = parts.stored_body(&id);
        let by_cid = Raw::new("\"cid\" = ?");

        let fields = [
            (Ident::new("updated")?, Value::Integer(unix_now())),
            (Ident::new("type")?, Value::Text(parts.doc_type.clone())),
            (Ident::new("body")?, Value::Blob(encode_body(&body)?)),
        ];
        let mut complete = self
            .db
            .update(&self.table, &fields, Some(&by_cid), vec![Value::Text(id.clone())])?
            .is_some();

        for name in &parts.index {
            let fields = [(Ident::new(name.as_str())?, index_value(&body, name)?)];
            complete &= self
                .db
                .update(
                    &index_table(name)?,
                    &fields,
                    Some(&by_cid),
                    vec![Value::Text(id.clone())],
                )?
                .is_some();
        }
        Ok(complete)
    }

    /// Delete documents by id; their index rows go with them.
    pub fn delete(&self, ids: &[&str]) -> DbResult<bool> {
        let filter = Raw::new(format!("\"cid\" IN {}", placeholders(ids.len())));
        let params = ids.iter().map(|id| Value::Text((*id).to_string())).collect();
        Ok(self.db.delete(&self.table, Some(&filter), params)?.is_some())
    }

    /// Fetch documents, optionally joined against index tables.
    ///
    /// `Ok(None)` means the statement could not be prepared.
    pub fn get(&self, query: &DocQuery) -> DbResult<Option<Vec<DocRecord>>> {
        let table = &self.table;
        let mut sql = format!("SELECT {table}.* FROM {table}");
        for (i, name) in query.index.iter().enumerate() {
            let joined = index_table(name)?;
            sql.push_str(&format!(
                " LEFT JOIN {joined} AS jt_{i} ON jt_{i}.\"cid\" = {table}.\"cid\""
            ));
        }

        let mut params = Vec::new();
        if let Some(id) = query.id.as_deref().filter(|id| !id.is_empty()) {
            sql.push_str(&format!(" WHERE ({table}.\"cid\" = ?)"));
            params.push(Value::Text(id.to_string()));
        }
        if let Some(extra) = query.sql.as_ref().filter(|s| !s.is_empty()) {
            sql.push(' ');
            sql.push_str(extra.as_str());
            params.extend(query.params.iter().cloned());
        }

        let Some(result) = self.db.execute(&sql, Params::from(params))? else {
            return Ok(None);
        };
        result
            .assoc()
            .into_iter()
            .map(|mut row| {
                let body = match row.remove("body") {
                    Some(Value::Blob(bytes)) => decode_body(&bytes)?,
                    Some(Value::Null) | None => Json::Null,
                    Some(other) => {
                        return Err(DbError::InvalidDocument(format!(
                            "body column holds {:?}",
                            other.data_type()
                        )))
                    }
                };
                Ok(DocRecord {
                    aid: integer(row.remove("aid")),
                    cid: text(row.remove("cid")),
                    updated: integer(row.remove("updated")),
                    doc_type: text(row.remove("type")),
                    body,
                })
            })
            .collect::<DbResult<Vec<_>>>()
            .map(Some)
    }

    /// The document stored under `id`.
    pub fn find(&self, id: &str) -> DbResult<Option<DocRecord>> {
        Ok(self
            .get(&DocQuery::by_id(id))?
            .and_then(|records| records.into_iter().next()))
    }
}

fn index_table(name: &str) -> DbResult<Ident> {
    Ident::new(name)?.prefixed("index_")
}

fn index_value(body: &Json, name: &str) -> DbResult<Value> {
    to_column(body.get(name).unwrap_or(&Json::Null))
}

fn integer(value: Option<Value>) -> i64 {
    match value {
        Some(Value::Integer(i)) => i,
        _ => 0,
    }
}

fn text(value: Option<Value>) -> String {
    match value {
        Some(Value::Text(s)) => s,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> DocStore {
        let db = Arc::new(Db::memory().unwrap());
        let docs = DocStore::new(db, Ident::new("docs").unwrap());
        assert!(docs.create().unwrap());
        docs
    }

    #[test]
    fn test_put_without_id_is_retrievable() {
        let docs = store();
        let id = docs.put(json!({"title": "hello"})).unwrap().unwrap();
        assert_eq!(id.len(), DEFAULT_ID_LENGTH);

        let record = docs.find(&id).unwrap().unwrap();
        assert_eq!(record.cid, id);
        assert_eq!(record.body["title"], json!("hello"));
        assert_eq!(record.body["id"], json!(id));
        assert_eq!(record.doc_type, "");
        assert!(record.updated > 0);
    }

    #[test]
    fn test_id_length_is_clamped() {
        let long = store().with_id_length(500);
        assert_eq!(long.put(json!({})).unwrap().unwrap().len(), *ID_LENGTH_RANGE.end());
        let short = store().with_id_length(1);
        assert_eq!(short.put(json!({})).unwrap().unwrap().len(), *ID_LENGTH_RANGE.start());
    }

    #[test]
    fn test_put_with_id_and_type() {
        let docs = store();
        let id = docs
            .put(json!({"_id": "post-1", "_type": "post", "title": "x"}))
            .unwrap();
        assert_eq!(id.as_deref(), Some("post-1"));

        let record = docs.find("post-1").unwrap().unwrap();
        assert_eq!(record.doc_type, "post");
        assert!(record.body.get("_id").is_none());
        assert!(record.body.get("_type").is_none());
    }

    #[test]
    fn test_body_keeps_own_id_field() {
        let docs = store();
        docs.put(json!({"_id": "a", "id": "custom"})).unwrap();
        let record = docs.find("a").unwrap().unwrap();
        assert_eq!(record.body["id"], json!("custom"));
    }

    #[test]
    fn test_duplicate_id_is_error() {
        let docs = store();
        docs.put(json!({"_id": "a"})).unwrap();
        assert!(matches!(
            docs.put(json!({"_id": "a"})),
            Err(DbError::Execution(_))
        ));
    }

    #[test]
    fn test_put_rejects_non_objects() {
        let docs = store();
        assert!(matches!(
            docs.put(json!(["nope"])),
            Err(DbError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_edit_without_id_changes_nothing() {
        let docs = store();
        docs.put(json!({"_id": "a", "title": "before"})).unwrap();

        assert!(!docs.edit(json!({"title": "after"})).unwrap());
        let record = docs.find("a").unwrap().unwrap();
        assert_eq!(record.body["title"], json!("before"));
    }

    #[test]
    fn test_edit_rewrites_body_and_index() {
        let docs = store();
        docs.index("tag", &Raw::new("TEXT")).unwrap();
        docs.put(json!({"_id": "a", "_index": ["tag"], "tag": "red"}))
            .unwrap();

        assert!(docs
            .edit(json!({"_id": "a", "_index": "tag", "_type": "note", "tag": "blue"}))
            .unwrap());

        let record = docs.find("a").unwrap().unwrap();
        assert_eq!(record.body["tag"], json!("blue"));
        assert_eq!(record.doc_type, "note");

        let query = DocQuery::new()
            .join("tag")
            .filter("WHERE jt_0.\"tag\" = ?", vec![Value::Text("blue".into())]);
        assert_eq!(docs.get(&query).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_index_filtering() {
        let docs = store();
        assert!(docs.index("year", &Raw::new("INTEGER")).unwrap());
        for (id, year) in [("a", 2001), ("b", 2010), ("c", 2020)] {
            docs.put(json!({"_id": id, "_index": ["year"], "year": year}))
                .unwrap()
                .unwrap();
        }

        let query = DocQuery::new().join("year").filter(
            "WHERE jt_0.\"year\" >= ? ORDER BY jt_0.\"year\"",
            vec![Value::Integer(2010)],
        );
        let found: Vec<String> = docs
            .get(&query)
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|r| r.cid)
            .collect();
        assert_eq!(found, vec!["b", "c"]);

        let query = DocQuery::by_id("a")
            .join("year")
            .filter("AND jt_0.\"year\" < ?", vec![Value::Integer(2005)]);
        assert_eq!(docs.get(&query).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_cascades_to_index_rows() {
        let docs = store();
        docs.index("tag", &Raw::new("")).unwrap();
        docs.put(json!({"_id": "a", "_index": "tag", "tag": "x"}))
            .unwrap();
        docs.put(json!({"_id": "b", "_index": "tag", "tag": "y"}))
            .unwrap();

        assert!(docs.delete(&["a"]).unwrap());
        assert!(docs.find("a").unwrap().is_none());
        assert!(docs.find("b").unwrap().is_some());

        let rows = docs
            .db
            .select(&index_table("tag").unwrap(), &Raw::new("\"cid\""), None, Params::None)
            .unwrap()
            .unwrap();
        assert_eq!(rows.column_text(0), vec!["b".to_string()]);
    }

    #[test]
    fn test_put_into_missing_index_is_incomplete() {
        let docs = store();
        let id = docs
            .put(json!({"_id": "a", "_index": ["nothing"], "nothing": 1}))
            .unwrap();
        assert!(id.is_none());
        // the main row was written anyway
        assert!(docs.find("a").unwrap().is_some());
    }

    #[test]
    fn test_invalid_index_name() {
        let docs = store();
        assert!(matches!(
            docs.index("bad name", &Raw::new("TEXT")),
            Err(DbError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_drop_index() {
        let docs = store();
        docs.index("tag", &Raw::new("TEXT")).unwrap();
        assert!(docs.db.table_exists(&["index_tag"]).unwrap());
        assert!(docs.drop_index("tag").unwrap());
        assert!(!docs.db.table_exists(&["index_tag"]).unwrap());
    }

    #[test]
    fn test_get_on_missing_table_is_none() {
        let docs = store().using(Ident::new("nowhere").unwrap());
        assert!(docs.get(&DocQuery::new()).unwrap().is_none());
    }
}
