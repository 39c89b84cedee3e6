//! A thin handle bound to one table.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::types::Value;

use crate::sql::db::{Db, Executor, Inserts};
use crate::sql::error::DbResult;
use crate::sql::ident::{Ident, Raw};
use crate::sql::result::{Params, QueryResult};

/// Builder shortcuts scoped to a single table.
#[derive(Debug, Clone)]
pub struct Table {
    db: Arc<Db>,
    name: Ident,
}

impl Table {
    pub fn new(db: Arc<Db>, name: Ident) -> Self {
        Self { db, name }
    }

    /// Same connection, another table.
    pub fn using(&self, name: Ident) -> Self {
        Self::new(self.db.clone(), name)
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    /// Insert one row; returns the new rowid.
    pub fn add(&self, fields: Vec<(Ident, Value)>) -> DbResult<Option<i64>> {
        Ok(self
            .db
            .insert(&self.name, &Inserts::Single(fields), false)?
            .map(|r| r.last_insert_id))
    }

    /// Replace one row; returns the new rowid.
    pub fn rep(&self, fields: Vec<(Ident, Value)>) -> DbResult<Option<i64>> {
        Ok(self
            .db
            .insert(&self.name, &Inserts::Single(fields), true)?
            .map(|r| r.last_insert_id))
    }

    /// Delete matching rows; returns how many went away.
    pub fn del(&self, filter: &Raw, params: Vec<Value>) -> DbResult<Option<usize>> {
        Ok(self
            .db
            .delete(&self.name, Some(filter), params)?
            .map(|r| r.affected))
    }

    /// Update matching rows; returns how many changed.
    pub fn edit(
        &self,
        fields: &[(Ident, Value)],
        filter: Option<&Raw>,
        params: Vec<Value>,
    ) -> DbResult<Option<usize>> {
        Ok(self
            .db
            .update(&self.name, fields, filter, params)?
            .map(|r| r.affected))
    }

    /// First row matching `filter`.
    pub fn get_one(
        &self,
        filter: &Raw,
        params: Vec<Value>,
    ) -> DbResult<Option<BTreeMap<String, Value>>> {
        let extra = Raw::new(format!("WHERE {filter} LIMIT 1"));
        let result = self
            .db
            .select(&self.name, &Raw::new("*"), Some(&extra), Params::from(params))?;
        Ok(result.and_then(|r| r.assoc().into_iter().next()))
    }

    /// All rows matching `filter`, followed by `more` (ORDER BY, LIMIT ...).
    ///
    /// `params` bind before `more_params`.
    pub fn get_all(
        &self,
        filter: Option<&Raw>,
        params: Vec<Value>,
        more: Option<&Raw>,
        more_params: Vec<Value>,
    ) -> DbResult<Option<QueryResult>> {
        let mut extra = String::new();
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            extra.push_str(&format!("WHERE {f}"));
        }
        if let Some(m) = more.filter(|m| !m.is_empty()) {
            if !extra.is_empty() {
                extra.push(' ');
            }
            extra.push_str(m.as_str());
        }
        self.db.select(
            &self.name,
            &Raw::new("*"),
            Some(&Raw::new(extra)),
            Params::from(params).extend(more_params),
        )
    }

    /// Row count, optionally filtered.
    pub fn count(&self, filter: Option<&Raw>, params: Vec<Value>) -> DbResult<Option<i64>> {
        let extra = filter.filter(|f| !f.is_empty()).map(|f| Raw::new(format!("WHERE {f}")));
        let result = self.db.select(
            &self.name,
            &Raw::new("COUNT(*)"),
            extra.as_ref(),
            Params::from(params),
        )?;
        Ok(result.and_then(|r| match r.scalar() {
            Some(Value::Integer(n)) => Some(*n),
            _ => None,
        }))
    }

    /// `DROP TABLE`.
    pub fn drop(&self) -> DbResult<bool> {
        let sql = format!("DROP TABLE {}", self.name);
        Ok(self.db.execute(&sql, Params::None)?.is_some())
    }

    /// Remove every row.
    pub fn truncate(&self) -> DbResult<bool> {
        Ok(self.db.delete(&self.name, None, Vec::new())?.is_some())
    }

    /// Column names.
    pub fn cols(&self) -> DbResult<Vec<String>> {
        self.db.columns(&self.name)
    }

    /// Without columns: does the table exist. With columns: do they all exist.
    pub fn exists(&self, columns: &[&str]) -> DbResult<bool> {
        if columns.is_empty() {
            self.db.table_exists(&[self.name.as_str()])
        } else {
            self.db.column_exists(&self.name, columns)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posts() -> Table {
        let db = Arc::new(Db::memory().unwrap());
        db.execute(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, votes INTEGER)",
            Params::None,
        )
        .unwrap();
        Table::new(db, Ident::new("posts").unwrap())
    }

    fn fields(title: &str, votes: i64) -> Vec<(Ident, Value)> {
        vec![
            (Ident::new("title").unwrap(), Value::Text(title.into())),
            (Ident::new("votes").unwrap(), Value::Integer(votes)),
        ]
    }

    #[test]
    fn test_add_get_count() {
        let table = posts();
        assert_eq!(table.add(fields("hello", 3)).unwrap(), Some(1));
        assert_eq!(table.add(fields("world", 7)).unwrap(), Some(2));

        let row = table
            .get_one(&Raw::new("title = ?"), vec![Value::Text("world".into())])
            .unwrap()
            .unwrap();
        assert_eq!(row["votes"], Value::Integer(7));

        assert_eq!(table.count(None, vec![]).unwrap(), Some(2));
        assert_eq!(
            table
                .count(Some(&Raw::new("votes > ?")), vec![Value::Integer(5)])
                .unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_get_all_with_ordering() {
        let table = posts();
        table.add(fields("a", 1)).unwrap();
        table.add(fields("b", 9)).unwrap();
        table.add(fields("c", 5)).unwrap();

        let result = table
            .get_all(
                Some(&Raw::new("votes >= ?")),
                vec![Value::Integer(5)],
                Some(&Raw::new("ORDER BY votes DESC LIMIT ?")),
                vec![Value::Integer(10)],
            )
            .unwrap()
            .unwrap();
        assert_eq!(result.column_text(1), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_edit_del_truncate() {
        let table = posts();
        table.add(fields("a", 1)).unwrap();
        table.add(fields("b", 2)).unwrap();

        let changed = table
            .edit(
                &[(Ident::new("votes").unwrap(), Value::Integer(10))],
                Some(&Raw::new("title = ?")),
                vec![Value::Text("a".into())],
            )
            .unwrap();
        assert_eq!(changed, Some(1));

        assert_eq!(
            table
                .del(&Raw::new("title = ?"), vec![Value::Text("b".into())])
                .unwrap(),
            Some(1)
        );
        assert!(table.truncate().unwrap());
        assert_eq!(table.count(None, vec![]).unwrap(), Some(0));
    }

    #[test]
    fn test_exists_and_drop() {
        let table = posts();
        assert!(table.exists(&[]).unwrap());
        assert!(table.exists(&["title", "votes"]).unwrap());
        assert!(!table.exists(&["author"]).unwrap());
        assert_eq!(table.cols().unwrap(), vec!["id", "title", "votes"]);

        assert!(table.drop().unwrap());
        assert!(!table.exists(&[]).unwrap());
        assert!(!table.using(Ident::new("nothing").unwrap()).exists(&[]).unwrap());
    }
}
