//! Statement parameters and materialized results.

use std::collections::BTreeMap;

use rusqlite::types::Value;

/// Bound parameters for a statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// No parameters.
    #[default]
    None,
    /// `?` placeholders, bound in order.
    Positional(Vec<Value>),
    /// `:name` placeholders. Names include the leading sigil.
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(v) => v.len(),
            Params::Named(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append positional values. Named params are left untouched.
    pub fn extend(self, more: Vec<Value>) -> Self {
        match self {
            Params::None if more.is_empty() => Params::None,
            Params::None => Params::Positional(more),
            Params::Positional(mut v) => {
                v.extend(more);
                Params::Positional(v)
            }
            named @ Params::Named(_) => named,
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        if values.is_empty() {
            Params::None
        } else {
            Params::Positional(values)
        }
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Params::Positional(vec![value])
    }
}

/// Everything a statement produced, fetched eagerly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a non-query statement.
    pub affected: usize,
    /// `last_insert_rowid()` after the statement ran.
    pub last_insert_id: i64,
}

impl QueryResult {
    /// First column of the first row.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    fn column(&self, index: usize) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index).cloned())
            .collect()
    }

    /// One column as text, skipping non-text values.
    pub fn column_text(&self, index: usize) -> Vec<String> {
        self.column(index)
            .into_iter()
            .filter_map(|v| match v {
                Value::Text(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Rows as `column name → value` maps.
    pub fn assoc(&self) -> Vec<BTreeMap<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// First two columns as a key → value map; non-text keys are skipped.
    pub fn key_pairs(&self) -> BTreeMap<String, Value> {
        self.rows
            .iter()
            .filter_map(|row| match (row.first(), row.get(1)) {
                (Some(Value::Text(k)), Some(v)) => Some((k.clone(), v.clone())),
                (Some(Value::Integer(k)), Some(v)) => Some((k.to_string(), v.clone())),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec!["key".into(), "value".into()],
            rows: vec![
                vec![Value::Text("a".into()), Value::Integer(1)],
                vec![Value::Text("b".into()), Value::Null],
            ],
            affected: 0,
            last_insert_id: 0,
        }
    }

    #[test]
    fn test_key_pairs() {
        let pairs = sample().key_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["a"], Value::Integer(1));
        assert_eq!(pairs["b"], Value::Null);
    }

    #[test]
    fn test_assoc_and_scalar() {
        let result = sample();
        assert_eq!(result.scalar(), Some(&Value::Text("a".into())));
        let rows = result.assoc();
        assert_eq!(rows[1]["key"], Value::Text("b".into()));
        assert_eq!(result.column_text(0), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_params_extend() {
        let params = Params::None.extend(vec![Value::Integer(1)]);
        assert_eq!(params, Params::Positional(vec![Value::Integer(1)]));
        let params = params.extend(vec![Value::Integer(2)]);
        assert_eq!(params.len(), 2);
        assert!(Params::from(Vec::new()).is_empty());
    }
}
